use schema_core::constraints::min_length;
use schema_core::schema::{Property, SchemaNode, TypeCache};
use schema_core::transformer::{Conversion, Output, Transformer};
use schema_core::{Error, SchemaEngine, Value};

fn main() {
    let mut cache = TypeCache::new();
    cache.register("User", || {
        vec![
            Property::new(
                "name",
                SchemaNode::root(SchemaNode::string().with(min_length(2))).with_transformer(
                    Transformer::sync(|value, _| {
                        let name = value.as_str().unwrap_or_default().trim().to_string();
                        Ok(Conversion::Value(Output::Value(Value::from(name))))
                    }),
                ),
            ),
            Property::new("email", SchemaNode::optional(SchemaNode::string())),
        ]
    });
    let engine = SchemaEngine::new(cache);
    let node = SchemaNode::root(SchemaNode::class("User"));

    for source in [
        r#"{ "name": "  John Doe ", "email": "john.doe@example.com" }"#,
        r#"{ "name": "J", "mail": "typo@example.com" }"#,
    ] {
        let value = match Value::from_json(source) {
            Ok(value) => value,
            Err(e) => {
                eprintln!("Failed to parse JSON: {e}");
                continue;
            }
        };
        match futures::executor::block_on(engine.transform_or_err(&node, &value)) {
            Ok(output) => println!("Transformed:\n{}", output.to_json()),
            Err(Error::Invalid(failed)) => {
                for (path, error) in &failed.report {
                    eprintln!("{path}: {}", error.message);
                }
            }
            Err(e) => eprintln!("Schema problem: {e:?}"),
        }
    }
}

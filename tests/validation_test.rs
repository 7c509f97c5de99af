use schema_core::constraints::rule;
use schema_core::error::{Reason, SchemaError};
use schema_core::schema::{NodeKind, Property, SchemaNode, TypeCache};
use schema_core::validator::{validate, Validation};
use schema_core::{NodeValidationError, Options, Value};

fn json(source: &str) -> Value {
    Value::from_json(source).unwrap()
}

fn validate_err(node: &SchemaNode, value: &Value, cache: &TypeCache) -> NodeValidationError {
    let options = Options::default();
    match validate(node, value, cache, &options) {
        Ok(Validation::Failure(error)) => error,
        Ok(Validation::Success(_)) => panic!("Expected a validation failure, but got a match"),
        Err(err) => panic!("Expected a validation failure, but got {err}"),
    }
}

fn validate_ok(node: &SchemaNode, value: &Value, cache: &TypeCache) {
    let options = Options::default();
    match validate(node, value, cache, &options) {
        Ok(Validation::Success(_)) => {}
        Ok(Validation::Failure(error)) => panic!("Expected a match, but got {error}"),
        Err(err) => panic!("Expected a match, but got {err}"),
    }
}

fn user_cache() -> TypeCache {
    let mut cache = TypeCache::new();
    cache.register("User", || {
        vec![
            Property::new("name", SchemaNode::root(SchemaNode::string())),
            Property::new("age", SchemaNode::root(SchemaNode::number())),
            Property::new("email", SchemaNode::optional(SchemaNode::string())),
        ]
    });
    cache
}

#[test]
fn test_array_fails_fast() {
    let cache = TypeCache::new();
    let node = SchemaNode::array(SchemaNode::number());
    let error = validate_err(&node, &json(r#"[1, 2, "x", "y"]"#), &cache);

    assert_eq!(error.kind, NodeKind::Array);
    assert_eq!(error.reason, Reason::ElementTypeFailed);
    assert_eq!(error.context_value("element"), Some(&Value::Number(2.0)));
    // index 3 is invalid too, but is never reached
    assert_eq!(error.previous_errors.len(), 1);
    assert_eq!(error.previous_errors[0].reason, Reason::NotANumber);
    assert_eq!(error.previous_errors[0].value, Value::from("x"));
}

#[test]
fn test_not_an_array() {
    let cache = TypeCache::new();
    let node = SchemaNode::array(SchemaNode::number());
    let error = validate_err(&node, &json(r#"{ "0": 1 }"#), &cache);
    assert_eq!(error.reason, Reason::NotAnArray);
}

#[test]
fn test_union_collects_every_branch_on_failure() {
    let cache = TypeCache::new();
    let node = SchemaNode::union(vec![SchemaNode::string(), SchemaNode::number()]);
    let error = validate_err(&node, &Value::Boolean(true), &cache);

    assert_eq!(error.reason, Reason::NoUnionMatch);
    assert_eq!(error.previous_errors.len(), 2);
    assert_eq!(error.previous_errors[0].reason, Reason::NotAString);
    assert_eq!(error.previous_errors[1].reason, Reason::NotANumber);
}

#[test]
fn test_union_first_match_wins() {
    let cache = TypeCache::new();
    let options = Options::default();
    let node = SchemaNode::union(vec![SchemaNode::string(), SchemaNode::any()]);
    let value = Value::from("a");
    let matched = validate(&node, &value, &cache, &options)
        .unwrap()
        .into_result()
        .unwrap();
    assert_eq!(matched.previous_matches.len(), 1);
    assert_eq!(matched.previous_matches[0].node.kind(), NodeKind::String);
}

#[test]
fn test_class_aggregates_every_property() {
    let cache = user_cache();
    let node = SchemaNode::root(SchemaNode::class("User"));
    let error = validate_err(&node, &json(r#"{ "name": 1, "age": "old" }"#), &cache);

    assert_eq!(error.kind, NodeKind::Class);
    assert_eq!(error.reason, Reason::ObjectPropertyFailed);
    assert_eq!(error.context_value("type"), Some(&Value::from("User")));
    assert_eq!(error.previous_errors.len(), 2);

    let properties: Vec<_> = error.previous_errors.iter().map(|e| e.property()).collect();
    assert_eq!(properties, vec![Some("name"), Some("age")]);
    assert!(error
        .previous_errors
        .iter()
        .all(|e| e.context_value("owner") == Some(&Value::from("User"))));
}

#[test]
fn test_class_requires_object() {
    let cache = user_cache();
    let node = SchemaNode::class("User");
    let error = validate_err(&node, &json("[]"), &cache);
    assert_eq!(error.reason, Reason::NotAnObject);
    assert_eq!(error.context_value("type"), Some(&Value::from("User")));
}

#[test]
fn test_class_missing_and_optional_properties() {
    let cache = user_cache();
    let node = SchemaNode::root(SchemaNode::class("User"));
    validate_ok(&node, &json(r#"{ "name": "Ann", "age": 31 }"#), &cache);

    let error = validate_err(&node, &json(r#"{ "name": "Ann" }"#), &cache);
    assert_eq!(error.previous_errors.len(), 1);
    assert_eq!(error.previous_errors[0].reason, Reason::ValueRequired);
    assert_eq!(error.previous_errors[0].property(), Some("age"));
}

#[test]
fn test_unknown_fields() {
    let cache = user_cache();
    let node = SchemaNode::root(SchemaNode::class("User"));
    let value = json(r#"{ "name": "Ann", "age": 31, "admin": true }"#);

    let error = validate_err(&node, &value, &cache);
    assert_eq!(error.previous_errors.len(), 1);
    assert_eq!(error.previous_errors[0].reason, Reason::UnknownField);
    assert_eq!(error.previous_errors[0].property(), Some("admin"));

    let options = Options::default().allow_unknown_fields(true);
    assert!(validate(&node, &value, &cache, &options).unwrap().is_success());
}

#[test]
fn test_record_fails_fast_with_key() {
    let cache = TypeCache::new();
    let node = SchemaNode::record(SchemaNode::string(), SchemaNode::number());
    let error = validate_err(&node, &json(r#"{ "one": "x", "two": "y" }"#), &cache);

    assert_eq!(error.reason, Reason::EntryTypeFailed);
    assert_eq!(error.context_value("key"), Some(&Value::from("one")));
    assert_eq!(error.previous_errors.len(), 1);

    let error = validate_err(&node, &json("[1]"), &cache);
    assert_eq!(error.reason, Reason::NotAnObject);
}

#[test]
fn test_tuple() {
    let cache = TypeCache::new();
    let node = SchemaNode::tuple(vec![SchemaNode::string(), SchemaNode::number()]);
    validate_ok(&node, &json(r#"["a", 1]"#), &cache);

    let error = validate_err(&node, &json(r#"["a"]"#), &cache);
    assert_eq!(error.reason, Reason::NoLengthMatch);
    assert_eq!(error.context_value("expected"), Some(&Value::Number(2.0)));
    assert_eq!(error.context_value("found"), Some(&Value::Number(1.0)));

    let error = validate_err(&node, &json(r#"[1, "a"]"#), &cache);
    assert_eq!(error.reason, Reason::ElementTypeFailed);
    assert_eq!(error.context_value("element"), Some(&Value::Number(0.0)));
    assert_eq!(error.previous_errors.len(), 1);
}

#[test]
fn test_self_referential_class() {
    let mut cache = TypeCache::new();
    cache.register("Category", || {
        vec![
            Property::new("name", SchemaNode::root(SchemaNode::string())),
            Property::new(
                "children",
                SchemaNode::optional(SchemaNode::array(SchemaNode::class("Category"))),
            ),
        ]
    });
    let node = SchemaNode::root(SchemaNode::class("Category"));
    let tree = |leaf: &str| {
        json(&format!(
            r#"{{ "name": "root", "children": [{{ "name": "a", "children": [{leaf}] }}] }}"#
        ))
    };
    validate_ok(&node, &tree(r#"{ "name": "b" }"#), &cache);

    let error = validate_err(&node, &tree(r#"{ "name": 3 }"#), &cache);
    // Category > children[0] > Category > children[0] > Category > name
    let children = &error.previous_errors[0];
    assert_eq!(children.property(), Some("children"));
    assert_eq!(children.reason, Reason::ElementTypeFailed);
    let inner = &children.previous_errors[0].previous_errors[0];
    assert_eq!(inner.reason, Reason::ElementTypeFailed);
    assert_eq!(inner.previous_errors[0].previous_errors[0].reason, Reason::NotAString);
}

fn intersection_cache() -> TypeCache {
    let mut cache = TypeCache::new();
    cache.register("Named", || {
        vec![Property::new("name", SchemaNode::root(SchemaNode::string()))]
    });
    cache.register("Aged", || {
        vec![Property::new("age", SchemaNode::root(SchemaNode::number()))]
    });
    cache
}

fn named_and_aged() -> SchemaNode {
    SchemaNode::intersection(vec![SchemaNode::class("Named"), SchemaNode::class("Aged")])
}

#[test]
fn test_intersection() {
    let cache = intersection_cache();
    let node = named_and_aged();
    validate_ok(&node, &json(r#"{ "name": "Ann", "age": 3 }"#), &cache);

    let error = validate_err(&node, &json(r#"{ "name": 1, "age": "x", "extra": 0 }"#), &cache);
    assert_eq!(error.kind, NodeKind::Intersection);
    assert_eq!(error.reason, Reason::ObjectPropertyFailed);
    assert_eq!(error.context_value("type"), Some(&Value::from("Named & Aged")));
    let reasons: Vec<_> = error.previous_errors.iter().map(|e| e.reason.clone()).collect();
    assert_eq!(
        reasons,
        vec![Reason::NotAString, Reason::NotANumber, Reason::UnknownField]
    );
}

#[test]
fn test_intersection_requires_object() {
    let cache = intersection_cache();
    let error = validate_err(&named_and_aged(), &json(r#"["Ann", 3]"#), &cache);
    assert_eq!(error.kind, NodeKind::Intersection);
    assert_eq!(error.reason, Reason::NotAnObject);
    assert_eq!(error.context_value("type"), Some(&Value::from("Named & Aged")));
    assert!(error.previous_errors.is_empty());
}

#[test]
fn test_intersection_runs_constituent_decorators() {
    let cache = intersection_cache();
    let not_anonymous = || {
        rule("notAnonymous", "ANONYMOUS", |value, _| {
            value.get("name").as_str() != Some("anonymous")
        })
    };
    let alone = SchemaNode::class("Named").with(not_anonymous());
    let node = SchemaNode::intersection(vec![
        SchemaNode::class("Named").with(not_anonymous()),
        SchemaNode::class("Aged"),
    ]);
    let value = json(r#"{ "name": "anonymous", "age": 3 }"#);

    let error = validate_err(&alone, &json(r#"{ "name": "anonymous" }"#), &cache);
    assert_eq!(error.reason, Reason::custom("ANONYMOUS"));

    let error = validate_err(&node, &value, &cache);
    assert_eq!(error.reason, Reason::ObjectPropertyFailed);
    assert_eq!(error.previous_errors.len(), 1);
    let rejected = &error.previous_errors[0];
    assert_eq!(rejected.kind, NodeKind::Decorator);
    assert_eq!(rejected.reason, Reason::custom("ANONYMOUS"));
    assert_eq!(rejected.context_value("type"), Some(&Value::from("Named")));

    validate_ok(&node, &json(r#"{ "name": "Ann", "age": 3 }"#), &cache);
}

#[test]
fn test_intersection_of_non_class_is_a_schema_error() {
    let cache = intersection_cache();
    let options = Options::default();
    let node = SchemaNode::intersection(vec![SchemaNode::class("Named"), SchemaNode::string()]);
    let value = json("{}");
    assert!(matches!(
        validate(&node, &value, &cache, &options),
        Err(SchemaError::InvalidIntersection { found: NodeKind::String })
    ));
}

#[test]
fn test_unknown_class_is_a_schema_error() {
    let cache = TypeCache::new();
    let options = Options::default();
    let node = SchemaNode::root(SchemaNode::class("Ghost"));
    let value = json("{}");
    assert!(matches!(
        validate(&node, &value, &cache, &options),
        Err(SchemaError::UnknownClass { name }) if name == "Ghost"
    ));
}

#[test]
fn test_deep_input_hits_recursion_limit() {
    let mut cache = TypeCache::new();
    cache.register("Link", || {
        vec![Property::new("next", SchemaNode::optional(SchemaNode::class("Link")))]
    });
    let mut value = json("{}");
    for _ in 0..100 {
        let mut map = schema_core::value::Map::new();
        map.insert("next".to_string(), value);
        value = Value::Object(map);
    }
    let node = SchemaNode::root(SchemaNode::class("Link"));
    let options = Options::default().max_depth(50);
    assert!(matches!(
        validate(&node, &value, &cache, &options),
        Err(SchemaError::RecursionLimit { limit: 50 })
    ));
    assert!(validate(&node, &value, &cache, &Options::default()).unwrap().is_success());
}

#[test]
fn test_repeated_validation_is_idempotent() {
    let cache = user_cache();
    let options = Options::default();
    let node = SchemaNode::root(SchemaNode::class("User"));
    let bad = json(r#"{ "name": 1 }"#);
    let first = validate(&node, &bad, &cache, &options).unwrap();
    let second = validate(&node, &bad, &cache, &options).unwrap();
    assert_eq!(first, second);

    let good = json(r#"{ "name": "Ann", "age": 2 }"#);
    let first = validate(&node, &good, &cache, &options).unwrap();
    let second = validate(&node, &good, &cache, &options).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_wire_shape() {
    let cache = TypeCache::new();
    let options = Options::default();
    let node = SchemaNode::array(SchemaNode::string());
    let value = json(r#"["a", 2]"#);
    let outcome = validate(&node, &value, &cache, &options).unwrap();
    assert_eq!(
        outcome.to_json(),
        serde_json::json!({
            "success": false,
            "type": "array",
            "value": ["a", 2.0],
            "reason": "ELEMENT_TYPE_FAILED",
            "context": { "element": 1.0 },
            "previousErrors": [{
                "type": "string",
                "value": 2.0,
                "reason": "NOT_A_STRING",
                "previousErrors": []
            }]
        })
    );

    let ok = json(r#"["a"]"#);
    assert_eq!(
        validate(&node, &ok, &cache, &options).unwrap().to_json(),
        serde_json::json!({ "success": true })
    );
}

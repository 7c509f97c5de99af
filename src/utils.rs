/// Root segment of every error path.
pub const ROOT_PATH: &str = "$";

/// Appends a property segment: `$.name`, or `$["odd key"]` when the key is not
/// a plain identifier.
pub fn property_path(base: &str, key: &str) -> String {
    if is_identifier(key) {
        format!("{base}.{key}")
    } else {
        let quoted = serde_json::to_string(key).unwrap_or_else(|_| format!("\"{key}\""));
        format!("{base}[{quoted}]")
    }
}

/// Appends an index segment: `$.items[2]`.
pub fn index_path(base: &str, index: usize) -> String {
    format!("{base}[{index}]")
}

fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

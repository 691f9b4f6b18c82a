use serde_json::Value;

/// Flatten nested objects into dotted keys. Arrays of scalars are joined;
/// arrays of objects are left to the caller as row sets.
pub fn flatten_scalars(value: &Value, prefix: &str, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (key, val) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten_scalars(val, &path, out);
            }
        }
        Value::Array(arr) if arr.iter().any(Value::is_object) => {}
        _ => out.push((prefix.to_string(), format_value(value))),
    }
}

/// Arrays of objects anywhere under `value`, keyed by dotted path.
pub fn row_sets<'a>(value: &'a Value, prefix: &str, out: &mut Vec<(String, &'a [Value])>) {
    match value {
        Value::Object(map) => {
            for (key, val) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                row_sets(val, &path, out);
            }
        }
        Value::Array(arr) if !arr.is_empty() && arr.iter().all(Value::is_object) => {
            out.push((prefix.to_string(), arr.as_slice()));
        }
        _ => {}
    }
}

pub fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(format_value).collect();
            items.join(", ")
        }
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}

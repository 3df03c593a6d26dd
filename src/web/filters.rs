//! Template filters.

use std::collections::HashMap;

use serde_json::Value;

/// Formats an 11-digit phone number as `+7 (905) 212-47-55`. Anything else is left alone.
pub fn phone_format(value: &Value, _: &HashMap<String, Value>) -> tera::Result<Value> {
    let digits = match value.as_str() {
        Some(s) if s.len() == 11 && s.bytes().all(|b| b.is_ascii_digit()) => s,
        _ => return Ok(value.clone()),
    };
    Ok(Value::String(format!(
        "+{} ({}) {}-{}-{}",
        &digits[..1],
        &digits[1..4],
        &digits[4..7],
        &digits[7..9],
        &digits[9..]
    )))
}

/// Serializes a value to JSON, for embedding data in pages.
pub fn tojson(value: &Value, _: &HashMap<String, Value>) -> tera::Result<Value> {
    serde_json::to_string(value)
        .map(Value::String)
        .map_err(|e| tera::Error::msg(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn phone(value: Value) -> Value {
        phone_format(&value, &HashMap::new()).unwrap()
    }

    #[test]
    fn formats_russian_numbers() {
        assert_eq!(phone(json!("79052124755")), json!("+7 (905) 212-47-55"));
    }

    #[test]
    fn leaves_other_values_alone() {
        assert_eq!(phone(json!("")), json!(""));
        assert_eq!(phone(json!("+79052124755")), json!("+79052124755"));
        assert_eq!(phone(json!("7905212475")), json!("7905212475"));
        assert_eq!(phone(json!(null)), json!(null));
    }

    #[test]
    fn encodes_json() {
        let encoded = tojson(&json!({"a": [1, "b"]}), &HashMap::new()).unwrap();
        assert_eq!(encoded, json!(r#"{"a":[1,"b"]}"#));
    }
}

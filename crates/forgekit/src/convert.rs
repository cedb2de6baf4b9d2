//! Conversion between engine property values and JSON payloads.

use crate::error::{Error, Result};
use declarative::{Properties, Value};
use serde_json::{Map, Value as Json};

/// Convert a property value to JSON.
pub fn to_json(value: &Value) -> Json {
    match value {
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(i) => Json::from(*i),
        Value::String(s) => Json::String(s.clone()),
        Value::List(items) => Json::Array(items.iter().cloned().map(Json::String).collect()),
    }
}

/// Convert a JSON scalar or string array to a property value.
///
/// Returns `None` for null, floats, objects and mixed arrays.
pub fn from_json(json: &Json) -> Option<Value> {
    match json {
        Json::Bool(b) => Some(Value::Bool(*b)),
        Json::Number(n) => n.as_i64().map(Value::Int),
        Json::String(s) => Some(Value::String(s.clone())),
        Json::Array(items) => items
            .iter()
            .map(|i| i.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()
            .map(Value::List),
        Json::Null | Json::Object(_) => None,
    }
}

/// Request body from declared properties, leaving out `skip`.
pub fn body(properties: &Properties, skip: &[&str]) -> Map<String, Json> {
    properties
        .iter()
        .filter(|(name, _)| !skip.contains(&name.as_str()))
        .map(|(name, value)| (name.clone(), to_json(value)))
        .collect()
}

/// Read the named fields of a response into properties.
///
/// A JSON `null` for a string field reads as the empty string so that an
/// unset description compares equal to a declared empty one.
pub fn pick(json: &Json, fields: &[&str]) -> Properties {
    fields
        .iter()
        .filter_map(|&field| {
            let value = match json.get(field)? {
                Json::Null => Value::String(String::new()),
                other => from_json(other)?,
            };
            Some((field.to_string(), value))
        })
        .collect()
}

/// Required string field of a response.
pub fn str_field<'a>(json: &'a Json, field: &str) -> Result<&'a str> {
    json.get(field)
        .and_then(Json::as_str)
        .ok_or_else(|| Error::InvalidResponse(format!("missing string field '{field}'")))
}

/// Required integer field of a response.
pub fn int_field(json: &Json, field: &str) -> Result<i64> {
    json.get(field)
        .and_then(Json::as_i64)
        .ok_or_else(|| Error::InvalidResponse(format!("missing integer field '{field}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::properties;
    use serde_json::json;

    #[test]
    fn test_body_skips_local_properties() {
        let props = properties([
            ("name", Value::from("desired-state")),
            ("has_issues", Value::from(true)),
            ("topics", Value::list(["go"])),
            ("value_digest", Value::from("abc")),
        ]);
        let body = body(&props, &["topics", "value_digest"]);
        assert_eq!(
            Json::Object(body),
            json!({"name": "desired-state", "has_issues": true})
        );
    }

    #[test]
    fn test_pick_fields() {
        let response = json!({
            "id": 123,
            "name": "desired-state",
            "description": null,
            "topics": ["dagger", "go"],
            "permissions": {"admin": true},
            "score": 1.5
        });
        let props = pick(
            &response,
            &["name", "description", "topics", "permissions", "score", "absent"],
        );
        assert_eq!(
            props,
            properties([
                ("name", Value::from("desired-state")),
                ("description", Value::from("")),
                ("topics", Value::list(["dagger", "go"])),
            ])
        );
    }

    #[test]
    fn test_from_json_mixed_array() {
        assert_eq!(from_json(&json!(["a", 1])), None);
        assert_eq!(from_json(&json!(42)), Some(Value::Int(42)));
    }

    #[test]
    fn test_required_fields() {
        let response = json!({"id": 7, "web_url": "https://gitlab.com/g/p"});
        assert_eq!(int_field(&response, "id").unwrap(), 7);
        assert_eq!(str_field(&response, "web_url").unwrap(), "https://gitlab.com/g/p");
        assert!(str_field(&response, "id").is_err());
    }
}

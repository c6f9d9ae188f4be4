//! Strict JSON Schema validation for tool arguments (spec §4.1).

use serde_json::Value;

/// Validates `arguments` against `schema`. Returns `Err(message)` naming the
/// first violation on failure; the registry never invokes a handler with
/// invalid arguments.
pub fn validate_arguments(schema: &Value, arguments: &Value) -> Result<(), String> {
    let validator = match jsonschema::validator_for(schema) {
        Ok(v) => v,
        Err(err) => return Err(format!("invalid schema: {err}")),
    };
    if let Some(error) = validator.iter_errors(arguments).next() {
        return Err(format!("{error} at {}", error.instance_path));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {"name": {"type": "string"}},
            "required": ["name"],
            "additionalProperties": false
        })
    }

    #[test]
    fn rejects_unknown_property() {
        let err = validate_arguments(&schema(), &json!({"name": "a", "extra": 1}))
            .expect_err("should reject");
        assert!(!err.is_empty());
    }

    #[test]
    fn rejects_missing_required() {
        assert!(validate_arguments(&schema(), &json!({})).is_err());
    }

    #[test]
    fn accepts_valid_payload() {
        assert!(validate_arguments(&schema(), &json!({"name": "Alice"})).is_ok());
    }
}

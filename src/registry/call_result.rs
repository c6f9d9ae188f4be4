//! Tagged-union tool-call result (SPEC_FULL §9: `Text`, `Data`, `Unknown` +
//! `isError`), shared between native handler returns and MCP proxy results.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CallContent {
    Text { text: String },
    Data { data: Value },
    Unknown { value: Value },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub content: Vec<CallContent>,
    #[serde(rename = "isError")]
    pub is_error: bool,
}

impl ToolCallResult {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![CallContent::Text {
                text: format!("Error: {}", message.into()),
            }],
            is_error: true,
        }
    }

    /// Wraps a successful native-handler return: a string value is used
    /// verbatim, anything else is pretty-printed JSON (spec §4.5.4).
    pub fn from_value(value: Value) -> Self {
        let text = match &value {
            Value::String(s) => s.clone(),
            other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
        };
        Self {
            content: vec![CallContent::Text { text }],
            is_error: false,
        }
    }

    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| match c {
                CallContent::Text { text } => Some(text.clone()),
                CallContent::Data { data } => Some(data.to_string()),
                CallContent::Unknown { value } => Some(value.to_string()),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Recovers the handler's raw return value from the MCP content
    /// envelope, undoing `from_value`'s wrapping: the REST/OpenAPI frontend
    /// returns this, not the envelope itself, matching the original
    /// implementation's `registry.py` (handler return passed straight
    /// through) rather than `mcp_http_server.py`'s `{content, isError}`
    /// wrapping, which is MCP-transport-specific.
    pub fn raw_value(&self) -> Value {
        match self.content.as_slice() {
            [CallContent::Data { data }] => data.clone(),
            [CallContent::Text { text }] => {
                serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.clone()))
            }
            [CallContent::Unknown { value }] => value.clone(),
            _ => Value::Array(
                self.content
                    .iter()
                    .map(|c| match c {
                        CallContent::Text { text } => {
                            serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.clone()))
                        }
                        CallContent::Data { data } => data.clone(),
                        CallContent::Unknown { value } => value.clone(),
                    })
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_value_recovers_a_string() {
        let result = ToolCallResult::from_value(json!("Hello, Alice!"));
        assert_eq!(result.raw_value(), json!("Hello, Alice!"));
    }

    #[test]
    fn raw_value_recovers_a_number() {
        let result = ToolCallResult::from_value(json!(5.0));
        assert_eq!(result.raw_value(), json!(5.0));
    }

    #[test]
    fn raw_value_recovers_an_object() {
        let result = ToolCallResult::from_value(json!({"sum": 5, "ok": true}));
        assert_eq!(result.raw_value(), json!({"sum": 5, "ok": true}));
    }

    #[test]
    fn error_results_are_not_touched_by_raw_value() {
        let result = ToolCallResult::error("boom");
        assert_eq!(result.raw_value(), json!("Error: boom"));
    }
}

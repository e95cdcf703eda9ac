use serde::{Deserialize, Serialize};

/// A tool call requested by the assistant while a run is in
/// `requires_action`.  Every call must receive exactly one [`ToolOutput`]
/// before the run can proceed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub call_id: String,
    pub tool_name: String,
    /// Parsed JSON arguments.  Providers that deliver arguments as a JSON
    /// string are decoded by the adapter; undecodable input is kept as a
    /// JSON string value.
    pub arguments: serde_json::Value,
}

/// The serialized result returned to the assistant for one tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    #[serde(rename = "tool_call_id")]
    pub call_id: String,
    pub output: String,
}

impl ToolOutput {
    pub fn new(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            output: output.into(),
        }
    }

    /// Serialized error object for a failed handler.
    pub fn error(call_id: impl Into<String>, kind: &str, message: impl Into<String>) -> Self {
        let body = serde_json::json!({
            "error": message.into(),
            "kind": kind,
        });
        Self {
            call_id: call_id.into(),
            output: body.to_string(),
        }
    }

    /// True when the output is a serialized error object.
    pub fn is_error(&self) -> bool {
        serde_json::from_str::<serde_json::Value>(&self.output)
            .ok()
            .and_then(|v| v.get("error").cloned())
            .is_some()
    }
}

/// Tool definition exposed to the assistant when a run is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's parameters.
    pub parameters: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_output_is_detected() {
        let out = ToolOutput::error("call_1", "validation", "assignee is required");
        assert!(out.is_error());
        let v: serde_json::Value = serde_json::from_str(&out.output).unwrap();
        assert_eq!(v["kind"], "validation");

        let ok = ToolOutput::new("call_2", r#"{"status":"ok"}"#);
        assert!(!ok.is_error());
    }

    #[test]
    fn output_serializes_with_wire_field_name() {
        let out = ToolOutput::new("call_9", "done");
        let v = serde_json::to_value(&out).unwrap();
        assert_eq!(v["tool_call_id"], "call_9");
    }
}

// Error taxonomy for tool dispatch and the conversation loop.
//
// Tool-level failures are recoverable: they become tool-result payloads the
// model can react to. Orchestrator-level failures abort the current question.

use thiserror::Error;

/// Failure of a single tool call. Caught at the per-call boundary and turned
/// into a structured tool result; never aborts the batch or the loop.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Bad or missing arguments. Rejected before any query executes.
    #[error("invalid arguments: {0}")]
    Validation(String),

    /// The model requested a tool name that is not in the catalog.
    #[error("unknown tool: {0}")]
    NotFound(String),

    /// Store-level failure, timeout, or malformed compiled plan.
    #[error("tool execution failed: {0}")]
    Execution(String),
}

impl ToolError {
    /// Missing required field.
    pub fn missing(field: &str) -> Self {
        ToolError::Validation(format!("missing required field '{}'", field))
    }

    /// Field present but with the wrong JSON type.
    pub fn wrong_type(field: &str, expected: &str) -> Self {
        ToolError::Validation(format!(
            "field '{}' has the wrong type, expected {}",
            field, expected
        ))
    }

    /// Serialize for the model: a tool-result payload describing the failure
    /// so the next model turn can adapt its call.
    pub fn to_payload(&self) -> serde_json::Value {
        let kind = match self {
            ToolError::Validation(_) => "validation_error",
            ToolError::NotFound(_) => "tool_not_found",
            ToolError::Execution(_) => "execution_error",
        };
        serde_json::json!({ "error": kind, "message": self.to_string() })
    }
}

/// Fatal failure of one question's processing.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The language-model capability failed or returned an unparseable
    /// response. Not retried; surfaced to the caller once.
    #[error("language model error: {0}")]
    UpstreamModel(String),

    #[error("session error: {0}")]
    Session(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_names_field() {
        let err = ToolError::missing("deputy_id");
        assert!(err.to_string().contains("deputy_id"));

        let err = ToolError::wrong_type("year", "integer");
        assert!(err.to_string().contains("year"));
        assert!(err.to_string().contains("integer"));
    }

    #[test]
    fn test_payload_distinguishes_kinds() {
        let v = ToolError::missing("name").to_payload();
        assert_eq!(v["error"], "validation_error");

        let v = ToolError::NotFound("get_nothing".into()).to_payload();
        assert_eq!(v["error"], "tool_not_found");

        let v = ToolError::Execution("timeout".into()).to_payload();
        assert_eq!(v["error"], "execution_error");
    }
}

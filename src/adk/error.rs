// SPDX-License-Identifier: MIT

//! Typed error handling for casegen-rs
//!
//! Every collaborator boundary returns a tagged [`CallError`] so the retry
//! wrapper and the fan-in barrier can match on it instead of unwinding.
//! Graph failures wrap the failing node's error in [`WorkflowError::NodeExecution`].

use thiserror::Error;

/// Top-level error type for casegen-rs
#[derive(Debug, Error)]
pub enum CasegenError {
    /// Configuration errors (missing env vars, invalid settings)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The caller's request cannot be processed as given
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A collaborator call failed after its retry budget
    #[error(transparent)]
    Call(#[from] CallError),

    /// Graph construction or execution errors
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    /// The pipeline finished without a selectable case
    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

/// Graph construction and execution errors
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// A node failed; always fatal to the enclosing graph execution
    #[error("Node '{node}' failed: {cause}")]
    NodeExecution {
        node: String,
        #[source]
        cause: Box<CasegenError>,
    },

    /// Edge or dispatch refers to a node the graph does not declare
    #[error("Unknown node: {0}")]
    UnknownNode(String),

    /// Fan-out dispatched to a node that is not declared as a branch node
    #[error("Node '{0}' is not a branch node and cannot be a fan-out target")]
    NotABranchNode(String),

    /// Branch nodes return to their fan-out's join and declare no edge
    #[error("Branch node '{0}' cannot declare an outgoing edge")]
    BranchNodeEdge(String),

    /// A non-terminal node has no outgoing edge
    #[error("Node '{0}' has no outgoing edge")]
    MissingEdge(String),

    /// A conditional router returned a successor it did not declare
    #[error("Router of '{from}' returned undeclared successor '{to}'")]
    UndeclaredRoute { from: String, to: String },

    /// Node already has an outgoing edge
    #[error("Node '{0}' has more than one outgoing edge")]
    DuplicateEdge(String),

    /// Graph has no entry edge
    #[error("Graph '{0}' has no start edge")]
    MissingStart(String),

    /// Node name declared twice, or reserved
    #[error("Duplicate or reserved node name: {0}")]
    DuplicateNode(String),

    /// Runaway graph guard
    #[error("Graph '{graph}' exceeded step limit of {limit}")]
    StepLimitExceeded { graph: String, limit: u32 },

    /// State schema declares a reducer that cannot apply to the field type
    #[error("Invalid state schema: {0}")]
    InvalidSchema(String),

    /// A node read a state field that is missing or has the wrong shape
    #[error("Invalid state field '{field}': {message}")]
    InvalidState { field: String, message: String },
}

/// Errors at a collaborator (model call) boundary
#[derive(Debug, Error)]
pub enum CallError {
    /// Network/service unreachable, rate limited or overloaded
    #[error("Model service unreachable ({provider}): {message}")]
    Transient { provider: String, message: String },

    /// Non-retryable-by-nature API errors from the provider
    #[error("API error from {provider}: {message}")]
    Api { provider: String, message: String },

    /// API key not configured
    #[error("API key not configured for provider: {0}")]
    ApiKeyMissing(String),

    /// Malformed or schema-invalid model output
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Structured decoding errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    /// Model returned nothing usable
    #[error("Model output is empty")]
    Empty,

    /// Output is not valid JSON, even after repair
    #[error("Malformed output (after repair): {0}")]
    Syntax(String),

    /// Output parsed but does not satisfy the schema
    #[error("Output does not match schema: {0}")]
    Schema(String),
}

impl CasegenError {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an invalid request error
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Innermost error, looking through nested node failures
    pub fn root_cause(&self) -> &CasegenError {
        match self {
            CasegenError::Workflow(WorkflowError::NodeExecution { cause, .. }) => {
                cause.root_cause()
            }
            other => other,
        }
    }

    /// Whether the failure came from an unreachable model service
    pub fn is_transient(&self) -> bool {
        matches!(
            self.root_cause(),
            CasegenError::Call(CallError::Transient { .. })
        )
    }

    /// Diagnostic code for the transport layer
    pub fn code(&self) -> &'static str {
        match self.root_cause() {
            CasegenError::Call(CallError::Transient { .. }) => "MODEL_UNREACHABLE",
            CasegenError::InvalidRequest(_) | CasegenError::Config(_) => "INVALID_REQUEST",
            _ => "GENERATION_FAILED",
        }
    }

    /// HTTP-style status for the transport layer
    pub fn status_code(&self) -> u16 {
        match self.code() {
            "MODEL_UNREACHABLE" => 503,
            "INVALID_REQUEST" => 400,
            _ => 500,
        }
    }
}

impl WorkflowError {
    /// Wrap a node's error
    pub fn node(node: impl Into<String>, cause: CasegenError) -> Self {
        Self::NodeExecution {
            node: node.into(),
            cause: Box::new(cause),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidState {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl CallError {
    /// Create a transient error
    pub fn transient(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transient {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create an API error
    pub fn api(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nested(cause: CasegenError) -> CasegenError {
        let inner = WorkflowError::node("draft_generation", cause);
        CasegenError::Workflow(WorkflowError::node("draft_phase", inner.into()))
    }

    #[test]
    fn test_transient_cause_found_through_nested_nodes() {
        let err = nested(CallError::transient("ollama", "connection refused").into());
        assert!(err.is_transient());
        assert_eq!(err.code(), "MODEL_UNREACHABLE");
        assert_eq!(err.status_code(), 503);
    }

    #[test]
    fn test_decode_failure_maps_to_generation_failed() {
        let err = nested(CallError::Decode(DecodeError::Schema("missing field".into())).into());
        assert!(!err.is_transient());
        assert_eq!(err.code(), "GENERATION_FAILED");
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn test_invalid_request_code() {
        let err = CasegenError::invalid_request("empty target");
        assert_eq!(err.code(), "INVALID_REQUEST");
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_node_error_message_names_node() {
        let err = nested(CasegenError::GenerationFailed("none".into()));
        assert!(err.to_string().contains("draft_phase"));
    }
}

//! Error taxonomy for testbed orchestration.

use thiserror::Error;

/// One failed step of a multi-step operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    pub target: String,
    pub reason: String,
}

impl std::fmt::Display for StepFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.target, self.reason)
    }
}

/// Errors that can occur while orchestrating the testbed.
#[derive(Debug, Error)]
pub enum TwinError {
    /// Bad node types or a missing required relationship.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate confirm of an existing pair. Resolved as a no-op internally.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Destination cluster is not ready to host placements.
    #[error("resource unavailable: {0}")]
    Resource(String),

    /// Replay process failed to start or stop.
    #[error("replay process error: {0}")]
    Process(String),

    /// A cascade or cleanup step partly failed.
    #[error("{operation} partially failed: {} completed, {} failed ({})", completed.len(), failed.len(), join_failures(failed))]
    PartialFailure {
        operation: String,
        completed: Vec<String>,
        failed: Vec<StepFailure>,
    },

    /// Upstream transport failure.
    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("no data: {0}")]
    NoData(String),

    /// Local persistence failure.
    #[error("storage error: {0}")]
    Storage(String),
}

fn join_failures(failed: &[StepFailure]) -> String {
    failed
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl TwinError {
    /// Short machine-readable kind, used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            TwinError::Validation(_) => "validation",
            TwinError::NotFound(_) => "not_found",
            TwinError::Conflict(_) => "conflict",
            TwinError::Resource(_) => "resource",
            TwinError::Process(_) => "process",
            TwinError::PartialFailure { .. } => "partial_failure",
            TwinError::Fetch(_) => "fetch",
            TwinError::NoData(_) => "no_data",
            TwinError::Storage(_) => "storage",
        }
    }

    /// Invalid node type for a peering or placement operation.
    pub fn invalid_node_type(node: &str, expected: &str) -> Self {
        TwinError::Validation(format!("node '{}' is not a {}", node, expected))
    }
}

impl From<std::io::Error> for TwinError {
    fn from(e: std::io::Error) -> Self {
        TwinError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for TwinError {
    fn from(e: serde_json::Error) -> Self {
        TwinError::Storage(e.to_string())
    }
}

impl From<reqwest::Error> for TwinError {
    fn from(e: reqwest::Error) -> Self {
        TwinError::Fetch(e.to_string())
    }
}

pub type TwinResult<T> = Result<T, TwinError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_failure_message_lists_failures() {
        let err = TwinError::PartialFailure {
            operation: "connection removal".to_string(),
            completed: vec!["vp-001".to_string()],
            failed: vec![StepFailure {
                target: "vp-002".to_string(),
                reason: "exec timed out".to_string(),
            }],
        };

        let msg = err.to_string();
        assert!(msg.contains("1 completed"));
        assert!(msg.contains("vp-002: exec timed out"));
        assert_eq!(err.kind(), "partial_failure");
    }

    #[test]
    fn test_invalid_node_type() {
        let err = TwinError::invalid_node_type("r1", "k3s-node");
        assert!(matches!(err, TwinError::Validation(_)));
        assert_eq!(err.to_string(), "validation failed: node 'r1' is not a k3s-node");
    }
}

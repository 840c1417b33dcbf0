//! Error types for graph operations
//!
//! This module defines custom error types for the weft-graph library,
//! covering store lookups, delta validation, and status vocabulary checks.

use thiserror::Error;

/// Main error type for graph store operations
#[derive(Error, Debug)]
pub enum GraphError {
    /// Workflow lookup failed
    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    /// Node lookup failed
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// Edge lookup failed
    #[error("Edge not found: {0}")]
    EdgeNotFound(String),

    /// An entity with this id already exists
    #[error("Duplicate id: {0}")]
    DuplicateId(String),

    /// Status is not in the workflow's declared vocabulary
    #[error("Status '{status}' is not declared for workflow {workflow_id}")]
    UnknownStatus { status: String, workflow_id: String },

    /// A delta failed referential-integrity validation
    #[error("Invalid delta: {}", .problems.join("; "))]
    InvalidDelta { problems: Vec<String> },

    /// Serialization/Deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Underlying storage failure
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result type alias for graph operations
pub type Result<T> = std::result::Result<T, GraphError>;

impl From<String> for GraphError {
    fn from(s: String) -> Self {
        GraphError::Storage(s)
    }
}

impl From<&str> for GraphError {
    fn from(s: &str) -> Self {
        GraphError::Storage(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = GraphError::NodeNotFound("node-42".to_string());
        assert_eq!(error.to_string(), "Node not found: node-42");

        let status_error = GraphError::UnknownStatus {
            status: "Shipped".to_string(),
            workflow_id: "wf-1".to_string(),
        };
        assert!(status_error.to_string().contains("Shipped"));

        let delta_error = GraphError::InvalidDelta {
            problems: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(delta_error.to_string(), "Invalid delta: a; b");
    }

    #[test]
    fn test_error_conversion() {
        let error: GraphError = "boom".into();
        assert!(matches!(error, GraphError::Storage(_)));
    }
}

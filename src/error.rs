//! Error handling for the MediaFlow runtime.
//!
//! This module defines the crate-wide error type and a Result alias for use
//! throughout the runtime.

use crate::types::NodeName;
use thiserror::Error;

/// Main error type for MediaFlow operations
#[derive(Error, Debug)]
pub enum FlowError {
    /// No factory registered for the requested node type
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    /// A request referenced a node the manager does not own
    #[error("Node not found: {0}")]
    NodeNotFound(NodeName),

    /// A create request reused a live node name
    #[error("Node already exists: {0}")]
    DuplicateNode(NodeName),

    /// A request referenced a port the node does not declare
    #[error("Port '{port}' not found on node {node}")]
    PortNotFound { node: NodeName, port: String },

    /// The requested connection would create a dependency cycle
    #[error("Connecting {from} -> {to} would create a cycle")]
    CycleDetected { from: NodeName, to: NodeName },

    /// Errors from the shared-memory frame channel
    #[error("Frame channel error: {0}")]
    Frame(String),

    /// Errors from the media decoder boundary
    #[error("Decode error: {0}")]
    Decode(String),

    /// Malformed or missing node parameters
    #[error("Parameter error: {0}")]
    Params(String),

    /// An awaited dependency did not complete within the deadline
    #[error("Timed out waiting for dependency node {0}")]
    DependencyTimeout(NodeName),

    /// Errors related to channel communication
    #[error("Channel error: {0}")]
    Channel(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<FlowError>,
    },
}

impl FlowError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        FlowError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Result type alias for MediaFlow operations
pub type Result<T> = std::result::Result<T, FlowError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FlowError::UnknownNodeType("Mystery".to_string());
        assert_eq!(err.to_string(), "Unknown node type: Mystery");
    }

    #[test]
    fn test_error_with_context() {
        let err = FlowError::Params("missing media_path".to_string());
        let with_ctx = err.with_context("Failed to configure player");
        assert!(with_ctx.to_string().contains("Failed to configure player"));
    }

    #[test]
    fn test_port_not_found_display() {
        let err = FlowError::PortNotFound {
            node: "ns.T.1".into(),
            port: "Frame".to_string(),
        };
        assert!(err.to_string().contains("Frame"));
        assert!(err.to_string().contains("ns.T.1"));
    }
}

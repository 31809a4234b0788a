//! Error types for graphfuse
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Main error type for graph fusion operations
#[derive(Error, Debug)]
pub enum FuseError {
    /// A node with this name already exists in the graph
    #[error("Duplicate node: {0}")]
    DuplicateNode(String),

    /// Node not found in the graph
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// Submodule path not present in the module table
    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    /// An argument referenced a node absent from the rewrite environment
    #[error("Dangling reference in {node}: no binding for '{arg}'")]
    DanglingReference {
        /// Node whose argument failed to resolve
        node: String,
        /// The unresolved node name
        arg: String,
    },

    /// A matched-node tree had no node leaf where one was required
    #[error("Malformed match: {0}")]
    MalformedMatch(String),

    /// A handler factory failed during match-index construction
    #[error("Handler factory failed: {0}")]
    HandlerFactory(String),

    /// No fuser method registered for a matched kind sequence
    #[error("No fuser method for kind sequence: {0}")]
    NoFuserMethod(String),

    /// Invalid node configuration
    #[error("Invalid node: {0}")]
    InvalidNode(String),

    /// Graph validation failed
    #[error("Graph validation failed: {0}")]
    ValidationFailed(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for fusion operations
pub type FuseResult<T> = Result<T, FuseError>;

//! Error types for the graph core

use thiserror::Error;

use crate::graph::Connection;

/// Result type alias using ScadGraphError
pub type Result<T> = std::result::Result<T, ScadGraphError>;

/// Errors that can occur while editing, resolving or rendering graphs
#[derive(Debug, Error)]
pub enum ScadGraphError {
    /// A caller contract was broken (duplicate id, connected node removal, ...)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// A connection the rule engine rejects reached the mutator
    #[error("Connection {connection} in graph '{graph}' was vetoed")]
    ConnectionVetoed { graph: String, connection: Connection },

    /// Node id not present in the graph
    #[error("Node '{node}' not found in graph '{graph}'")]
    NodeNotFound { graph: String, node: String },

    /// Graph id not present in the project
    #[error("Graph not found: {0}")]
    GraphNotFound(String),

    /// Reference could not be resolved through the resolver chain
    #[error("Unresolved {kind} reference: {id}")]
    UnresolvedReference { kind: &'static str, id: String },

    /// A persisted record is corrupt or has an unrecognized shape
    #[error("Broken file: {0}")]
    BrokenFile(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Compression error
    #[error("Compression error: {0}")]
    Compression(String),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScadGraphError {
    /// Create an invariant violation with a message
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    /// Create a broken file error with a message
    pub fn broken(msg: impl Into<String>) -> Self {
        Self::BrokenFile(msg.into())
    }

    pub fn node_not_found(graph: &str, node: &str) -> Self {
        Self::NodeNotFound {
            graph: graph.to_string(),
            node: node.to_string(),
        }
    }

    /// True for errors that should be shown to the user rather than treated as bugs
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::BrokenFile(_)
                | Self::UnresolvedReference { .. }
                | Self::Serialization(_)
                | Self::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broken_file_is_distinct_from_invariant() {
        let broken = ScadGraphError::broken("unknown node kind 'foo'");
        let invariant = ScadGraphError::invariant("duplicate node id");
        assert!(broken.is_user_facing());
        assert!(!invariant.is_user_facing());
        assert_eq!(broken.to_string(), "Broken file: unknown node kind 'foo'");
    }

    #[test]
    fn test_vetoed_message_names_connection() {
        let err = ScadGraphError::ConnectionVetoed {
            graph: "main".into(),
            connection: Connection::new("a", 0, "b", 1),
        };
        assert_eq!(
            err.to_string(),
            "Connection a:0 -> b:1 in graph 'main' was vetoed"
        );
    }
}

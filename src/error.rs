//! Error types for Ensemble

use std::fmt;
use thiserror::Error;

/// Result type for Ensemble operations
pub type Result<T> = std::result::Result<T, EnsembleError>;

/// A single node that failed during script execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeFailure {
    /// Provider node ID
    pub node: String,
    /// What went wrong on that node
    pub reason: String,
}

impl NodeFailure {
    pub fn new(node: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for NodeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.node, self.reason)
    }
}

/// Ensemble error types
#[derive(Error, Debug)]
pub enum EnsembleError {
    #[error("Unknown role: {0}")]
    UnknownRole(String),

    #[error("Unknown service: {0}")]
    UnknownService(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Provision error: {0}")]
    Provision(String),

    #[error("Quorum not met: {created} of {requested} nodes created, at least {required} required")]
    QuorumNotMet {
        requested: usize,
        created: usize,
        required: usize,
    },

    #[error("{phase} script failed on {}", format_failures(.failed_nodes))]
    ScriptExecution {
        phase: String,
        failed_nodes: Vec<NodeFailure>,
    },

    #[error("Cannot resolve address of node {node}: {reason}")]
    AddressResolution { node: String, reason: String },

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("Script source error: {0}")]
    ScriptSource(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl EnsembleError {
    /// IDs of the nodes a script failed on, if this is a script error
    pub fn failed_nodes(&self) -> Vec<&str> {
        match self {
            EnsembleError::ScriptExecution { failed_nodes, .. } => {
                failed_nodes.iter().map(|f| f.node.as_str()).collect()
            }
            _ => Vec::new(),
        }
    }
}

fn format_failures(failures: &[NodeFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

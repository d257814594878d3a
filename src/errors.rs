// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

use crate::types::{NodeId, TaskState};

#[derive(Error, Debug)]
pub enum AwelError {
    #[error("Invalid dependency: {0}")]
    InvalidDependency(String),

    #[error("Node '{node}' belongs to DAG '{found}', not to DAG '{expected}'")]
    CrossDag {
        node: NodeId,
        expected: String,
        found: String,
    },

    #[error("Duplicate node name in DAG: {0}")]
    DuplicateNodeName(String),

    #[error("Duplicate node id in DAG: {0}")]
    DuplicateNodeId(NodeId),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Cycle detected in DAG: {0}")]
    DagCycle(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Task output is not a stream")]
    NotAStream,

    #[error("Stream output was already consumed")]
    StreamConsumed,

    #[error("Share data key '{0}' already exists")]
    ShareDataKeyExists(String),

    #[error("Invalid state transition for task '{task}': {from} -> {to}")]
    InvalidStateTransition {
        task: NodeId,
        from: TaskState,
        to: TaskState,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AwelError {
    /// Shorthand for a [`AwelError::ConfigError`].
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, AwelError>;

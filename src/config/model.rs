// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use crate::exec::DEFAULT_BLOCKING_THREADS;

/// Workflow file as read from TOML, before validation.
///
/// ```toml
/// [config]
/// blocking_threads = 4
/// leaf = "out"
///
/// [node.source]
/// kind = "input"
/// value = 5
///
/// [node.out]
/// kind = "map"
/// cmd = "jq '. * .'"
/// after = ["source"]
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RawWorkflowFile {
    #[serde(default)]
    pub config: EngineSection,

    /// Keys are node names; they double as node ids.
    #[serde(default)]
    pub node: BTreeMap<String, NodeConfig>,
}

/// A validated workflow file. Build it with `WorkflowFile::try_from`.
#[derive(Debug, Clone)]
pub struct WorkflowFile {
    pub config: EngineSection,
    pub node: BTreeMap<String, NodeConfig>,
}

impl WorkflowFile {
    pub(crate) fn new_unchecked(config: EngineSection, node: BTreeMap<String, NodeConfig>) -> Self {
        Self { config, node }
    }

    /// Names of nodes no other node lists in `after`.
    pub fn leaf_names(&self) -> Vec<&str> {
        self.node
            .keys()
            .filter(|name| !self.node.values().any(|n| n.after.contains(*name)))
            .map(String::as_str)
            .collect()
    }

    /// Names of nodes with an empty `after`.
    pub fn root_names(&self) -> Vec<&str> {
        self.node
            .iter()
            .filter(|(_, n)| n.after.is_empty())
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    /// Upper bound on concurrently running blocking functions.
    #[serde(default = "default_blocking_threads")]
    pub blocking_threads: usize,

    /// Node whose output a run returns. Optional when the workflow has a
    /// single leaf.
    #[serde(default)]
    pub leaf: Option<String>,
}

fn default_blocking_threads() -> usize {
    DEFAULT_BLOCKING_THREADS
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            blocking_threads: default_blocking_threads(),
            leaf: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Input,
    Trigger,
    Map,
    Join,
    Reduce,
    Branch,
    Streamify,
    Unstreamify,
    TransformStream,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Input => "input",
            NodeKind::Trigger => "trigger",
            NodeKind::Map => "map",
            NodeKind::Join => "join",
            NodeKind::Reduce => "reduce",
            NodeKind::Branch => "branch",
            NodeKind::Streamify => "streamify",
            NodeKind::Unstreamify => "unstreamify",
            NodeKind::TransformStream => "transform_stream",
        }
    }
}

/// `[node.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    pub kind: NodeKind,

    /// Shell command implementing the node's function.
    #[serde(default)]
    pub cmd: Option<String>,

    /// `input` only: a literal value to emit.
    #[serde(default)]
    pub value: Option<Value>,

    /// `input` only: a literal sequence to emit as a stream.
    #[serde(default)]
    pub items: Option<Vec<Value>>,

    /// Parents, in order.
    #[serde(default)]
    pub after: Vec<String>,

    /// `branch` only.
    #[serde(default)]
    pub branches: Vec<BranchConfig>,
}

/// One `[[node.<name>.branches]]` entry: the target runs only when `cmd`
/// exits successfully.
#[derive(Debug, Clone, Deserialize)]
pub struct BranchConfig {
    pub cmd: String,
    pub target: String,
}

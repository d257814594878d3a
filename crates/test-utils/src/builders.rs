#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use awel::config::{
    BranchConfig, EngineSection, NodeConfig, NodeKind, RawWorkflowFile, WorkflowFile,
};
use awel::operator::Operator;
use awel::{Dag, NodeOptions, NodeRef};
use serde_json::Value;

/// Add `op` to `dag` with a fixed id (also used as its name), so tests can
/// refer to nodes and call data keys by readable strings.
pub fn node_with_id(dag: &mut Dag, id: &str, op: impl Operator + 'static) -> NodeRef {
    dag.add_with(NodeOptions::named(id).with_id(id), Arc::new(op))
        .expect("node ids in tests are unique")
}

/// Builder for `WorkflowFile` to simplify test setup.
pub struct WorkflowBuilder {
    raw: RawWorkflowFile,
}

impl WorkflowBuilder {
    pub fn new() -> Self {
        Self {
            raw: RawWorkflowFile {
                config: EngineSection::default(),
                node: BTreeMap::new(),
            },
        }
    }

    pub fn with_node(mut self, name: &str, node: NodeConfig) -> Self {
        self.raw.node.insert(name.to_string(), node);
        self
    }

    pub fn with_leaf(mut self, leaf: &str) -> Self {
        self.raw.config.leaf = Some(leaf.to_string());
        self
    }

    pub fn with_blocking_threads(mut self, n: usize) -> Self {
        self.raw.config.blocking_threads = n;
        self
    }

    pub fn raw(self) -> RawWorkflowFile {
        self.raw
    }

    pub fn build(self) -> WorkflowFile {
        WorkflowFile::try_from(self.raw).expect("Failed to build valid workflow from builder")
    }
}

impl Default for WorkflowBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `NodeConfig`.
pub struct NodeConfigBuilder {
    node: NodeConfig,
}

impl NodeConfigBuilder {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            node: NodeConfig {
                kind,
                cmd: None,
                value: None,
                items: None,
                after: vec![],
                branches: vec![],
            },
        }
    }

    pub fn input(value: Value) -> Self {
        Self::new(NodeKind::Input).value(value)
    }

    pub fn map(cmd: &str) -> Self {
        Self::new(NodeKind::Map).cmd(cmd)
    }

    pub fn cmd(mut self, cmd: &str) -> Self {
        self.node.cmd = Some(cmd.to_string());
        self
    }

    pub fn value(mut self, value: Value) -> Self {
        self.node.value = Some(value);
        self
    }

    pub fn items(mut self, items: Vec<Value>) -> Self {
        self.node.items = Some(items);
        self
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.node.after.push(dep.to_string());
        self
    }

    pub fn branch(mut self, cmd: &str, target: &str) -> Self {
        self.node.branches.push(BranchConfig {
            cmd: cmd.to_string(),
            target: target.to_string(),
        });
        self
    }

    pub fn build(self) -> NodeConfig {
        self.node
    }
}

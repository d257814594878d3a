// src/workflow.rs

//! Turning a validated workflow file into a runnable [`Dag`].

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::config::{NodeConfig, NodeKind, WorkflowFile, load_and_validate};
use crate::dag::{Dag, NodeOptions, NodeRef};
use crate::engine::DefaultWorkflowRunner;
use crate::errors::{AwelError, Result};
use crate::exec::{BlockingExecutor, ShellCommand};
use crate::operator::{
    BranchOperator, InputOperator, InputSource, JoinOperator, MapOperator, Operator,
    ReduceStreamOperator, StreamifyOperator, TransformStreamOperator, TriggerOperator,
    UnstreamifyOperator,
};
use crate::task::MapAllFunc;

/// A DAG built from a workflow file, plus the file's default leaf.
#[derive(Debug)]
pub struct Workflow {
    dag: Dag,
    default_leaf: Option<String>,
}

impl Workflow {
    /// Load, validate and build a workflow file. The DAG is named after the
    /// file stem.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let cfg = load_and_validate(path)?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "workflow".to_string());
        Self::from_config(name, &cfg)
    }

    pub fn from_config(name: impl Into<String>, cfg: &WorkflowFile) -> Result<Self> {
        let runner = DefaultWorkflowRunner::new(BlockingExecutor::new(cfg.config.blocking_threads));
        let mut dag = Dag::new(name).with_runner(Arc::new(runner));

        let mut refs: HashMap<&str, NodeRef> = HashMap::new();
        for (name, node) in cfg.node.iter() {
            let handle = dag.add_with(
                NodeOptions::named(name.as_str()).with_id(name.as_str()),
                build_operator(name, node)?,
            )?;
            refs.insert(name.as_str(), handle);
        }

        for (name, node) in cfg.node.iter() {
            let child = lookup(&refs, name)?;
            for dep in node.after.iter() {
                dag.connect(lookup(&refs, dep)?, child)?;
            }
        }

        debug!(dag = %dag.name(), nodes = dag.len(), "workflow built");
        Ok(Self {
            dag,
            default_leaf: cfg.config.leaf.clone(),
        })
    }

    pub fn dag(&self) -> &Dag {
        &self.dag
    }

    /// Resolve the node a run should end at: `name` if given, else the file's
    /// `[config].leaf`, else the single leaf of the graph.
    pub fn leaf(&self, name: Option<&str>) -> Result<NodeRef> {
        if let Some(name) = name.or(self.default_leaf.as_deref()) {
            return self
                .dag
                .node_by_name(name)
                .map(|n| n.node_ref())
                .ok_or_else(|| AwelError::NodeNotFound(name.to_string()));
        }
        match self.dag.leaf_nodes() {
            [only] => self
                .dag
                .node(only)
                .map(|n| n.node_ref())
                .ok_or_else(|| AwelError::NodeNotFound(only.clone())),
            leaves => Err(AwelError::config(format!(
                "workflow has {} leaves ({}); choose one with --leaf or [config].leaf",
                leaves.len(),
                leaves.join(", ")
            ))),
        }
    }
}

fn lookup<'r>(refs: &'r HashMap<&str, NodeRef>, name: &str) -> Result<&'r NodeRef> {
    refs.get(name)
        .ok_or_else(|| AwelError::NodeNotFound(name.to_string()))
}

fn required_cmd(name: &str, node: &NodeConfig) -> Result<ShellCommand> {
    node.cmd.as_deref().map(ShellCommand::new).ok_or_else(|| {
        AwelError::config(format!(
            "node '{name}' ({}) requires `cmd`",
            node.kind.as_str()
        ))
    })
}

fn build_operator(name: &str, node: &NodeConfig) -> Result<Arc<dyn Operator>> {
    let op: Arc<dyn Operator> = match node.kind {
        NodeKind::Input => {
            let source = match (&node.value, &node.items) {
                (Some(value), _) => InputSource::Value(value.clone()),
                (None, Some(items)) => InputSource::Iterable(items.clone()),
                (None, None) => InputSource::CallData,
            };
            Arc::new(InputOperator::new(source))
        }
        NodeKind::Trigger => Arc::new(TriggerOperator),
        NodeKind::Map => Arc::new(MapOperator::from_func(required_cmd(name, node)?.map_func())),
        NodeKind::Join => match &node.cmd {
            Some(cmd) => Arc::new(JoinOperator::from_func(MapAllFunc::Values(
                ShellCommand::new(cmd.as_str()).join_func(),
            ))),
            None => Arc::new(JoinOperator::first_non_null()),
        },
        NodeKind::Reduce => Arc::new(ReduceStreamOperator::from_func(
            required_cmd(name, node)?.reduce_func(),
        )),
        NodeKind::Branch => {
            let mut op = BranchOperator::new();
            for branch in node.branches.iter() {
                op = op.branch_with(
                    ShellCommand::new(branch.cmd.as_str()).predicate_func(),
                    branch.target.as_str(),
                );
            }
            Arc::new(op)
        }
        NodeKind::Streamify => Arc::new(StreamifyOperator::from_func(
            required_cmd(name, node)?.streamify_func(),
        )),
        NodeKind::Unstreamify => Arc::new(UnstreamifyOperator::from_func(
            required_cmd(name, node)?.unstreamify_func(),
        )),
        NodeKind::TransformStream => Arc::new(TransformStreamOperator::from_func(
            required_cmd(name, node)?.transform_func(),
        )),
    };
    Ok(op)
}

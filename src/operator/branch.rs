// src/operator/branch.rs

use std::sync::Arc;

use futures::future::{BoxFuture, try_join_all};
use serde_json::Value;
use tracing::debug;

use crate::dag::{DagContext, NodeRef};
use crate::errors::{AwelError, Result};
use crate::operator::Operator;
use crate::task::{Callable, PredicateFunc, TaskContext, TaskOutput, is_truthy};
use crate::types::{NodeId, OperatorKind, SKIP_NODE_IDS_KEY, SKIP_NODE_NAMES_KEY};

/// Where a branch leads: an immediate downstream node, addressed by name or
/// by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchTarget {
    Name(String),
    Node(NodeId),
}

impl From<&str> for BranchTarget {
    fn from(name: &str) -> Self {
        BranchTarget::Name(name.to_string())
    }
}

impl From<String> for BranchTarget {
    fn from(name: String) -> Self {
        BranchTarget::Name(name)
    }
}

impl From<&NodeRef> for BranchTarget {
    fn from(node: &NodeRef) -> Self {
        BranchTarget::Node(node.node_id().to_string())
    }
}

#[derive(Debug, Clone)]
pub struct Branch {
    pub predicate: PredicateFunc,
    pub target: BranchTarget,
}

impl Branch {
    pub fn new<F>(predicate: F, target: impl Into<BranchTarget>) -> Self
    where
        F: Fn(Value) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        Self {
            predicate: Callable::blocking(predicate),
            target: target.into(),
        }
    }
}

/// Supplies the branch table at run time when none was configured.
pub trait BranchProvider: Send + Sync {
    fn branches(&self) -> BoxFuture<'_, Result<Vec<Branch>>>;
}

/// Routes its single parent's value to the downstream nodes whose predicate
/// holds. Every target whose predicate fails is recorded for skipping; the
/// runner floods the skip down to the next join.
#[derive(Clone, Default)]
pub struct BranchOperator {
    branches: Vec<Branch>,
    provider: Option<Arc<dyn BranchProvider>>,
}

impl std::fmt::Debug for BranchOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BranchOperator")
            .field("branches", &self.branches)
            .field("has_provider", &self.provider.is_some())
            .finish()
    }
}

impl BranchOperator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(provider: Arc<dyn BranchProvider>) -> Self {
        Self {
            branches: Vec::new(),
            provider: Some(provider),
        }
    }

    /// Add a branch guarded by a synchronous predicate.
    pub fn branch<F>(mut self, predicate: F, target: impl Into<BranchTarget>) -> Self
    where
        F: Fn(Value) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        self.branches.push(Branch::new(predicate, target));
        self
    }

    pub fn branch_with(mut self, predicate: PredicateFunc, target: impl Into<BranchTarget>) -> Self {
        self.branches.push(Branch {
            predicate,
            target: target.into(),
        });
        self
    }

    async fn resolve_branches(&self) -> Result<Vec<Branch>> {
        if !self.branches.is_empty() {
            return Ok(self.branches.clone());
        }
        match &self.provider {
            Some(provider) => provider.branches().await,
            None => Err(AwelError::config(
                "BranchOperator has no branches and no branch provider",
            )),
        }
    }
}

/// Store the targets a branch decided against in the task metadata, split by
/// how they are addressed.
pub fn record_skip_targets<'a>(
    task: &mut TaskContext,
    targets: impl IntoIterator<Item = &'a BranchTarget>,
) {
    let mut names = Vec::new();
    let mut ids = Vec::new();
    for target in targets {
        match target {
            BranchTarget::Name(name) => names.push(Value::String(name.clone())),
            BranchTarget::Node(id) => ids.push(Value::String(id.clone())),
        }
    }
    task.update_metadata(SKIP_NODE_NAMES_KEY, Value::Array(names));
    task.update_metadata(SKIP_NODE_IDS_KEY, Value::Array(ids));
}

impl Operator for BranchOperator {
    fn kind(&self) -> OperatorKind {
        OperatorKind::Branch
    }

    fn execute<'a>(
        &'a self,
        task: &'a mut TaskContext,
        ctx: &'a DagContext,
    ) -> BoxFuture<'a, Result<TaskOutput>> {
        Box::pin(async move {
            let branches = self.resolve_branches().await?;

            let input = task.task_input().clone();
            let parent = input.single_parent("BranchOperator")?;
            if parent.task_output().is_stream() {
                return Err(AwelError::config(format!(
                    "BranchOperator '{}' cannot branch on a stream",
                    task.task_id()
                )));
            }

            let verdicts = try_join_all(
                branches
                    .iter()
                    .map(|b| input.predicate_map(&b.predicate, Value::Null, ctx.executor())),
            )
            .await?;

            let mut skipped = Vec::new();
            for (branch, verdict) in branches.iter().zip(&verdicts) {
                let passed = match verdict.parent_outputs().first() {
                    Some(p) => p.task_output().output()?.is_some_and(is_truthy),
                    None => false,
                };
                if !passed {
                    skipped.push(&branch.target);
                }
            }

            debug!(
                task = %task.task_id(),
                branches = branches.len(),
                skipped = skipped.len(),
                "branch evaluated"
            );
            record_skip_targets(task, skipped);
            Ok(parent.task_output().clone())
        })
    }
}

// src/engine/runner.rs

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::{BoxFuture, join_all};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::dag::{Dag, DagContext, DagNode, NodeRef};
use crate::engine::job_manager::JobManager;
use crate::engine::skip::skip_closure;
use crate::errors::{AwelError, Result};
use crate::exec::BlockingExecutor;
use crate::task::{InputContext, TaskContext};
use crate::types::{NodeId, OperatorKind, SKIP_NODE_IDS_KEY, SKIP_NODE_NAMES_KEY, TaskState};

/// Drives one run of a DAG.
///
/// `existing` continues a previous run's context so nodes it already
/// memoized are not executed again.
pub trait WorkflowRunner: Send + Sync {
    fn execute_workflow<'a>(
        &'a self,
        dag: &'a Dag,
        leaf: &'a NodeRef,
        call_data: Option<Value>,
        streaming: bool,
        existing: Option<DagContext>,
    ) -> BoxFuture<'a, Result<DagContext>>;
}

/// Executes a job wave by wave; nodes of one wave run concurrently.
#[derive(Debug, Clone, Default)]
pub struct DefaultWorkflowRunner {
    executor: BlockingExecutor,
}

impl DefaultWorkflowRunner {
    pub fn new(executor: BlockingExecutor) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &BlockingExecutor {
        &self.executor
    }

    async fn run(
        &self,
        dag: &Dag,
        leaf: &NodeRef,
        call_data: Option<Value>,
        streaming: bool,
        existing: Option<DagContext>,
    ) -> Result<DagContext> {
        let job = JobManager::build_from_end_node(dag, leaf, call_data)?;
        let mut ctx = match existing {
            Some(mut ctx) => {
                ctx.set_streaming_call(streaming);
                ctx
            }
            None => DagContext::new(streaming, self.executor.clone()),
        };
        self.run_job(dag, &job, &mut ctx).await?;
        Ok(ctx)
    }

    /// Execute `job` inside `ctx`. On error `ctx` still holds every record
    /// memoized so far, including the failed ones.
    async fn run_job(&self, dag: &Dag, job: &JobManager, ctx: &mut DagContext) -> Result<()> {
        let streaming = ctx.is_streaming_call();
        info!(
            dag = %dag.name(),
            run_id = %ctx.run_id(),
            leaf = %job.leaf(),
            nodes = job.len(),
            streaming,
            "starting DAG run"
        );

        for id in job.nodes() {
            node(dag, id)?.operator().before_dag_run().await?;
        }

        for wave in job.waves() {
            let pending: Vec<&DagNode> = wave
                .iter()
                .filter(|id| ctx.task_context(id).is_none())
                .map(|id| node(dag, id))
                .collect::<Result<_>>()?;
            if pending.is_empty() {
                continue;
            }

            let results = {
                let shared = &*ctx;
                join_all(pending.iter().map(|n| execute_node(job, n, shared))).await
            };

            let mut first_error = None;
            for (node, (task, outcome)) in pending.iter().zip(results) {
                let task = ctx.memoize(task);
                match outcome {
                    Ok(()) => {
                        if node.kind() == OperatorKind::Branch
                            && task.current_state() == TaskState::Success
                        {
                            apply_branch_skips(dag, job, node, &task, ctx);
                        }
                    }
                    Err(err) => {
                        if first_error.is_none() {
                            first_error = Some(err);
                        }
                    }
                }
            }

            if let Some(err) = first_error {
                warn!(
                    dag = %dag.name(),
                    run_id = %ctx.run_id(),
                    failed = ?ctx.failed_nodes(),
                    error = %err,
                    "DAG run aborted"
                );
                return Err(err);
            }
        }

        if !streaming {
            for id in job.nodes() {
                node(dag, id)?.operator().after_dag_end().await?;
            }
        }

        info!(
            dag = %dag.name(),
            run_id = %ctx.run_id(),
            skipped = ctx.skipped_nodes().len(),
            "DAG run finished"
        );
        Ok(())
    }
}

impl WorkflowRunner for DefaultWorkflowRunner {
    fn execute_workflow<'a>(
        &'a self,
        dag: &'a Dag,
        leaf: &'a NodeRef,
        call_data: Option<Value>,
        streaming: bool,
        existing: Option<DagContext>,
    ) -> BoxFuture<'a, Result<DagContext>> {
        Box::pin(self.run(dag, leaf, call_data, streaming, existing))
    }
}

fn node<'d>(dag: &'d Dag, id: &str) -> Result<&'d DagNode> {
    dag.node(id)
        .ok_or_else(|| AwelError::NodeNotFound(id.to_string()))
}

/// Run one node and hand back its record together with the outcome. The
/// record is returned even on failure so the caller can memoize it.
async fn execute_node(
    job: &JobManager,
    node: &DagNode,
    ctx: &DagContext,
) -> (TaskContext, Result<()>) {
    let mut parents = Vec::with_capacity(node.upstream().len());
    for parent in node.upstream() {
        match ctx.task_context(parent) {
            Some(task) => parents.push(Arc::clone(task)),
            None => {
                let task = TaskContext::new(node.id(), InputContext::default());
                return (task, Err(AwelError::NodeNotFound(parent.clone())));
            }
        }
    }

    let mut task = TaskContext::new(node.id(), InputContext::new(parents));
    if let Some(data) = job.call_data_for(node.id()) {
        task.set_call_data(data.clone());
    }
    if let Err(err) = task.set_current_state(TaskState::Running) {
        return (task, Err(err));
    }

    if ctx.is_skipped(node.id()) {
        debug!(task = %node.id(), name = ?node.name(), "skipped by upstream branch");
        let outcome = task.set_current_state(TaskState::Skip);
        return (task, outcome);
    }

    debug!(task = %node.id(), name = ?node.name(), kind = %node.kind(), "running");
    match node.operator().execute(&mut task, ctx).await {
        Ok(output) => {
            task.set_task_output(output);
            let outcome = task.set_current_state(TaskState::Success);
            debug!(task = %node.id(), "succeeded");
            (task, outcome)
        }
        Err(err) => {
            warn!(task = %node.id(), name = ?node.name(), error = %err, "failed");
            let outcome = task.set_current_state(TaskState::Failed).and(Err(err));
            (task, outcome)
        }
    }
}

/// Resolve a branch node's skip metadata against its immediate children and
/// flood the skip downstream.
fn apply_branch_skips(
    dag: &Dag,
    job: &JobManager,
    branch: &DagNode,
    task: &TaskContext,
    ctx: &mut DagContext,
) {
    let mut targets: HashSet<NodeId> = HashSet::new();

    for name in metadata_strings(task, SKIP_NODE_NAMES_KEY) {
        match job.node_id_by_name(name) {
            Some(id) => {
                targets.insert(id.to_string());
            }
            None => debug!(branch = %branch.id(), target = %name, "branch target not part of this job"),
        }
    }
    for id in metadata_strings(task, SKIP_NODE_IDS_KEY) {
        targets.insert(id.to_string());
    }

    let children: Vec<NodeId> = branch
        .downstream()
        .iter()
        .filter(|child| targets.contains(child.as_str()))
        .cloned()
        .collect();
    if children.is_empty() {
        return;
    }

    let skipped = skip_closure(dag, children);
    debug!(branch = %branch.id(), skipped = skipped.len(), "branch skip applied");
    ctx.mark_skipped(skipped);
}

fn metadata_strings<'t>(task: &'t TaskContext, key: &str) -> impl Iterator<Item = &'t str> {
    task.metadata()
        .get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::NodeOptions;
    use crate::operator::{InputOperator, InputSource, MapOperator};
    use serde_json::json;

    #[tokio::test]
    async fn failed_node_stays_recorded_in_the_run_context() {
        let mut dag = Dag::new("failing");
        let src = dag
            .add_with(
                NodeOptions::default().with_id("src"),
                Arc::new(InputOperator::new(InputSource::value(json!(1)))),
            )
            .unwrap();
        let bad = dag
            .add_with(
                NodeOptions::default().with_id("bad"),
                Arc::new(MapOperator::new(|_: Value| -> anyhow::Result<Value> {
                    anyhow::bail!("model exploded")
                })),
            )
            .unwrap();
        let after = dag
            .add_with(NodeOptions::default().with_id("after"), Arc::new(MapOperator::new(Ok)))
            .unwrap();
        dag.chain(&[src, bad, after.clone()]).unwrap();

        let runner = DefaultWorkflowRunner::default();
        let job = JobManager::build_from_end_node(&dag, &after, None).unwrap();
        let mut ctx = DagContext::default();
        let err = runner.run_job(&dag, &job, &mut ctx).await.unwrap_err();

        assert_eq!(err.to_string(), "model exploded");
        assert_eq!(ctx.failed_nodes(), ["bad"]);
        assert_eq!(
            ctx.task_context("src").unwrap().current_state(),
            TaskState::Success
        );
        assert!(ctx.task_context("after").is_none());
    }
}

// src/dag/context.rs

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::trace;
use uuid::Uuid;

use crate::errors::{AwelError, Result};
use crate::exec::BlockingExecutor;
use crate::task::TaskContext;
use crate::types::{NodeId, TaskState};

/// State shared by every node of one DAG run.
///
/// Operators get a shared reference while a wave executes; the runner
/// updates memoized outputs and the skip set between waves.
#[derive(Debug)]
pub struct DagContext {
    run_id: String,
    streaming_call: bool,
    node_to_outputs: HashMap<NodeId, Arc<TaskContext>>,
    skip_node_ids: HashSet<NodeId>,
    share_data: RwLock<HashMap<String, Value>>,
    executor: BlockingExecutor,
}

impl Default for DagContext {
    fn default() -> Self {
        Self::new(false, BlockingExecutor::default())
    }
}

impl DagContext {
    pub fn new(streaming_call: bool, executor: BlockingExecutor) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            streaming_call,
            node_to_outputs: HashMap::new(),
            skip_node_ids: HashSet::new(),
            share_data: RwLock::new(HashMap::new()),
            executor,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn is_streaming_call(&self) -> bool {
        self.streaming_call
    }

    pub(crate) fn set_streaming_call(&mut self, streaming: bool) {
        self.streaming_call = streaming;
    }

    /// Bridge for running blocking user functions.
    pub fn executor(&self) -> &BlockingExecutor {
        &self.executor
    }

    /// The memoized record of a node already executed in this run.
    pub fn task_context(&self, node_id: &str) -> Option<&Arc<TaskContext>> {
        self.node_to_outputs.get(node_id)
    }

    pub fn node_outputs(&self) -> &HashMap<NodeId, Arc<TaskContext>> {
        &self.node_to_outputs
    }

    /// Ids of the memoized nodes whose execution failed, sorted.
    pub fn failed_nodes(&self) -> Vec<NodeId> {
        let mut failed: Vec<NodeId> = self
            .node_to_outputs
            .iter()
            .filter(|(_, task)| task.current_state() == TaskState::Failed)
            .map(|(id, _)| id.clone())
            .collect();
        failed.sort();
        failed
    }

    pub(crate) fn memoize(&mut self, task: TaskContext) -> Arc<TaskContext> {
        let task = Arc::new(task);
        self.node_to_outputs
            .insert(task.task_id().to_string(), Arc::clone(&task));
        task
    }

    pub fn is_skipped(&self, node_id: &str) -> bool {
        self.skip_node_ids.contains(node_id)
    }

    pub fn skipped_nodes(&self) -> &HashSet<NodeId> {
        &self.skip_node_ids
    }

    pub(crate) fn mark_skipped(&mut self, ids: impl IntoIterator<Item = NodeId>) {
        self.skip_node_ids.extend(ids);
    }

    /// Store a value for other nodes of this run. Writing an existing key is
    /// refused unless `overwrite` is set.
    pub async fn save_to_share_data(
        &self,
        key: impl Into<String>,
        value: Value,
        overwrite: bool,
    ) -> Result<()> {
        let key = key.into();
        let mut data = self.share_data.write().await;
        if !overwrite && data.contains_key(&key) {
            return Err(AwelError::ShareDataKeyExists(key));
        }
        trace!(run_id = %self.run_id, key = %key, "share data written");
        data.insert(key, value);
        Ok(())
    }

    pub async fn get_from_share_data(&self, key: &str) -> Option<Value> {
        self.share_data.read().await.get(key).cloned()
    }
}

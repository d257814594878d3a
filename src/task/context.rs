// src/task/context.rs

//! Per-node, per-run execution record.

use std::collections::HashMap;

use serde_json::{Value, json};
use tracing::trace;

use crate::errors::{AwelError, Result};
use crate::task::input::InputContext;
use crate::task::output::TaskOutput;
use crate::types::{CALL_DATA_KEY, NodeId, TaskState};

/// Execution record for one node in one run.
///
/// Created fresh by the runner for every node it executes; never shared
/// between runs.
#[derive(Debug, Clone)]
pub struct TaskContext {
    task_id: NodeId,
    task_input: InputContext,
    task_output: TaskOutput,
    state: TaskState,
    metadata: HashMap<String, Value>,
}

impl TaskContext {
    pub fn new(task_id: impl Into<NodeId>, task_input: InputContext) -> Self {
        Self {
            task_id: task_id.into(),
            task_input,
            task_output: TaskOutput::empty(),
            state: TaskState::Init,
            metadata: HashMap::new(),
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn task_input(&self) -> &InputContext {
        &self.task_input
    }

    pub fn task_output(&self) -> &TaskOutput {
        &self.task_output
    }

    pub fn set_task_output(&mut self, output: TaskOutput) {
        self.task_output = output;
    }

    pub fn current_state(&self) -> TaskState {
        self.state
    }

    /// Move to `next`, rejecting anything but `Init -> Running -> terminal`.
    pub fn set_current_state(&mut self, next: TaskState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(AwelError::InvalidStateTransition {
                task: self.task_id.clone(),
                from: self.state,
                to: next,
            });
        }
        trace!(task = %self.task_id, from = %self.state, to = %next, "task state transition");
        self.state = next;
        Ok(())
    }

    pub fn metadata(&self) -> &HashMap<String, Value> {
        &self.metadata
    }

    pub fn update_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
    }

    /// Attach the run's call data payload, wrapped as `{"data": payload}`.
    pub fn set_call_data(&mut self, payload: Value) {
        self.metadata
            .insert(CALL_DATA_KEY.to_string(), json!({ "data": payload }));
    }

    /// The wrapped call data (`{"data": payload}`), if any was attached.
    pub fn call_data(&self) -> Option<&Value> {
        self.metadata.get(CALL_DATA_KEY)
    }

    /// The unwrapped call data payload, if any was attached.
    pub fn call_data_payload(&self) -> Option<&Value> {
        self.call_data().and_then(|wrapped| wrapped.get("data"))
    }

    /// Copy with a different output, keeping identity, state and metadata.
    pub(crate) fn with_output(&self, output: TaskOutput) -> Self {
        let mut ctx = self.clone();
        ctx.task_output = output;
        ctx
    }
}

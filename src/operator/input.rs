// src/operator/input.rs

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::dag::DagContext;
use crate::errors::{AwelError, Result};
use crate::operator::Operator;
use crate::task::{TaskContext, TaskOutput, ValueStream};
use crate::types::OperatorKind;

pub type StreamFactory = Arc<dyn Fn() -> ValueStream + Send + Sync>;

/// What an input node emits.
#[derive(Clone)]
pub enum InputSource {
    /// A fixed scalar.
    Value(Value),
    /// A fixed sequence, emitted as a fresh stream on every run.
    Iterable(Vec<Value>),
    /// The payload the caller passed to this run.
    CallData,
    /// A stream built anew for every run.
    Stream(StreamFactory),
}

impl std::fmt::Debug for InputSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputSource::Value(v) => f.debug_tuple("Value").field(v).finish(),
            InputSource::Iterable(items) => f.debug_tuple("Iterable").field(items).finish(),
            InputSource::CallData => f.write_str("CallData"),
            InputSource::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl InputSource {
    pub fn value(value: impl Into<Value>) -> Self {
        InputSource::Value(value.into())
    }

    pub fn iterable(items: impl IntoIterator<Item = Value>) -> Self {
        InputSource::Iterable(items.into_iter().collect())
    }

    pub fn stream<F>(factory: F) -> Self
    where
        F: Fn() -> ValueStream + Send + Sync + 'static,
    {
        InputSource::Stream(Arc::new(factory))
    }

    pub fn read(&self, task: &TaskContext) -> Result<TaskOutput> {
        match self {
            InputSource::Value(v) => Ok(TaskOutput::from_value(v.clone())),
            InputSource::Iterable(items) => Ok(TaskOutput::from_values(items.clone())),
            InputSource::Stream(factory) => Ok(TaskOutput::from_stream(factory())),
            InputSource::CallData => task.call_data_payload().cloned().map(TaskOutput::from_value).ok_or_else(|| {
                AwelError::config(format!(
                    "input node '{}' reads call data but the run supplied none",
                    task.task_id()
                ))
            }),
        }
    }
}

/// A root node that emits from an [`InputSource`].
#[derive(Debug, Clone)]
pub struct InputOperator {
    source: InputSource,
}

impl InputOperator {
    pub fn new(source: InputSource) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &InputSource {
        &self.source
    }
}

impl Operator for InputOperator {
    fn kind(&self) -> OperatorKind {
        OperatorKind::Input
    }

    fn execute<'a>(
        &'a self,
        task: &'a mut TaskContext,
        _ctx: &'a DagContext,
    ) -> BoxFuture<'a, Result<TaskOutput>> {
        Box::pin(async move { self.source.read(task) })
    }
}

/// Entry point for externally triggered runs: emits the call data payload,
/// or nothing when the run carried none.
#[derive(Debug, Clone, Copy, Default)]
pub struct TriggerOperator;

impl Operator for TriggerOperator {
    fn kind(&self) -> OperatorKind {
        OperatorKind::Trigger
    }

    fn execute<'a>(
        &'a self,
        task: &'a mut TaskContext,
        _ctx: &'a DagContext,
    ) -> BoxFuture<'a, Result<TaskOutput>> {
        Box::pin(async move {
            Ok(task
                .call_data_payload()
                .cloned()
                .map(TaskOutput::from_value)
                .unwrap_or_default())
        })
    }
}

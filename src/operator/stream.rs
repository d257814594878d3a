// src/operator/stream.rs

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::dag::DagContext;
use crate::errors::{AwelError, Result};
use crate::operator::Operator;
use crate::task::{
    StreamifyFunc, TaskContext, TaskOutput, TransformStreamFunc, UnstreamifyFunc, ValueStream,
    unstreamify_fn,
};
use crate::types::OperatorKind;

fn single_stream_parent<'t>(
    task: &'t TaskContext,
    operator: &str,
) -> Result<&'t TaskOutput> {
    let parent = task.task_input().single_parent(operator)?;
    if !parent.task_output().is_stream() {
        return Err(AwelError::config(format!(
            "{operator} '{}' requires a stream parent",
            task.task_id()
        )));
    }
    Ok(parent.task_output())
}

/// Turns a scalar into a stream.
#[derive(Clone)]
pub struct StreamifyOperator {
    func: StreamifyFunc,
}

impl std::fmt::Debug for StreamifyOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StreamifyOperator")
    }
}

impl StreamifyOperator {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Value) -> ValueStream + Send + Sync + 'static,
    {
        Self { func: Arc::new(f) }
    }

    pub fn from_func(func: StreamifyFunc) -> Self {
        Self { func }
    }
}

impl Operator for StreamifyOperator {
    fn kind(&self) -> OperatorKind {
        OperatorKind::Streamify
    }

    fn execute<'a>(
        &'a self,
        task: &'a mut TaskContext,
        _ctx: &'a DagContext,
    ) -> BoxFuture<'a, Result<TaskOutput>> {
        Box::pin(async move {
            if let Some(payload) = task.call_data_payload() {
                return Ok(TaskOutput::from_stream((self.func)(payload.clone())));
            }
            let parent = task.task_input().single_parent("StreamifyOperator")?;
            if parent.task_output().is_stream() {
                return Err(AwelError::config(format!(
                    "StreamifyOperator '{}' requires a non-stream parent",
                    task.task_id()
                )));
            }
            parent.task_output().streamify(&self.func)
        })
    }
}

/// Consumes a stream into a single value.
#[derive(Clone)]
pub struct UnstreamifyOperator {
    func: UnstreamifyFunc,
}

impl std::fmt::Debug for UnstreamifyOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("UnstreamifyOperator")
    }
}

impl UnstreamifyOperator {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(ValueStream) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self {
            func: unstreamify_fn(f),
        }
    }

    /// Collect every element into a JSON array.
    pub fn collect() -> Self {
        Self::new(|stream| async move {
            crate::task::collect_stream(stream)
                .await
                .map_err(anyhow::Error::from)
        })
    }

    pub fn from_func(func: UnstreamifyFunc) -> Self {
        Self { func }
    }
}

impl Operator for UnstreamifyOperator {
    fn kind(&self) -> OperatorKind {
        OperatorKind::Unstreamify
    }

    fn execute<'a>(
        &'a self,
        task: &'a mut TaskContext,
        _ctx: &'a DagContext,
    ) -> BoxFuture<'a, Result<TaskOutput>> {
        Box::pin(async move {
            single_stream_parent(task, "UnstreamifyOperator")?
                .unstreamify(&self.func)
                .await
        })
    }
}

/// Stream in, stream out.
#[derive(Clone)]
pub struct TransformStreamOperator {
    func: TransformStreamFunc,
}

impl std::fmt::Debug for TransformStreamOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TransformStreamOperator")
    }
}

impl TransformStreamOperator {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(ValueStream) -> ValueStream + Send + Sync + 'static,
    {
        Self { func: Arc::new(f) }
    }

    pub fn from_func(func: TransformStreamFunc) -> Self {
        Self { func }
    }
}

impl Operator for TransformStreamOperator {
    fn kind(&self) -> OperatorKind {
        OperatorKind::TransformStream
    }

    fn execute<'a>(
        &'a self,
        task: &'a mut TaskContext,
        _ctx: &'a DagContext,
    ) -> BoxFuture<'a, Result<TaskOutput>> {
        Box::pin(async move {
            single_stream_parent(task, "TransformStreamOperator")?.transform_stream(&self.func)
        })
    }
}

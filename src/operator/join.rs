// src/operator/join.rs

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::StreamExt;
use serde_json::Value;

use crate::dag::DagContext;
use crate::errors::{AwelError, Result};
use crate::operator::Operator;
use crate::task::{Callable, MapAllFunc, TaskContext, TaskOutput, ValueStream};
use crate::types::OperatorKind;

/// Merges all parent outputs with one n-ary function.
///
/// Skipped or empty parents appear as `null` to a value join and are left
/// out of a stream join. A join node is never skipped, so it acts as the
/// merge point after a branch.
#[derive(Debug, Clone)]
pub struct JoinOperator {
    func: MapAllFunc,
}

impl JoinOperator {
    /// Join parent values with a synchronous closure.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Vec<Value>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self {
            func: MapAllFunc::Values(Callable::blocking(f)),
        }
    }

    /// Join parent streams into one stream.
    pub fn streams<F>(f: F) -> Self
    where
        F: Fn(Vec<ValueStream>) -> ValueStream + Send + Sync + 'static,
    {
        Self {
            func: MapAllFunc::Streams(Arc::new(f)),
        }
    }

    /// Keep the first non-null parent value (in parent order).
    pub fn first_non_null() -> Self {
        Self::new(|values| Ok(values.into_iter().find(|v| !v.is_null()).unwrap_or(Value::Null)))
    }

    /// Concatenate parent streams in parent order.
    pub fn chain_streams() -> Self {
        Self::streams(|streams| futures::stream::iter(streams).flatten().boxed())
    }

    pub fn from_func(func: MapAllFunc) -> Self {
        Self { func }
    }
}

impl Operator for JoinOperator {
    fn kind(&self) -> OperatorKind {
        OperatorKind::Join
    }

    fn execute<'a>(
        &'a self,
        task: &'a mut TaskContext,
        ctx: &'a DagContext,
    ) -> BoxFuture<'a, Result<TaskOutput>> {
        Box::pin(async move {
            let input = task.task_input();
            if input.is_empty() {
                return Err(AwelError::config(format!(
                    "JoinOperator '{}' requires at least one parent",
                    task.task_id()
                )));
            }
            let merged = input.map_all(&self.func, ctx.executor()).await?;
            Ok(merged.parent_outputs()[0].task_output().clone())
        })
    }
}

// src/operator/reduce.rs

use std::future::Future;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::dag::DagContext;
use crate::errors::{AwelError, Result};
use crate::operator::Operator;
use crate::task::{Callable, ReduceFunc, TaskContext, TaskOutput};
use crate::types::OperatorKind;

/// Folds its single stream parent into one value, left to right.
#[derive(Debug, Clone)]
pub struct ReduceStreamOperator {
    func: ReduceFunc,
}

impl ReduceStreamOperator {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Value, Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self {
            func: Callable::blocking(move |(acc, item)| f(acc, item)),
        }
    }

    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(Value, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self {
            func: Callable::from_async(move |(acc, item)| f(acc, item)),
        }
    }

    pub fn from_func(func: ReduceFunc) -> Self {
        Self { func }
    }
}

impl Operator for ReduceStreamOperator {
    fn kind(&self) -> OperatorKind {
        OperatorKind::Reduce
    }

    fn execute<'a>(
        &'a self,
        task: &'a mut TaskContext,
        ctx: &'a DagContext,
    ) -> BoxFuture<'a, Result<TaskOutput>> {
        Box::pin(async move {
            let parent = task.task_input().single_parent("ReduceStreamOperator")?;
            if !parent.task_output().is_stream() {
                return Err(AwelError::config(format!(
                    "ReduceStreamOperator '{}' requires a stream parent",
                    task.task_id()
                )));
            }
            parent.task_output().reduce(&self.func, ctx.executor()).await
        })
    }
}

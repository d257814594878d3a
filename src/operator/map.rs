// src/operator/map.rs

use std::future::Future;

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::debug;

use crate::dag::DagContext;
use crate::errors::{AwelError, Result};
use crate::operator::Operator;
use crate::task::{Callable, MapFunc, TaskContext, TaskOutput};
use crate::types::OperatorKind;

/// Applies a function to its single input, element-wise when the input is a
/// stream.
///
/// When the run attached call data to this node (it is a root), the call
/// data payload is the input and any parent link is ignored.
#[derive(Debug, Clone)]
pub struct MapOperator {
    func: MapFunc,
}

impl MapOperator {
    /// Map with a synchronous closure, run on the blocking bridge.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self {
            func: Callable::blocking(f),
        }
    }

    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self {
            func: Callable::from_async(f),
        }
    }

    pub fn from_func(func: MapFunc) -> Self {
        Self { func }
    }
}

impl Operator for MapOperator {
    fn kind(&self) -> OperatorKind {
        OperatorKind::Map
    }

    fn execute<'a>(
        &'a self,
        task: &'a mut TaskContext,
        ctx: &'a DagContext,
    ) -> BoxFuture<'a, Result<TaskOutput>> {
        Box::pin(async move {
            if let Some(payload) = task.call_data_payload() {
                debug!(task = %task.task_id(), "map input taken from call data");
                return TaskOutput::from_value(payload.clone())
                    .map(&self.func, ctx.executor())
                    .await;
            }

            let input = task.task_input();
            if !input.check_single_parent() {
                return Err(AwelError::config(format!(
                    "MapOperator '{}' requires exactly one parent or call data, found {} parents",
                    task.task_id(),
                    input.len()
                )));
            }
            input.parent_outputs()[0]
                .task_output()
                .map(&self.func, ctx.executor())
                .await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::InputContext;
    use serde_json::json;
    use std::sync::Arc;

    fn double() -> MapOperator {
        MapOperator::new(|v| Ok(json!(v.as_i64().unwrap_or(0) * 2)))
    }

    #[tokio::test]
    async fn root_map_without_call_data_is_config_error() {
        let ctx = DagContext::default();
        let mut task = TaskContext::new("m", InputContext::default());
        let err = double().execute(&mut task, &ctx).await.unwrap_err();
        assert!(matches!(err, AwelError::ConfigError(msg) if msg.contains("found 0 parents")));
    }

    #[tokio::test]
    async fn call_data_takes_precedence_over_parent() {
        let ctx = DagContext::default();
        let mut parent = TaskContext::new("p", InputContext::default());
        parent.set_task_output(TaskOutput::from_value(json!(100)));

        let mut task = TaskContext::new("m", InputContext::new(vec![Arc::new(parent)]));
        task.set_call_data(json!(4));

        let out = double().execute(&mut task, &ctx).await.unwrap();
        assert_eq!(out.output().unwrap(), Some(&json!(8)));
    }
}

// src/task/input.rs

//! Aggregated view of a node's parent outputs for one run, plus the
//! stream-aware combinators operators are built from.

use std::sync::Arc;

use futures::future::try_join_all;
use serde_json::Value;

use crate::errors::{AwelError, Result};
use crate::exec::BlockingExecutor;
use crate::task::context::TaskContext;
use crate::task::func::{MapAllFunc, MapFunc, PredicateFunc, ReduceFunc};
use crate::task::output::TaskOutput;

/// Ordered parent task contexts of one node.
#[derive(Debug, Clone, Default)]
pub struct InputContext {
    parents: Vec<Arc<TaskContext>>,
}

impl InputContext {
    pub fn new(parents: Vec<Arc<TaskContext>>) -> Self {
        Self { parents }
    }

    pub fn parent_outputs(&self) -> &[Arc<TaskContext>] {
        &self.parents
    }

    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    /// Exactly one upstream parent.
    pub fn check_single_parent(&self) -> bool {
        self.parents.len() == 1
    }

    /// At least one parent, and every parent output is a stream.
    pub fn check_stream(&self) -> bool {
        !self.parents.is_empty() && self.parents.iter().all(|p| p.task_output().is_stream())
    }

    /// The single parent, or a configuration error naming `operator`.
    pub fn single_parent(&self, operator: &str) -> Result<&Arc<TaskContext>> {
        match self.parents.as_slice() {
            [parent] => Ok(parent),
            other => Err(AwelError::config(format!(
                "{operator} requires exactly one parent, found {}",
                other.len()
            ))),
        }
    }

    /// Apply `func` to every parent independently.
    pub async fn map(&self, func: &MapFunc, executor: &BlockingExecutor) -> Result<InputContext> {
        let mapped = try_join_all(self.parents.iter().map(|parent| async move {
            let out = parent.task_output().map(func, executor).await?;
            Ok::<_, AwelError>(Arc::new(parent.with_output(out)))
        }))
        .await?;
        Ok(InputContext::new(mapped))
    }

    /// Combine every parent into a single synthetic parent.
    ///
    /// If any non-empty parent is a stream, all non-empty parents must be
    /// streams. When every parent is empty the result is one empty output.
    pub async fn map_all(
        &self,
        func: &MapAllFunc,
        executor: &BlockingExecutor,
    ) -> Result<InputContext> {
        let Some(first) = self.parents.first() else {
            return Err(AwelError::config("map_all requires at least one parent"));
        };

        let non_empty: Vec<&Arc<TaskContext>> = self
            .parents
            .iter()
            .filter(|p| !p.task_output().is_empty())
            .collect();

        let Some(anchor) = non_empty.first().copied() else {
            return Ok(InputContext::new(vec![Arc::new(
                first.with_output(TaskOutput::empty()),
            )]));
        };

        let any_stream = non_empty.iter().any(|p| p.task_output().is_stream());
        if any_stream && !non_empty.iter().all(|p| p.task_output().is_stream()) {
            return Err(AwelError::config(
                "map_all requires all non-empty parents to be streams when any of them is",
            ));
        }

        let output = match (func, any_stream) {
            (MapAllFunc::Values(join), false) => {
                let mut values = Vec::with_capacity(self.parents.len());
                for parent in &self.parents {
                    values.push(parent.task_output().output()?.cloned().unwrap_or(Value::Null));
                }
                TaskOutput::from_value(join.call(values, executor).await?)
            }
            (MapAllFunc::Streams(join), true) => {
                let streams = non_empty
                    .iter()
                    .map(|p| p.task_output().take_stream())
                    .collect::<Result<Vec<_>>>()?;
                TaskOutput::from_stream(join(streams))
            }
            (MapAllFunc::Values(_), true) => {
                return Err(AwelError::config(
                    "value join function received stream parents",
                ));
            }
            (MapAllFunc::Streams(_), false) => {
                return Err(AwelError::config(
                    "stream join function received non-stream parents",
                ));
            }
        };

        Ok(InputContext::new(vec![Arc::new(anchor.with_output(output))]))
    }

    /// Fold every parent stream independently. Every parent must be a stream.
    pub async fn reduce(
        &self,
        func: &ReduceFunc,
        executor: &BlockingExecutor,
    ) -> Result<InputContext> {
        if !self.check_stream() {
            return Err(AwelError::config("reduce requires every parent to be a stream"));
        }
        let reduced = try_join_all(self.parents.iter().map(|parent| async move {
            let out = parent.task_output().reduce(func, executor).await?;
            Ok::<_, AwelError>(Arc::new(parent.with_output(out)))
        }))
        .await?;
        Ok(InputContext::new(reduced))
    }

    /// Keep only the parents whose output passes `predicate`.
    pub async fn filter(
        &self,
        predicate: &PredicateFunc,
        executor: &BlockingExecutor,
    ) -> Result<InputContext> {
        let verdicts = try_join_all(
            self.parents
                .iter()
                .map(|p| p.task_output().check_condition(predicate, executor)),
        )
        .await?;
        let kept = self
            .parents
            .iter()
            .zip(verdicts)
            .filter_map(|(p, keep)| keep.then(|| Arc::clone(p)))
            .collect();
        Ok(InputContext::new(kept))
    }

    /// Replace each parent's output with `true` when it passes `predicate`,
    /// or with `failed_value` when it does not.
    pub async fn predicate_map(
        &self,
        predicate: &PredicateFunc,
        failed_value: Value,
        executor: &BlockingExecutor,
    ) -> Result<InputContext> {
        let failed = &failed_value;
        let mapped = try_join_all(self.parents.iter().map(|parent| async move {
            let passed = parent.task_output().check_condition(predicate, executor).await?;
            let value = if passed { Value::Bool(true) } else { failed.clone() };
            Ok::<_, AwelError>(Arc::new(parent.with_output(TaskOutput::from_value(value))))
        }))
        .await?;
        Ok(InputContext::new(mapped))
    }
}

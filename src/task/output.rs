// src/task/output.rs

//! The result of one operator execution: empty, a single value, or a lazy
//! stream of values.

use std::fmt;
use std::sync::{Arc, Mutex};

use futures::future;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use serde_json::Value;

use crate::errors::{AwelError, Result};
use crate::exec::BlockingExecutor;
use crate::task::func::{
    MapFunc, PredicateFunc, ReduceFunc, StreamifyFunc, TransformStreamFunc, UnstreamifyFunc,
};

/// A lazy, finite-or-unbounded sequence of values.
///
/// Errors travel in-band; the end of the stream is the end of the sequence.
/// Dropping the stream cancels whatever feeds it.
pub type ValueStream = BoxStream<'static, Result<Value>>;

/// Take-once slot shared between clones of the same output.
#[derive(Clone)]
struct StreamSlot(Arc<Mutex<Option<ValueStream>>>);

impl StreamSlot {
    fn new(stream: ValueStream) -> Self {
        Self(Arc::new(Mutex::new(Some(stream))))
    }

    fn take(&self) -> Result<ValueStream> {
        let mut guard = self
            .0
            .lock()
            .map_err(|_| AwelError::config("stream slot lock poisoned"))?;
        guard.take().ok_or(AwelError::StreamConsumed)
    }
}

#[derive(Clone, Default)]
enum OutputData {
    #[default]
    Empty,
    Value(Value),
    Stream(StreamSlot),
}

/// Scalar-or-stream output of a task.
///
/// Clones share the underlying stream: whichever clone takes it first wins,
/// later attempts get [`AwelError::StreamConsumed`].
#[derive(Clone, Default)]
pub struct TaskOutput {
    data: OutputData,
}

impl fmt::Debug for TaskOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.data {
            OutputData::Empty => f.write_str("TaskOutput::Empty"),
            OutputData::Value(v) => f.debug_tuple("TaskOutput::Value").field(v).finish(),
            OutputData::Stream(_) => f.write_str("TaskOutput::Stream"),
        }
    }
}

impl TaskOutput {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_value(value: Value) -> Self {
        Self {
            data: OutputData::Value(value),
        }
    }

    pub fn from_stream(stream: ValueStream) -> Self {
        Self {
            data: OutputData::Stream(StreamSlot::new(stream)),
        }
    }

    /// Stream over a fixed list of values.
    pub fn from_values(values: Vec<Value>) -> Self {
        Self::from_stream(futures::stream::iter(values.into_iter().map(Ok)).boxed())
    }

    pub fn is_stream(&self) -> bool {
        matches!(self.data, OutputData::Stream(_))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.data, OutputData::Empty)
    }

    /// The held scalar, or `None` when the output is empty.
    ///
    /// Fails with a configuration error when the output is a stream: scalar
    /// and stream accessors are mutually exclusive.
    pub fn output(&self) -> Result<Option<&Value>> {
        match &self.data {
            OutputData::Empty => Ok(None),
            OutputData::Value(v) => Ok(Some(v)),
            OutputData::Stream(_) => Err(AwelError::config(
                "task output is a stream; use the stream accessor",
            )),
        }
    }

    /// Take the held stream. Only the first caller succeeds.
    pub fn take_stream(&self) -> Result<ValueStream> {
        match &self.data {
            OutputData::Stream(slot) => slot.take(),
            _ => Err(AwelError::NotAStream),
        }
    }

    /// Apply `func` to the value, or to every element of the stream.
    ///
    /// Stream-ness is preserved; an empty output stays empty.
    pub async fn map(&self, func: &MapFunc, executor: &BlockingExecutor) -> Result<TaskOutput> {
        match &self.data {
            OutputData::Empty => Ok(TaskOutput::empty()),
            OutputData::Value(v) => Ok(TaskOutput::from_value(
                func.call(v.clone(), executor).await?,
            )),
            OutputData::Stream(slot) => {
                let stream = slot.take()?;
                let func = func.clone();
                let executor = executor.clone();
                let mapped = stream
                    .and_then(move |item| {
                        let func = func.clone();
                        let executor = executor.clone();
                        async move { func.call(item, &executor).await }
                    })
                    .boxed();
                Ok(TaskOutput::from_stream(mapped))
            }
        }
    }

    /// Fold a stream into a scalar with a left-associative step function.
    ///
    /// The first element seeds the accumulator; an empty stream yields an
    /// empty output.
    pub async fn reduce(&self, func: &ReduceFunc, executor: &BlockingExecutor) -> Result<TaskOutput> {
        let mut stream = self.take_stream()?;
        let mut acc = match stream.next().await {
            Some(first) => first?,
            None => return Ok(TaskOutput::empty()),
        };
        while let Some(item) = stream.next().await {
            acc = func.call((acc, item?), executor).await?;
        }
        Ok(TaskOutput::from_value(acc))
    }

    /// Turn the held scalar into a stream.
    pub fn streamify(&self, func: &StreamifyFunc) -> Result<TaskOutput> {
        match &self.data {
            OutputData::Value(v) => Ok(TaskOutput::from_stream(func(v.clone()))),
            OutputData::Empty => Err(AwelError::config("cannot streamify an empty output")),
            OutputData::Stream(_) => Err(AwelError::config("output is already a stream")),
        }
    }

    /// Consume the held stream into a scalar.
    pub async fn unstreamify(&self, func: &UnstreamifyFunc) -> Result<TaskOutput> {
        let stream = self.take_stream()?;
        let value = func(stream).await?;
        Ok(TaskOutput::from_value(value))
    }

    /// Stream-to-stream transform.
    pub fn transform_stream(&self, func: &TransformStreamFunc) -> Result<TaskOutput> {
        let stream = self.take_stream()?;
        Ok(TaskOutput::from_stream(func(stream)))
    }

    /// Evaluate a predicate over the held value. Empty outputs never pass.
    pub async fn check_condition(
        &self,
        predicate: &PredicateFunc,
        executor: &BlockingExecutor,
    ) -> Result<bool> {
        match &self.data {
            OutputData::Empty => Ok(false),
            OutputData::Value(v) => predicate.call(v.clone(), executor).await,
            OutputData::Stream(_) => Err(AwelError::config(
                "cannot evaluate a condition over a stream output",
            )),
        }
    }
}

/// Drain a stream into a JSON array, stopping at the first error.
pub async fn collect_stream(stream: ValueStream) -> Result<Value> {
    let items: Vec<Value> = stream.try_collect().await?;
    Ok(Value::Array(items))
}

/// A stream that yields nothing.
pub fn empty_stream() -> ValueStream {
    futures::stream::empty().boxed()
}

/// A stream of a single value.
pub fn once_stream(value: Value) -> ValueStream {
    futures::stream::once(future::ready(Ok(value))).boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::func::{Callable, unstreamify_fn};
    use serde_json::json;
    use std::sync::Arc;

    fn square() -> MapFunc {
        Callable::blocking(|v: Value| Ok(json!(v.as_i64().unwrap_or(0).pow(2))))
    }

    #[tokio::test]
    async fn map_over_scalar_keeps_scalar() {
        let exec = BlockingExecutor::default();
        let out = TaskOutput::from_value(json!(3)).map(&square(), &exec).await.unwrap();
        assert!(!out.is_stream());
        assert_eq!(out.output().unwrap(), Some(&json!(9)));
    }

    #[tokio::test]
    async fn map_over_stream_keeps_stream() {
        let exec = BlockingExecutor::default();
        let out = TaskOutput::from_values(vec![json!(1), json!(2), json!(3)])
            .map(&square(), &exec)
            .await
            .unwrap();
        assert!(out.is_stream());
        let collected = collect_stream(out.take_stream().unwrap()).await.unwrap();
        assert_eq!(collected, json!([1, 4, 9]));
    }

    #[tokio::test]
    async fn map_over_empty_does_not_call_function() {
        let exec = BlockingExecutor::default();
        let func: MapFunc = Callable::blocking(|_| panic!("must not be called"));
        let out = TaskOutput::empty().map(&func, &exec).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn stream_can_only_be_taken_once() {
        let out = TaskOutput::from_values(vec![json!(1)]);
        let shared = out.clone();
        assert!(out.take_stream().is_ok());
        assert!(matches!(shared.take_stream(), Err(AwelError::StreamConsumed)));
    }

    #[tokio::test]
    async fn reduce_folds_left_to_right() {
        let exec = BlockingExecutor::default();
        let concat: ReduceFunc = Callable::blocking(|(acc, x): (Value, Value)| {
            Ok(json!(format!("{}{}", acc.as_str().unwrap(), x.as_str().unwrap())))
        });
        let out = TaskOutput::from_values(vec![json!("a"), json!("b"), json!("c")])
            .reduce(&concat, &exec)
            .await
            .unwrap();
        assert_eq!(out.output().unwrap(), Some(&json!("abc")));
    }

    #[tokio::test]
    async fn reduce_of_empty_stream_is_empty() {
        let exec = BlockingExecutor::default();
        let sum: ReduceFunc = Callable::blocking(|(a, b): (Value, Value)| {
            Ok(json!(a.as_i64().unwrap() + b.as_i64().unwrap()))
        });
        let out = TaskOutput::from_values(vec![]).reduce(&sum, &exec).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn reduce_rejects_scalar() {
        let exec = BlockingExecutor::default();
        let sum: ReduceFunc = Callable::blocking(|(a, _): (Value, Value)| Ok(a));
        let err = TaskOutput::from_value(json!(1)).reduce(&sum, &exec).await.unwrap_err();
        assert!(matches!(err, AwelError::NotAStream));
    }

    #[tokio::test]
    async fn streamify_then_unstreamify() {
        let to_stream: StreamifyFunc = Arc::new(|v: Value| {
            let n = v.as_i64().unwrap_or(0);
            futures::stream::iter((0..n).map(|i| Ok(json!(i)))).boxed()
        });
        let count = unstreamify_fn(|s: ValueStream| async move {
            let items: Vec<Value> = s.try_collect().await?;
            Ok::<_, anyhow::Error>(json!(items.len()))
        });

        let streamed = TaskOutput::from_value(json!(4)).streamify(&to_stream).unwrap();
        assert!(streamed.is_stream());
        let counted = streamed.unstreamify(&count).await.unwrap();
        assert_eq!(counted.output().unwrap(), Some(&json!(4)));
    }

    #[tokio::test]
    async fn check_condition_on_stream_is_config_error() {
        let exec = BlockingExecutor::default();
        let pred: PredicateFunc = Callable::blocking(|_| Ok(true));
        let err = TaskOutput::from_values(vec![])
            .check_condition(&pred, &exec)
            .await
            .unwrap_err();
        assert!(matches!(err, AwelError::ConfigError(_)));
        assert!(!TaskOutput::empty().check_condition(&pred, &exec).await.unwrap());
    }
}

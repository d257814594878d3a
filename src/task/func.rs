// src/task/func.rs

//! Wrappers for user-supplied functions.
//!
//! A [`Callable`] is either a plain synchronous closure, which always runs on
//! the [`BlockingExecutor`], or an async closure that is awaited in place.
//! Stream-shaped functions are plain closures over [`ValueStream`]s; they
//! build lazy pipelines and never block.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::errors::{AwelError, Result};
use crate::exec::BlockingExecutor;
use crate::task::output::ValueStream;

type SyncFn<A, R> = dyn Fn(A) -> anyhow::Result<R> + Send + Sync;
type AsyncFn<A, R> = dyn Fn(A) -> BoxFuture<'static, anyhow::Result<R>> + Send + Sync;

/// A user function from `A` to `R`, either blocking or async.
pub enum Callable<A, R> {
    Blocking(Arc<SyncFn<A, R>>),
    Async(Arc<AsyncFn<A, R>>),
}

impl<A, R> Clone for Callable<A, R> {
    fn clone(&self) -> Self {
        match self {
            Callable::Blocking(f) => Callable::Blocking(Arc::clone(f)),
            Callable::Async(f) => Callable::Async(Arc::clone(f)),
        }
    }
}

impl<A, R> fmt::Debug for Callable<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Blocking(_) => f.write_str("Callable::Blocking"),
            Callable::Async(_) => f.write_str("Callable::Async"),
        }
    }
}

impl<A, R> Callable<A, R>
where
    A: Send + 'static,
    R: Send + 'static,
{
    /// Wrap a synchronous closure. It runs on the blocking bridge.
    pub fn blocking<F>(f: F) -> Self
    where
        F: Fn(A) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        Callable::Blocking(Arc::new(f))
    }

    /// Wrap an async closure. It is awaited on the calling task.
    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        Callable::Async(Arc::new(
            move |a: A| -> BoxFuture<'static, anyhow::Result<R>> { Box::pin(f(a)) },
        ))
    }

    /// Invoke the function.
    ///
    /// Errors raised by the user function are returned as
    /// [`AwelError::Other`] without further wrapping.
    pub async fn call(&self, arg: A, executor: &BlockingExecutor) -> Result<R> {
        match self {
            Callable::Blocking(f) => {
                let f = Arc::clone(f);
                executor.run(move || f(arg)).await
            }
            Callable::Async(f) => f(arg).await.map_err(AwelError::from),
        }
    }
}

/// Value to value, used by map operators and stream element mapping.
pub type MapFunc = Callable<Value, Value>;

/// Value to bool, used by branches and `InputContext::filter`.
pub type PredicateFunc = Callable<Value, bool>;

/// Left fold step `(acc, item) -> acc`.
pub type ReduceFunc = Callable<(Value, Value), Value>;

/// N-ary combine over every parent's value, in parent order.
pub type JoinFunc = Callable<Vec<Value>, Value>;

/// Scalar to lazy sequence.
pub type StreamifyFunc = Arc<dyn Fn(Value) -> ValueStream + Send + Sync>;

/// Lazy sequence to lazy sequence.
pub type TransformStreamFunc = Arc<dyn Fn(ValueStream) -> ValueStream + Send + Sync>;

/// Consume a lazy sequence into a single value.
pub type UnstreamifyFunc =
    Arc<dyn Fn(ValueStream) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// Combine every parent's stream into one.
pub type StreamJoinFunc = Arc<dyn Fn(Vec<ValueStream>) -> ValueStream + Send + Sync>;

/// Build an [`UnstreamifyFunc`] from an async closure.
pub fn unstreamify_fn<F, Fut>(f: F) -> UnstreamifyFunc
where
    F: Fn(ValueStream) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(move |s: ValueStream| -> BoxFuture<'static, anyhow::Result<Value>> {
        Box::pin(f(s))
    })
}

/// The combine function handed to `InputContext::map_all`.
#[derive(Clone)]
pub enum MapAllFunc {
    /// Every non-empty parent must hold a value; empty parents appear as `null`.
    Values(JoinFunc),
    /// Every non-empty parent must hold a stream; empty parents are left out.
    Streams(StreamJoinFunc),
}

impl fmt::Debug for MapAllFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapAllFunc::Values(func) => f.debug_tuple("Values").field(func).finish(),
            MapAllFunc::Streams(_) => f.write_str("Streams"),
        }
    }
}

/// JavaScript-style truthiness, used to read predicate results and the
/// default join.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

// src/task/mod.rs

//! Task-level values: outputs, per-node contexts, and parent aggregation.
//!
//! - [`output`] holds the scalar-or-stream [`TaskOutput`].
//! - [`context`] holds the per-node-per-run [`TaskContext`].
//! - [`input`] holds [`InputContext`] and its combinators.
//! - [`func`] wraps user functions for the blocking bridge.

pub mod context;
pub mod func;
pub mod input;
pub mod output;

pub use context::TaskContext;
pub use func::{
    Callable, JoinFunc, MapAllFunc, MapFunc, PredicateFunc, ReduceFunc, StreamJoinFunc,
    StreamifyFunc, TransformStreamFunc, UnstreamifyFunc, is_truthy, unstreamify_fn,
};
pub use input::InputContext;
pub use output::{TaskOutput, ValueStream, collect_stream, empty_stream, once_stream};

// src/operator/mod.rs

//! Operators: the unit of computation attached to every DAG node.
//!
//! Every built-in kind is a concrete type implementing [`Operator`]:
//!
//! - [`input`]: root operators reading literals, sequences or call data.
//! - [`map`]: single-parent (or call data) value mapping.
//! - [`join`]: n-ary merge across all parents; never skipped.
//! - [`reduce`]: stream-to-scalar fold.
//! - [`branch`]: conditional skip of downstream targets.
//! - [`stream`]: streamify / unstreamify / transform-stream.

pub mod branch;
pub mod input;
pub mod join;
pub mod map;
pub mod reduce;
pub mod stream;

use futures::future::BoxFuture;

use crate::dag::DagContext;
use crate::errors::Result;
use crate::task::{TaskContext, TaskOutput};
use crate::types::OperatorKind;

pub use branch::{Branch, BranchOperator, BranchProvider, BranchTarget};
pub use input::{InputOperator, InputSource, TriggerOperator};
pub use join::JoinOperator;
pub use map::MapOperator;
pub use reduce::ReduceStreamOperator;
pub use stream::{StreamifyOperator, TransformStreamOperator, UnstreamifyOperator};

/// The contract every node's computation implements.
///
/// `execute` receives the node's fresh [`TaskContext`] (with its
/// [`crate::task::InputContext`] and optional call data already attached) and
/// the shared per-run [`DagContext`], and returns the node's output. It may
/// write metadata into the task context; the runner owns state transitions.
pub trait Operator: Send + Sync {
    /// Capability tag the scheduler uses for branch and join handling.
    fn kind(&self) -> OperatorKind;

    fn execute<'a>(
        &'a self,
        task: &'a mut TaskContext,
        ctx: &'a DagContext,
    ) -> BoxFuture<'a, Result<TaskOutput>>;

    /// Called once per run on every node of the job before anything executes.
    fn before_dag_run(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    /// Called after a run's leaf has finished. May be called many times over
    /// the life of a DAG and must be idempotent.
    fn after_dag_end(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

// src/engine/mod.rs

//! Execution engine.
//!
//! - [`job_manager`] turns "run the graph ending at this node" into a
//!   concrete job: the node set, root call data and a wave schedule.
//! - [`runner`] drives a job wave by wave and owns per-node state
//!   transitions.
//! - [`skip`] computes the nodes a branch decision removes from a run.

pub mod job_manager;
pub mod runner;
pub mod skip;

pub use job_manager::JobManager;
pub use runner::{DefaultWorkflowRunner, WorkflowRunner};

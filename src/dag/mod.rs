// src/dag/mod.rs

//! The graph model (`Dag`, `DagNode`, `NodeRef`) and per-run shared state
//! (`DagContext`).

pub mod context;
pub mod graph;

pub use context::DagContext;
pub use graph::{Dag, DagNode, NodeOptions, NodeRef};

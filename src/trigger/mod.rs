// src/trigger/mod.rs

//! Entry points that start DAG runs from outside the graph.

pub mod iterator;

pub use iterator::IteratorTrigger;

// src/trigger/iterator.rs

use futures::stream::{self, StreamExt};
use serde_json::Value;
use tracing::info;

use crate::dag::{Dag, NodeRef};
use crate::errors::Result;
use crate::task::collect_stream;

/// Runs a DAG once per input item.
///
/// Up to `parallelism` runs are in flight at once. Results come back in
/// input order, one per item; a failed run does not stop the others.
#[derive(Debug, Clone)]
pub struct IteratorTrigger {
    parallelism: usize,
    streaming: bool,
}

impl Default for IteratorTrigger {
    fn default() -> Self {
        Self::new(1)
    }
}

impl IteratorTrigger {
    pub fn new(parallelism: usize) -> Self {
        Self {
            parallelism: parallelism.max(1),
            streaming: false,
        }
    }

    /// Run through `call_stream` and collect each stream into an array.
    pub fn streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    pub async fn trigger<I>(&self, dag: &Dag, leaf: &NodeRef, items: I) -> Vec<Result<Value>>
    where
        I: IntoIterator<Item = Value>,
    {
        let items: Vec<Value> = items.into_iter().collect();
        info!(
            dag = %dag.name(),
            items = items.len(),
            parallelism = self.parallelism,
            streaming = self.streaming,
            "iterator trigger started"
        );

        stream::iter(items)
            .map(|item| self.run_one(dag, leaf, item))
            .buffered(self.parallelism)
            .collect()
            .await
    }

    async fn run_one(&self, dag: &Dag, leaf: &NodeRef, item: Value) -> Result<Value> {
        if self.streaming {
            let stream = dag.call_stream(leaf, Some(item)).await?;
            collect_stream(stream).await
        } else {
            dag.call(leaf, Some(item)).await
        }
    }
}

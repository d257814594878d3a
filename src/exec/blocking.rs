// src/exec/blocking.rs

//! Bridge that runs blocking closures on tokio's blocking pool.
//!
//! Operator bodies written as plain synchronous closures must not stall the
//! cooperative scheduler, so they are shipped to `spawn_blocking`. A
//! semaphore bounds how many of them may run at once.

use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::Semaphore;
use tracing::trace;

use crate::errors::{AwelError, Result};

/// Default number of concurrently running blocking closures.
pub const DEFAULT_BLOCKING_THREADS: usize = 8;

/// Bounded executor for blocking work.
///
/// Cheap to clone; all clones share the same permit pool.
#[derive(Debug, Clone)]
pub struct BlockingExecutor {
    permits: Arc<Semaphore>,
    limit: usize,
}

impl BlockingExecutor {
    /// Create an executor allowing `limit` concurrent blocking closures.
    ///
    /// A limit of zero is bumped to one.
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            permits: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Run `f` on the blocking pool and await its result.
    pub async fn run<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce() -> anyhow::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|e| AwelError::Other(anyhow!("blocking executor closed: {e}")))?;

        trace!(available = self.permits.available_permits(), "dispatching blocking closure");

        let handle = tokio::task::spawn_blocking(move || {
            let out = f();
            drop(permit);
            out
        });

        match handle.await {
            Ok(res) => res.map_err(AwelError::from),
            Err(join_err) => Err(AwelError::Other(anyhow!(
                "blocking task did not complete: {join_err}"
            ))),
        }
    }
}

impl Default for BlockingExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCKING_THREADS)
    }
}

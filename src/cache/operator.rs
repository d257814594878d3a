// src/cache/operator.rs

use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::store::CacheStore;
use crate::dag::DagContext;
use crate::errors::{AwelError, Result};
use crate::operator::Operator;
use crate::operator::branch::{BranchTarget, record_skip_targets};
use crate::task::{TaskContext, TaskOutput};
use crate::types::OperatorKind;

/// Share-data key the cache key travels under from the branch to the
/// reader and writer nodes.
pub const DEFAULT_CACHE_KEY_SHARE_KEY: &str = "cache_key";

/// Cache key for a request value. Object keys serialize in sorted order, so
/// equal values give equal keys.
pub fn cache_key(value: &Value) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

async fn shared_cache_key(ctx: &DagContext, share_key: &str) -> Result<String> {
    ctx.get_from_share_data(share_key)
        .await
        .and_then(|v| v.as_str().map(str::to_string))
        .ok_or_else(|| {
            AwelError::config(format!(
                "no cache key under '{share_key}' in share data; is a CacheBranchOperator upstream?"
            ))
        })
}

/// Branch that routes to the cached side on a hit and to the compute side on
/// a miss. Publishes the cache key to share data for the nodes below it.
#[derive(Clone)]
pub struct CacheBranchOperator {
    store: Arc<dyn CacheStore>,
    cache_target: BranchTarget,
    model_target: BranchTarget,
    share_key: String,
}

impl std::fmt::Debug for CacheBranchOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheBranchOperator")
            .field("cache_target", &self.cache_target)
            .field("model_target", &self.model_target)
            .field("share_key", &self.share_key)
            .finish()
    }
}

impl CacheBranchOperator {
    pub fn new(
        store: Arc<dyn CacheStore>,
        cache_target: impl Into<BranchTarget>,
        model_target: impl Into<BranchTarget>,
    ) -> Self {
        Self {
            store,
            cache_target: cache_target.into(),
            model_target: model_target.into(),
            share_key: DEFAULT_CACHE_KEY_SHARE_KEY.to_string(),
        }
    }

    pub fn with_share_key(mut self, key: impl Into<String>) -> Self {
        self.share_key = key.into();
        self
    }
}

impl Operator for CacheBranchOperator {
    fn kind(&self) -> OperatorKind {
        OperatorKind::Branch
    }

    fn execute<'a>(
        &'a self,
        task: &'a mut TaskContext,
        ctx: &'a DagContext,
    ) -> BoxFuture<'a, Result<TaskOutput>> {
        Box::pin(async move {
            let input = task.task_input().clone();
            let parent = input.single_parent("CacheBranchOperator")?;
            if parent.task_output().is_stream() {
                return Err(AwelError::config(format!(
                    "CacheBranchOperator '{}' cannot branch on a stream",
                    task.task_id()
                )));
            }

            let request = parent.task_output().output()?.cloned().unwrap_or(Value::Null);
            let key = cache_key(&request)?;
            ctx.save_to_share_data(&self.share_key, Value::String(key.clone()), false)
                .await?;

            let hit = self.store.get(&key).await?.is_some();
            debug!(task = %task.task_id(), hit, "cache lookup");

            let skip = if hit {
                &self.model_target
            } else {
                &self.cache_target
            };
            record_skip_targets(task, [skip]);
            Ok(parent.task_output().clone())
        })
    }
}

/// Emits the cached value for the key the branch published.
#[derive(Clone)]
pub struct CachedValueOperator {
    store: Arc<dyn CacheStore>,
    share_key: String,
}

impl std::fmt::Debug for CachedValueOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedValueOperator")
            .field("share_key", &self.share_key)
            .finish()
    }
}

impl CachedValueOperator {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            share_key: DEFAULT_CACHE_KEY_SHARE_KEY.to_string(),
        }
    }

    pub fn with_share_key(mut self, key: impl Into<String>) -> Self {
        self.share_key = key.into();
        self
    }
}

impl Operator for CachedValueOperator {
    fn kind(&self) -> OperatorKind {
        OperatorKind::Map
    }

    fn execute<'a>(
        &'a self,
        task: &'a mut TaskContext,
        ctx: &'a DagContext,
    ) -> BoxFuture<'a, Result<TaskOutput>> {
        Box::pin(async move {
            let key = shared_cache_key(ctx, &self.share_key).await?;
            match self.store.get(&key).await? {
                Some(value) => Ok(TaskOutput::from_value(value)),
                None => {
                    warn!(task = %task.task_id(), "cache entry vanished after a hit");
                    Ok(TaskOutput::empty())
                }
            }
        })
    }
}

/// Passes its single scalar input through and stores it under the run's
/// cache key.
#[derive(Clone)]
pub struct SaveToCacheOperator {
    store: Arc<dyn CacheStore>,
    share_key: String,
}

impl std::fmt::Debug for SaveToCacheOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaveToCacheOperator")
            .field("share_key", &self.share_key)
            .finish()
    }
}

impl SaveToCacheOperator {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            share_key: DEFAULT_CACHE_KEY_SHARE_KEY.to_string(),
        }
    }

    pub fn with_share_key(mut self, key: impl Into<String>) -> Self {
        self.share_key = key.into();
        self
    }
}

impl Operator for SaveToCacheOperator {
    fn kind(&self) -> OperatorKind {
        OperatorKind::Map
    }

    fn execute<'a>(
        &'a self,
        task: &'a mut TaskContext,
        ctx: &'a DagContext,
    ) -> BoxFuture<'a, Result<TaskOutput>> {
        Box::pin(async move {
            let parent = task.task_input().single_parent("SaveToCacheOperator")?;
            let Some(value) = parent.task_output().output()?.cloned() else {
                return Ok(TaskOutput::empty());
            };
            let key = shared_cache_key(ctx, &self.share_key).await?;
            self.store.set(&key, value.clone()).await?;
            debug!(task = %task.task_id(), "value saved to cache");
            Ok(TaskOutput::from_value(value))
        })
    }
}

/// Passes a stream through unchanged and stores the collected elements as an
/// array once it completes. A stream that ends in an error is not stored.
#[derive(Clone)]
pub struct StreamSaveToCacheOperator {
    store: Arc<dyn CacheStore>,
    share_key: String,
}

impl std::fmt::Debug for StreamSaveToCacheOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSaveToCacheOperator")
            .field("share_key", &self.share_key)
            .finish()
    }
}

impl StreamSaveToCacheOperator {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            share_key: DEFAULT_CACHE_KEY_SHARE_KEY.to_string(),
        }
    }

    pub fn with_share_key(mut self, key: impl Into<String>) -> Self {
        self.share_key = key.into();
        self
    }
}

impl Operator for StreamSaveToCacheOperator {
    fn kind(&self) -> OperatorKind {
        OperatorKind::TransformStream
    }

    fn execute<'a>(
        &'a self,
        task: &'a mut TaskContext,
        ctx: &'a DagContext,
    ) -> BoxFuture<'a, Result<TaskOutput>> {
        Box::pin(async move {
            let parent = task.task_input().single_parent("StreamSaveToCacheOperator")?;
            if !parent.task_output().is_stream() {
                return Err(AwelError::config(format!(
                    "StreamSaveToCacheOperator '{}' requires a stream parent",
                    task.task_id()
                )));
            }
            let key = shared_cache_key(ctx, &self.share_key).await?;
            let source = parent.task_output().take_stream()?;

            // `None` once an error has passed through.
            let seen: Arc<Mutex<Option<Vec<Value>>>> = Arc::new(Mutex::new(Some(Vec::new())));

            let on_item = Arc::clone(&seen);
            let on_error = Arc::clone(&seen);
            let tapped = source
                .inspect_ok(move |item| {
                    if let Ok(mut guard) = on_item.lock() {
                        if let Some(items) = guard.as_mut() {
                            items.push(item.clone());
                        }
                    }
                })
                .inspect_err(move |_| {
                    if let Ok(mut guard) = on_error.lock() {
                        *guard = None;
                    }
                });

            let store = Arc::clone(&self.store);
            let finish = stream::once(async move {
                let items = seen.lock().ok().and_then(|mut guard| guard.take());
                match items {
                    Some(items) => store.set(&key, Value::Array(items)).await,
                    None => Ok(()),
                }
            })
            .filter_map(|done: Result<()>| async move { done.err().map(Err::<Value, AwelError>) });

            Ok(TaskOutput::from_stream(tapped.chain(finish).boxed()))
        })
    }
}

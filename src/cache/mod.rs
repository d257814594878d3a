// src/cache/mod.rs

//! Cache-or-compute building blocks.
//!
//! A typical wiring:
//!
//! ```text
//! input -> CacheBranchOperator -+-> CachedValueOperator ---------------+-> JoinOperator
//!                               +-> model -> SaveToCacheOperator ------+
//! ```
//!
//! On a hit the model side is skipped; on a miss the cached side is. The
//! join keeps whichever side produced a value.

pub mod operator;
pub mod store;

pub use operator::{
    CacheBranchOperator, CachedValueOperator, DEFAULT_CACHE_KEY_SHARE_KEY, SaveToCacheOperator,
    StreamSaveToCacheOperator, cache_key,
};
pub use store::{CacheStore, MemoryCacheStore};

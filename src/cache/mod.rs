//! Two-tier caching
//!
//! - memory.rs: bounded in-process tier (moka)
//! - redis_store.rs / local.rs: persistent key-value tiers
//! - layer.rs: the cache callers use
//! - keys.rs: key shapes and their invalidation patterns

mod entry;
pub mod keys;
mod layer;
mod local;
mod memory;
mod redis_store;

pub use entry::{escape_glob, glob_match, CacheEntry};
pub use layer::{CacheLayer, CacheStats, WritePolicy};
pub use local::LocalKeyValueStore;
pub use memory::MemoryTier;
pub use redis_store::RedisStore;

use crate::config::Config;
use crate::core::{system_clock, KeyValueStore};
use crate::error::Result;
use std::sync::Arc;
use tracing::warn;

/// Build the cache described by `config`: Redis if configured, otherwise
/// an in-process persistent tier.
pub async fn connect(config: &Config) -> Result<CacheLayer> {
    let persistent: Arc<dyn KeyValueStore> = match &config.storage.redis {
        Some(redis_config) => Arc::new(RedisStore::connect(redis_config).await?),
        None => {
            warn!("REDIS_URL not set; persistent cache tier is process-local");
            Arc::new(LocalKeyValueStore::new(system_clock()))
        }
    };
    Ok(CacheLayer::new(&config.cache, persistent))
}

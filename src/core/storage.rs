//! Storage traits - Abstract interfaces for the remote stores
//!
//! - `VectorBackend`: collection lifecycle, upsert and similarity search
//! - `KeyValueStore`: the persistent cache tier
//!
//! Each trait has a networked implementation (Qdrant, Redis) and an
//! in-process one used for local development and tests.

use async_trait::async_trait;
use std::time::Duration;

use super::types::{CollectionInfo, CollectionSpec, Point, ScoredPoint, SearchRequest};
use crate::error::Result;

/// Vector index service operations.
///
/// Implementations report transport failures as `Error::StoreConnection`,
/// dimension mismatches as `Error::Validation` and missing collections as
/// `Error::NotFound`.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    /// Whether a collection exists
    async fn collection_exists(&self, name: &str) -> Result<bool>;

    /// Create a collection and its payload indexes
    async fn create_collection(&self, spec: &CollectionSpec) -> Result<()>;

    /// Names of all collections
    async fn list_collections(&self) -> Result<Vec<String>>;

    /// Drop a collection; `false` if it did not exist
    async fn delete_collection(&self, name: &str) -> Result<bool>;

    /// Collection status, `None` if it does not exist
    async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>>;

    /// Insert or replace points as one atomic batch
    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<()>;

    /// Nearest neighbours by descending similarity
    async fn search(&self, collection: &str, request: &SearchRequest) -> Result<Vec<ScoredPoint>>;

    /// Liveness check
    async fn health_check(&self) -> Result<()>;
}

/// Persistent key-value tier of the cache
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    /// Fetch a raw value
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a value that expires after `ttl`
    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    /// Delete a key; `true` if it existed
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Keys matching a glob pattern (`*`, `?`)
    async fn scan(&self, pattern: &str) -> Result<Vec<String>>;

    /// Delete several keys, returning how many existed
    async fn delete_many(&self, keys: &[String]) -> Result<usize>;

    /// Liveness check
    async fn health_check(&self) -> Result<()>;
}

//! Storage configuration types
//!
//! Configuration for the durable store (PostgreSQL), the vector index
//! service (Qdrant) and the persistent cache tier (Redis).

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// PostgreSQL configuration
    pub postgres: Option<PostgresConfig>,
    /// Vector index configuration
    #[serde(default)]
    pub vector: VectorStoreConfig,
    /// Redis configuration for the persistent cache tier
    pub redis: Option<RedisConfig>,
}

/// PostgreSQL configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    /// Database URL
    #[serde(skip_serializing)]
    pub url: SecretString,
    /// Maximum connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Enable pgvector extension
    #[serde(default = "default_true")]
    pub enable_pgvector: bool,
}

fn default_max_connections() -> u32 {
    5
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

/// Which vector backend to talk to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackendType {
    /// Remote Qdrant service
    #[default]
    Qdrant,
    /// In-process index (development, tests)
    Memory,
}

/// Vector store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    /// Backend type
    #[serde(default)]
    pub backend: VectorBackendType,
    /// Qdrant gRPC URL
    #[serde(default = "default_qdrant_url")]
    pub url: String,
    /// Optional API key
    #[serde(default, skip_serializing)]
    pub api_key: Option<SecretString>,
    /// Deadline for each call to the service
    #[serde(with = "humantime_serde", default = "default_call_timeout")]
    pub timeout: Duration,
    /// How long the collection listing stays cached
    #[serde(with = "humantime_serde", default = "default_list_cache_ttl")]
    pub list_cache_ttl: Duration,
    /// Points per upsert batch
    #[serde(default = "default_batch_size")]
    pub upload_batch_size: usize,
    /// Concurrent batches in parallel upload mode
    #[serde(default = "default_upload_workers")]
    pub upload_workers: usize,
    /// Total time spent retrying a transient failure; zero disables retries
    #[serde(with = "humantime_serde", default = "default_retry_elapsed")]
    pub retry_max_elapsed: Duration,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        VectorStoreConfig {
            backend: VectorBackendType::default(),
            url: default_qdrant_url(),
            api_key: None,
            timeout: default_call_timeout(),
            list_cache_ttl: default_list_cache_ttl(),
            upload_batch_size: default_batch_size(),
            upload_workers: default_upload_workers(),
            retry_max_elapsed: default_retry_elapsed(),
        }
    }
}

fn default_qdrant_url() -> String {
    "http://localhost:6334".to_string()
}

fn default_call_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_list_cache_ttl() -> Duration {
    Duration::from_secs(300)
}

fn default_batch_size() -> usize {
    100
}

fn default_upload_workers() -> usize {
    4
}

fn default_retry_elapsed() -> Duration {
    Duration::from_secs(10)
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis URL
    #[serde(skip_serializing)]
    pub url: SecretString,
    /// Deadline for each Redis command
    #[serde(with = "humantime_serde", default = "default_redis_timeout")]
    pub timeout: Duration,
}

fn default_redis_timeout() -> Duration {
    Duration::from_secs(2)
}

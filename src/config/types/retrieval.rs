//! Retrieval configuration types
//!
//! Cache tiers, embedding provider and query orchestration settings.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Two-tier cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Master switch
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Maximum entries held by the in-process tier
    #[serde(default = "default_memory_capacity")]
    pub memory_capacity: u64,
    /// Upper bound on how long an entry lives in the in-process tier
    #[serde(with = "humantime_serde", default = "default_memory_ttl")]
    pub memory_ttl: Duration,
    /// TTL used when a caller does not pass one
    #[serde(with = "humantime_serde", default = "default_persistent_ttl")]
    pub default_ttl: Duration,
    /// Namespace prepended to every persistent-tier key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            enabled: true,
            memory_capacity: default_memory_capacity(),
            memory_ttl: default_memory_ttl(),
            default_ttl: default_persistent_ttl(),
            key_prefix: default_key_prefix(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_memory_capacity() -> u64 {
    1000
}

fn default_memory_ttl() -> Duration {
    Duration::from_secs(3600)
}

fn default_persistent_ttl() -> Duration {
    Duration::from_secs(86400)
}

fn default_key_prefix() -> String {
    "noor:".to_string()
}

/// Embedding provider kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    /// Local ONNX model via fastembed
    #[default]
    Local,
    /// OpenAI-compatible HTTP endpoint
    Http,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Embedding provider
    #[serde(default)]
    pub provider: EmbeddingProviderKind,
    /// Embedding model
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Embedding dimensions
    #[serde(default = "default_embedding_dims")]
    pub dimensions: usize,
    /// Base URL of the HTTP provider
    pub url: Option<String>,
    /// API key of the HTTP provider
    #[serde(default, skip_serializing)]
    pub api_key: Option<SecretString>,
    /// Normalize Arabic orthography before embedding
    #[serde(default = "default_true")]
    pub normalize_arabic: bool,
    /// Request timeout of the HTTP provider
    #[serde(with = "humantime_serde", default = "default_embedding_timeout")]
    pub timeout: Duration,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        EmbeddingConfig {
            provider: EmbeddingProviderKind::default(),
            model: default_embedding_model(),
            dimensions: default_embedding_dims(),
            url: None,
            api_key: None,
            normalize_arabic: true,
            timeout: default_embedding_timeout(),
        }
    }
}

fn default_embedding_model() -> String {
    "paraphrase-multilingual-mpnet-base-v2".to_string()
}

fn default_embedding_dims() -> usize {
    768
}

fn default_embedding_timeout() -> Duration {
    Duration::from_secs(30)
}

/// How scores from different collections are made comparable before merging
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreNormalization {
    /// Raw similarity scores
    #[default]
    None,
    /// Per-source min-max scaling into [0, 1]
    MinMax,
    /// Per-source reciprocal rank
    Rank,
}

/// Query orchestration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Collections searched when a query names none
    #[serde(default = "default_collections")]
    pub collections: Vec<String>,
    /// Result limit when a query gives none
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    /// Collections searched concurrently
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Deadline for each embedding or search call
    #[serde(with = "humantime_serde", default = "default_call_timeout")]
    pub call_timeout: Duration,
    /// TTL of cached result lists
    #[serde(with = "humantime_serde", default = "default_result_ttl")]
    pub result_ttl: Duration,
    /// TTL of cached query embeddings
    #[serde(with = "humantime_serde", default = "default_embedding_ttl")]
    pub embedding_ttl: Duration,
    /// Score normalization policy
    #[serde(default)]
    pub normalization: ScoreNormalization,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        RetrievalConfig {
            collections: default_collections(),
            default_limit: default_limit(),
            workers: default_workers(),
            call_timeout: default_call_timeout(),
            result_ttl: default_result_ttl(),
            embedding_ttl: default_embedding_ttl(),
            normalization: ScoreNormalization::default(),
        }
    }
}

fn default_collections() -> Vec<String> {
    vec!["quran".to_string(), "tafseer".to_string(), "hadith".to_string()]
}

fn default_limit() -> usize {
    10
}

fn default_workers() -> usize {
    4
}

fn default_call_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_result_ttl() -> Duration {
    Duration::from_secs(3600)
}

fn default_embedding_ttl() -> Duration {
    Duration::from_secs(86400)
}

//! Configuration module
//!
//! - types/mod.rs: Root `Config` and logging settings
//! - types/storage.rs: PostgreSQL, Qdrant and Redis settings
//! - types/retrieval.rs: Cache, embedding and orchestration settings
//! - io.rs: Configuration loading and saving
//! - validation.rs: Configuration validation
//! - paths.rs: Configuration file paths

mod io;
mod paths;
mod types;
mod validation;

pub use types::{Config, LogFormat, LoggingConfig};

pub use types::storage::{
    PostgresConfig, RedisConfig, StorageConfig, VectorBackendType, VectorStoreConfig,
};

pub use types::retrieval::{
    CacheConfig, EmbeddingConfig, EmbeddingProviderKind, RetrievalConfig, ScoreNormalization,
};

pub type DatabaseConfig = PostgresConfig;

pub use io::{apply_env_overrides, load_config, load_config_from_path, save_config};
pub use paths::{config_path, data_dir};
pub use validation::{validate_config, ConfigValidationResult, ValidationIssue};

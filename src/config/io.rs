//! Configuration I/O - Loading and saving configuration
//!
//! Handles reading configuration from files and environment variables.

use std::path::Path;

use super::types::storage::{PostgresConfig, RedisConfig, VectorBackendType};
use super::types::Config;
use crate::error::{Error, Result};

/// Load configuration with layered precedence:
/// 1. Config file if it exists, otherwise defaults
/// 2. Environment variable overrides (includes .env)
pub fn load_config() -> Result<Config> {
    let config_path = super::paths::config_path();

    let mut config = if config_path.exists() {
        load_config_from_path(&config_path)?
    } else {
        Config::default()
    };

    apply_env_overrides(&mut config);

    Ok(config)
}

/// Load configuration from a specific path
pub fn load_config_from_path(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;

    let config: Config = if path.extension().is_some_and(|ext| ext == "json") {
        json5::from_str(&content).map_err(|e| Error::Config(format!("Invalid JSON config: {}", e)))?
    } else if path.extension().is_some_and(|ext| ext == "toml") {
        toml::from_str(&content).map_err(|e| Error::Config(format!("Invalid TOML config: {}", e)))?
    } else {
        json5::from_str(&content)
            .or_else(|_| toml::from_str(&content).map_err(|e| Error::Config(e.to_string())))
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?
    };

    Ok(config)
}

/// Apply environment variable overrides to an existing config.
///
/// Loads a `.env` file if present, then overlays any set variables.
pub fn apply_env_overrides(config: &mut Config) {
    use secrecy::SecretString;

    dotenvy::dotenv().ok();

    // Durable store
    if let Ok(database_url) = std::env::var("DATABASE_URL") {
        let pg = config.storage.postgres.get_or_insert_with(|| PostgresConfig {
            url: SecretString::from(String::new()),
            max_connections: 5,
            connect_timeout_secs: 30,
            enable_pgvector: true,
        });
        pg.url = SecretString::from(database_url);
    }
    if let Ok(max_conn) = std::env::var("DATABASE_MAX_CONNECTIONS") {
        if let Some(ref mut pg) = config.storage.postgres {
            if let Ok(v) = max_conn.parse() {
                pg.max_connections = v;
            }
        }
    }

    // Vector index
    if let Ok(url) = std::env::var("QDRANT_URL") {
        config.storage.vector.url = url;
        config.storage.vector.backend = VectorBackendType::Qdrant;
    }
    if let Ok(key) = std::env::var("QDRANT_API_KEY") {
        config.storage.vector.api_key = Some(SecretString::from(key));
    }
    if let Ok(backend) = std::env::var("VECTOR_BACKEND") {
        match backend.to_lowercase().as_str() {
            "memory" => config.storage.vector.backend = VectorBackendType::Memory,
            "qdrant" => config.storage.vector.backend = VectorBackendType::Qdrant,
            _ => {}
        }
    }
    if let Ok(size) = std::env::var("UPLOAD_BATCH_SIZE") {
        if let Ok(v) = size.parse() {
            config.storage.vector.upload_batch_size = v;
        }
    }

    // Persistent cache tier
    if let Ok(url) = std::env::var("REDIS_URL") {
        let redis = config.storage.redis.get_or_insert_with(|| RedisConfig {
            url: SecretString::from(String::new()),
            timeout: std::time::Duration::from_secs(2),
        });
        redis.url = SecretString::from(url);
    }
    if let Ok(enabled) = std::env::var("CACHE_ENABLED") {
        config.cache.enabled = enabled != "false" && enabled != "0";
    }
    if let Ok(prefix) = std::env::var("CACHE_KEY_PREFIX") {
        config.cache.key_prefix = prefix;
    }

    // Embeddings
    if let Ok(model) = std::env::var("EMBEDDING_MODEL") {
        config.embedding.model = model;
    }
    if let Ok(dims) = std::env::var("EMBEDDING_DIMENSIONS") {
        if let Ok(v) = dims.parse() {
            config.embedding.dimensions = v;
        }
    }
    if let Ok(url) = std::env::var("EMBEDDING_URL") {
        config.embedding.url = Some(url);
        config.embedding.provider = super::types::retrieval::EmbeddingProviderKind::Http;
    }
    if let Ok(key) = std::env::var("EMBEDDING_API_KEY") {
        config.embedding.api_key = Some(SecretString::from(key));
    }

    // Logging
    if let Ok(format) = std::env::var("LOG_FORMAT") {
        if let Ok(v) = format.parse() {
            config.logging.format = v;
        }
    }
}

/// Save configuration to a file
pub fn save_config(config: &Config, path: &Path) -> Result<()> {
    let content = if path.extension().is_some_and(|ext| ext == "toml") {
        toml::to_string_pretty(config)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?
    } else {
        serde_json::to_string_pretty(config)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    std::fs::write(path, content)?;
    Ok(())
}

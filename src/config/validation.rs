//! Configuration validation
//!
//! Validates configuration and reports issues.

use super::types::retrieval::EmbeddingProviderKind;
use super::types::storage::VectorBackendType;
use super::types::Config;

/// Result of configuration validation
#[derive(Debug, Clone)]
pub struct ConfigValidationResult {
    /// Whether the config is valid
    pub valid: bool,
    /// Validation errors (critical)
    pub errors: Vec<ValidationIssue>,
    /// Validation warnings (non-critical)
    pub warnings: Vec<ValidationIssue>,
}

impl ConfigValidationResult {
    /// Create a valid result
    pub fn valid() -> Self {
        ConfigValidationResult {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Add an error
    pub fn with_error(mut self, issue: ValidationIssue) -> Self {
        self.valid = false;
        self.errors.push(issue);
        self
    }

    /// Add a warning
    pub fn with_warning(mut self, issue: ValidationIssue) -> Self {
        self.warnings.push(issue);
        self
    }
}

/// A validation issue
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Path to the config field
    pub path: String,
    /// Issue message
    pub message: String,
    /// Suggested fix
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    /// Create a new issue
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationIssue {
            path: path.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    /// Add a suggestion
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// Validate the configuration
pub fn validate_config(config: &Config) -> ConfigValidationResult {
    let mut result = ConfigValidationResult::valid();

    result = validate_storage_config(config, result);
    result = validate_cache_config(config, result);
    result = validate_embedding_config(config, result);
    result = validate_retrieval_config(config, result);

    result
}

fn validate_storage_config(config: &Config, mut result: ConfigValidationResult) -> ConfigValidationResult {
    let vector = &config.storage.vector;

    if vector.backend == VectorBackendType::Qdrant && url::Url::parse(&vector.url).is_err() {
        result = result.with_error(
            ValidationIssue::new("storage.vector.url", format!("Invalid Qdrant URL: {}", vector.url))
                .with_suggestion("Use the gRPC endpoint, e.g. http://localhost:6334"),
        );
    }

    if vector.upload_batch_size == 0 {
        result = result.with_error(
            ValidationIssue::new("storage.vector.upload_batch_size", "Batch size must be positive")
                .with_suggestion("The default is 100 points per batch"),
        );
    }

    if vector.upload_workers == 0 {
        result = result.with_error(ValidationIssue::new(
            "storage.vector.upload_workers",
            "At least one upload worker is required",
        ));
    }

    if config.storage.postgres.is_none() {
        result = result.with_warning(
            ValidationIssue::new(
                "storage.postgres",
                "PostgreSQL not configured. User, corpus and memory stores are unavailable.",
            )
            .with_suggestion("Set DATABASE_URL environment variable or configure storage.postgres"),
        );
    }

    result
}

fn validate_cache_config(config: &Config, mut result: ConfigValidationResult) -> ConfigValidationResult {
    if config.cache.enabled && config.storage.redis.is_none() {
        result = result.with_warning(
            ValidationIssue::new(
                "storage.redis",
                "Redis not configured. The persistent cache tier will live in process memory.",
            )
            .with_suggestion("Set REDIS_URL to share cached results across processes"),
        );
    }

    if config.cache.memory_capacity == 0 {
        result = result.with_warning(ValidationIssue::new(
            "cache.memory_capacity",
            "In-process cache capacity is zero; every lookup will reach the persistent tier",
        ));
    }

    result
}

fn validate_embedding_config(config: &Config, mut result: ConfigValidationResult) -> ConfigValidationResult {
    if config.embedding.dimensions == 0 {
        result = result.with_error(ValidationIssue::new(
            "embedding.dimensions",
            "Embedding dimensions must be positive",
        ));
    }

    if config.embedding.provider == EmbeddingProviderKind::Http && config.embedding.url.is_none() {
        result = result.with_error(
            ValidationIssue::new("embedding.url", "HTTP embedding provider selected but no URL given")
                .with_suggestion("Set EMBEDDING_URL"),
        );
    }

    result
}

fn validate_retrieval_config(config: &Config, mut result: ConfigValidationResult) -> ConfigValidationResult {
    if config.retrieval.collections.is_empty() {
        result = result.with_warning(ValidationIssue::new(
            "retrieval.collections",
            "No default collections; queries must name their collections",
        ));
    }

    if config.retrieval.workers == 0 {
        result = result.with_error(ValidationIssue::new(
            "retrieval.workers",
            "At least one search worker is required",
        ));
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        let config = Config::default();
        let result = validate_config(&config);

        // Defaults warn about missing Postgres/Redis but have no errors
        assert!(result.errors.is_empty());
        assert!(result.valid);
        assert!(!result.warnings.is_empty());
    }

    #[test]
    fn test_http_provider_requires_url() {
        let mut config = Config::default();
        config.embedding.provider = EmbeddingProviderKind::Http;

        let result = validate_config(&config);
        assert!(!result.valid);
        assert!(result.errors.iter().any(|e| e.path == "embedding.url"));
    }

    #[test]
    fn test_zero_batch_size_is_error() {
        let mut config = Config::default();
        config.storage.vector.upload_batch_size = 0;

        let result = validate_config(&config);
        assert!(!result.valid);
    }
}

//! Embedding providers
//!
//! - local.rs: on-device models via fastembed
//! - http.rs: OpenAI-compatible remote endpoint
//! - arabic.rs: orthographic normalization applied before embedding

mod arabic;
mod http;
mod local;

pub use arabic::{normalize_arabic, ArabicNormalizing};
pub use http::HttpEmbeddingProvider;
pub use local::{resolve_model, FastEmbedProvider};

use std::sync::Arc;

use tracing::warn;

use crate::config::{EmbeddingConfig, EmbeddingProviderKind};
use crate::core::EmbeddingProvider;
use crate::error::Result;

/// Build the configured embedding provider
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let provider: Arc<dyn EmbeddingProvider> = match config.provider {
        EmbeddingProviderKind::Local => {
            let provider = FastEmbedProvider::new(&config.model)?;
            if provider.dimensions() != config.dimensions {
                warn!(
                    "Model {} produces {} dimensions; configured {} ignored",
                    config.model,
                    provider.dimensions(),
                    config.dimensions
                );
            }
            Arc::new(provider)
        }
        EmbeddingProviderKind::Http => Arc::new(HttpEmbeddingProvider::new(config)?),
    };

    if config.normalize_arabic {
        Ok(Arc::new(ArabicNormalizing::new(provider)))
    } else {
        Ok(provider)
    }
}

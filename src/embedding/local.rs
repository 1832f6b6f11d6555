//! Local embedding generation via fastembed
//!
//! Models are ONNX exports downloaded on first use into the data directory.
//! Inference is CPU-bound and runs on the blocking pool.

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Arc;
use tracing::info;

use crate::config::data_dir;
use crate::core::EmbeddingProvider;
use crate::error::{Error, Result};

/// Map a configured model name to a fastembed model and its dimensions
pub fn resolve_model(name: &str) -> Result<(EmbeddingModel, usize)> {
    let short = name.rsplit('/').next().unwrap_or(name).to_lowercase();
    match short.as_str() {
        "paraphrase-multilingual-mpnet-base-v2" => Ok((EmbeddingModel::ParaphraseMLMpnetBaseV2, 768)),
        "paraphrase-multilingual-minilm-l12-v2" => {
            Ok((EmbeddingModel::ParaphraseMLMiniLML12V2, 384))
        }
        "multilingual-e5-small" => Ok((EmbeddingModel::MultilingualE5Small, 384)),
        "multilingual-e5-base" => Ok((EmbeddingModel::MultilingualE5Base, 768)),
        "multilingual-e5-large" => Ok((EmbeddingModel::MultilingualE5Large, 1024)),
        _ => Err(Error::Config(format!(
            "Unsupported local embedding model '{}'",
            name
        ))),
    }
}

/// Local embedding provider wrapping fastembed
#[derive(Clone)]
pub struct FastEmbedProvider {
    model: Arc<TextEmbedding>,
    name: String,
    dimensions: usize,
}

impl FastEmbedProvider {
    /// Load a model, downloading it on first use
    pub fn new(model_name: &str) -> Result<Self> {
        let (model, dimensions) = resolve_model(model_name)?;

        let embedding = TextEmbedding::try_new(
            InitOptions::new(model)
                .with_cache_dir(data_dir().join("models"))
                .with_show_download_progress(true),
        )
        .map_err(|e| Error::Embedding(format!("Failed to init embedding model: {}", e)))?;

        info!("Loaded embedding model {} ({} dims)", model_name, dimensions);

        Ok(FastEmbedProvider {
            model: Arc::new(embedding),
            name: model_name.to_string(),
            dimensions,
        })
    }
}

fn check_non_empty(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(Error::Embedding("Cannot embed empty text".into()));
    }
    Ok(())
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    fn model_name(&self) -> &str {
        &self.name
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        check_non_empty(text)?;
        let model = self.model.clone();
        let text = text.to_string();

        tokio::task::spawn_blocking(move || {
            let embeddings = model
                .embed(vec![text], None)
                .map_err(|e| Error::Embedding(format!("Embedding error: {}", e)))?;
            embeddings
                .into_iter()
                .next()
                .ok_or_else(|| Error::Embedding("No embedding returned".into()))
        })
        .await
        .map_err(|e| Error::Internal(format!("Embedding task join error: {}", e)))?
    }

    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        for text in &texts {
            check_non_empty(text)?;
        }
        let model = self.model.clone();

        tokio::task::spawn_blocking(move || {
            model
                .embed(texts, None)
                .map_err(|e| Error::Embedding(format!("Batch embedding error: {}", e)))
        })
        .await
        .map_err(|e| Error::Internal(format!("Embedding task join error: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_models() {
        let (_, dims) = resolve_model("paraphrase-multilingual-mpnet-base-v2").unwrap();
        assert_eq!(dims, 768);
        let (_, dims) = resolve_model("sentence-transformers/paraphrase-multilingual-MiniLM-L12-v2").unwrap();
        assert_eq!(dims, 384);
        let (_, dims) = resolve_model("intfloat/multilingual-e5-small").unwrap();
        assert_eq!(dims, 384);
    }

    #[test]
    fn test_unknown_model_is_config_error() {
        assert!(matches!(resolve_model("word2vec"), Err(Error::Config(_))));
    }

    #[test]
    fn test_empty_text_rejected() {
        assert!(check_non_empty("   ").is_err());
        assert!(check_non_empty("الحمد").is_ok());
    }

    #[tokio::test]
    #[ignore = "downloads the model"]
    async fn test_embed_is_deterministic() {
        let provider = FastEmbedProvider::new("multilingual-e5-small").unwrap();
        let a = provider.embed("الرحمن الرحيم").await.unwrap();
        let b = provider.embed("الرحمن الرحيم").await.unwrap();
        assert_eq!(a.len(), 384);
        assert_eq!(a, b);
    }
}

//! Embedding provider trait

use async_trait::async_trait;

use crate::error::Result;

/// Turns text into fixed-length vectors.
///
/// Output length always equals [`EmbeddingProvider::dimensions`]. Identical
/// input yields identical output. Empty input fails with `Error::Embedding`.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier, used in cache keys
    fn model_name(&self) -> &str;

    /// Vector length
    fn dimensions(&self) -> usize;

    /// Embed one text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed many texts, preserving order
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;
}

//! Corpus sources feeding the indexer
//!
//! - hadith.rs: hadith collections, substring search and index preparation
//! - json.rs: pre-extracted `(id, text, metadata)` files

mod hadith;
mod json;

pub use hadith::{Hadith, HadithCatalog, HadithMatch, HadithSource, JsonDirectorySource};
pub use json::JsonCorpusLoader;

use async_trait::async_trait;

use crate::core::IndexItem;
use crate::error::Result;

/// Supplies items to embed and index
#[async_trait]
pub trait CorpusLoader: Send + Sync {
    /// Loader name for logs
    fn name(&self) -> &str;

    /// Every item with non-empty text
    async fn load(&self) -> Result<Vec<IndexItem>>;
}

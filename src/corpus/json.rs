//! Pre-extracted corpus files
//!
//! A JSON array (or JSON Lines with a `.jsonl` extension) of
//! `{"id": ..., "text": ..., "metadata": {...}}` objects.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use super::CorpusLoader;
use crate::core::{payload_from_json, IndexItem, Payload};
use crate::error::{Error, Result};

#[derive(Deserialize)]
struct RawItem {
    id: serde_json::Value,
    #[serde(default)]
    text: String,
    #[serde(default)]
    metadata: Option<serde_json::Value>,
}

impl RawItem {
    fn into_item(self) -> Result<IndexItem> {
        let id = match self.id {
            serde_json::Value::String(s) => s,
            serde_json::Value::Number(n) => n.to_string(),
            other => {
                return Err(Error::Validation(format!(
                    "Item id must be a string or number, got {}",
                    other
                )))
            }
        };
        let metadata = match self.metadata {
            Some(value) => payload_from_json(value)?,
            None => Payload::new(),
        };
        Ok(IndexItem::new(id, self.text).with_metadata(metadata))
    }
}

/// Loads index items from a JSON or JSON Lines file
#[derive(Debug, Clone)]
pub struct JsonCorpusLoader {
    path: PathBuf,
    name: String,
}

impl JsonCorpusLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("json")
            .to_string();
        Self { path, name }
    }

    fn is_json_lines(&self) -> bool {
        self.path.extension().and_then(|e| e.to_str()) == Some("jsonl")
    }
}

#[async_trait]
impl CorpusLoader for JsonCorpusLoader {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self) -> Result<Vec<IndexItem>> {
        let content = tokio::fs::read_to_string(&self.path).await?;

        let raw: Vec<RawItem> = if self.is_json_lines() {
            content
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(serde_json::from_str::<RawItem>)
                .collect::<std::result::Result<_, _>>()?
        } else {
            serde_json::from_str(&content)?
        };

        let total = raw.len();
        let mut items = Vec::with_capacity(total);
        for item in raw {
            let item = item.into_item()?;
            if item.text.trim().is_empty() {
                warn!("Skipping item {} with no text", item.id);
                continue;
            }
            items.push(item);
        }

        info!(
            "Loaded {}/{} items from {}",
            items.len(),
            total,
            self.path.display()
        );
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PayloadValue;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_json_array() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("quran.json");
        std::fs::write(
            &path,
            r#"[
                {"id": "1:1", "text": "بسم الله الرحمن الرحيم", "metadata": {"surah": 1, "ayah": 1}},
                {"id": 2, "text": "  "},
                {"id": "1:2", "text": "الحمد لله رب العالمين"}
            ]"#,
        )
        .unwrap();

        let loader = JsonCorpusLoader::new(&path);
        assert_eq!(loader.name(), "quran");

        let items = loader.load().await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, "1:1");
        assert_eq!(items[0].metadata["surah"], PayloadValue::Integer(1));
        assert!(items[1].metadata.is_empty());
    }

    #[tokio::test]
    async fn test_load_json_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fiqh.jsonl");
        std::fs::write(
            &path,
            "{\"id\": \"f1\", \"text\": \"الوضوء\"}\n\n{\"id\": \"f2\", \"text\": \"التيمم\"}\n",
        )
        .unwrap();

        let items = JsonCorpusLoader::new(&path).load().await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].id, "f2");
    }

    #[tokio::test]
    async fn test_null_metadata_value_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"[{"id": "x", "text": "t", "metadata": {"k": null}}]"#).unwrap();

        let result = JsonCorpusLoader::new(&path).load().await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let result = JsonCorpusLoader::new("/nonexistent/corpus.json").load().await;
        assert!(matches!(result, Err(Error::Io(_))));
    }
}

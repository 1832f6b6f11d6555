//! Hadith collections
//!
//! Collections are JSON files of `{number, arab, text, reference}` records,
//! one file per collection (`bukhari.json`, `muslim.json`, ...).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::CorpusLoader;
use crate::core::{IndexItem, Payload, PayloadValue};
use crate::error::{Error, Result};

/// One hadith
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hadith {
    #[serde(default)]
    pub number: i64,
    /// Arabic text
    #[serde(default)]
    pub arab: String,
    /// Translated text
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub reference: String,
}

impl Hadith {
    fn contains(&self, query: &str) -> bool {
        self.arab.contains(query) || self.text.contains(query) || self.reference.contains(query)
    }
}

/// A search hit tagged with the collection it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HadithMatch {
    pub collection: String,
    #[serde(flatten)]
    pub hadith: Hadith,
}

/// Where hadith collections come from
#[async_trait]
pub trait HadithSource: Send + Sync {
    /// Names of the available collections
    async fn collections(&self) -> Result<Vec<String>>;

    /// Every hadith of one collection
    async fn load(&self, collection: &str) -> Result<Vec<Hadith>>;
}

/// File layout accepted for a collection: a bare array, or the
/// `{"data": {"hadiths": [...]}}` envelope returned by sunnah.com
#[derive(Deserialize)]
#[serde(untagged)]
enum CollectionFile {
    Bare(Vec<Hadith>),
    Envelope { data: EnvelopeData },
}

#[derive(Deserialize)]
struct EnvelopeData {
    hadiths: Vec<Hadith>,
}

/// Collections stored as `{dir}/{collection}.json`
#[derive(Debug, Clone)]
pub struct JsonDirectorySource {
    dir: PathBuf,
}

impl JsonDirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_for(&self, collection: &str) -> Result<PathBuf> {
        if collection.is_empty()
            || !collection
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(Error::Validation(format!(
                "Invalid collection name '{}'",
                collection
            )));
        }
        Ok(self.dir.join(format!("{}.json", collection)))
    }
}

#[async_trait]
impl HadithSource for JsonDirectorySource {
    async fn collections(&self) -> Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut names = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }

        names.sort();
        Ok(names)
    }

    async fn load(&self, collection: &str) -> Result<Vec<Hadith>> {
        let path = self.file_for(collection)?;
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(format!(
                    "Hadith collection {} ({})",
                    collection,
                    path.display()
                )))
            }
            Err(e) => return Err(e.into()),
        };

        let hadiths = match serde_json::from_str::<CollectionFile>(&content)? {
            CollectionFile::Bare(hadiths) => hadiths,
            CollectionFile::Envelope { data } => data.hadiths,
        };
        debug!("Loaded {} hadiths from {}", hadiths.len(), path.display());
        Ok(hadiths)
    }
}

/// Search and indexing over a set of hadith collections
#[derive(Clone)]
pub struct HadithCatalog {
    source: Arc<dyn HadithSource>,
}

impl HadithCatalog {
    pub fn new(source: Arc<dyn HadithSource>) -> Self {
        Self { source }
    }

    /// Load every requested collection that exists. Unreadable collections
    /// are logged and skipped.
    async fn load_collections(
        &self,
        collections: Option<&[String]>,
    ) -> Result<Vec<(String, Vec<Hadith>)>> {
        let available = self.source.collections().await?;
        let selected: Vec<String> = match collections {
            Some(wanted) => wanted
                .iter()
                .filter(|c| available.contains(c))
                .cloned()
                .collect(),
            None => available,
        };

        let mut loaded = Vec::with_capacity(selected.len());
        for name in selected {
            match self.source.load(&name).await {
                Ok(hadiths) => loaded.push((name, hadiths)),
                Err(e) => warn!("Skipping hadith collection {}: {}", name, e),
            }
        }
        Ok(loaded)
    }

    /// Every hadith whose Arabic text, translation or reference contains
    /// `query`, tagged with its collection
    pub async fn search_hadith(
        &self,
        query: &str,
        collections: Option<&[String]>,
    ) -> Result<Vec<HadithMatch>> {
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let mut matches = Vec::new();
        for (collection, hadiths) in self.load_collections(collections).await? {
            matches.extend(
                hadiths
                    .into_iter()
                    .filter(|h| h.contains(query))
                    .map(|hadith| HadithMatch {
                        collection: collection.clone(),
                        hadith,
                    }),
            );
        }
        Ok(matches)
    }

    /// Look up a hadith by its number within a collection
    pub async fn get_hadith_by_number(
        &self,
        collection: &str,
        number: i64,
    ) -> Result<Option<Hadith>> {
        let hadiths = self.source.load(collection).await?;
        Ok(hadiths.into_iter().find(|h| h.number == number))
    }

    /// Index items for every hadith: id `hadith_{collection}_{number}`, the
    /// Arabic text, and its provenance as metadata
    pub async fn prepare_embeddings(&self) -> Result<Vec<IndexItem>> {
        let mut items = Vec::new();
        for (collection, hadiths) in self.load_collections(None).await? {
            items.extend(hadiths.into_iter().map(|h| to_index_item(&collection, h)));
        }
        Ok(items)
    }
}

fn to_index_item(collection: &str, hadith: Hadith) -> IndexItem {
    let mut metadata = Payload::new();
    metadata.insert("source".into(), "hadith".into());
    metadata.insert("collection".into(), collection.into());
    metadata.insert("number".into(), PayloadValue::Integer(hadith.number));
    metadata.insert("translated_text".into(), hadith.text.into());
    metadata.insert("reference".into(), hadith.reference.into());

    IndexItem::new(format!("hadith_{}_{}", collection, hadith.number), hadith.arab)
        .with_metadata(metadata)
}

#[async_trait]
impl CorpusLoader for HadithCatalog {
    fn name(&self) -> &str {
        "hadith"
    }

    async fn load(&self) -> Result<Vec<IndexItem>> {
        let items: Vec<IndexItem> = self
            .prepare_embeddings()
            .await?
            .into_iter()
            .filter(|item| !item.text.trim().is_empty())
            .collect();
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write_collection(dir: &Path, name: &str, body: serde_json::Value) {
        std::fs::write(dir.join(format!("{}.json", name)), body.to_string()).unwrap();
    }

    fn fixture() -> (TempDir, HadithCatalog) {
        let dir = TempDir::new().unwrap();
        write_collection(
            dir.path(),
            "bukhari",
            json!([
                {"number": 1, "arab": "إنما الأعمال بالنيات", "text": "Actions are by intentions", "reference": "البخاري، كتاب بدء الوحي"},
                {"number": 8, "arab": "بني الإسلام على خمس", "text": "Islam is built on five", "reference": "البخاري، كتاب الإيمان"}
            ]),
        );
        write_collection(
            dir.path(),
            "muslim",
            json!({"data": {"hadiths": [
                {"number": 1, "arab": "الإيمان بضع وسبعون شعبة", "text": "Faith has over seventy branches", "reference": "مسلم، كتاب الإيمان"},
                {"number": 2, "arab": "الطهور شطر الإيمان", "text": "Purity is half of faith", "reference": "مسلم، كتاب الطهارة"}
            ]}}),
        );
        let catalog = HadithCatalog::new(Arc::new(JsonDirectorySource::new(dir.path())));
        (dir, catalog)
    }

    #[tokio::test]
    async fn test_search_across_collections() {
        let (_dir, catalog) = fixture();
        let matches = catalog.search_hadith("الإيمان", None).await.unwrap();

        // bukhari #8 by reference, muslim #1 and #2 by text
        assert_eq!(matches.len(), 3);
        assert_eq!(matches[0].collection, "bukhari");
        assert_eq!(matches[0].hadith.number, 8);
        assert!(matches[1..].iter().all(|m| m.collection == "muslim"));
    }

    #[tokio::test]
    async fn test_search_restricted_to_collections() {
        let (_dir, catalog) = fixture();
        let only = vec!["muslim".to_string(), "tirmidhi".to_string()];
        let matches = catalog.search_hadith("الإيمان", Some(&only)).await.unwrap();
        assert_eq!(matches.len(), 2);
        assert!(matches.iter().all(|m| m.collection == "muslim"));
    }

    #[tokio::test]
    async fn test_search_matches_translation() {
        let (_dir, catalog) = fixture();
        let matches = catalog.search_hadith("intentions", None).await.unwrap();
        assert_eq!(matches.len(), 1);
        let json = serde_json::to_value(&matches[0]).unwrap();
        assert_eq!(json["collection"], "bukhari");
        assert_eq!(json["number"], 1);
    }

    #[tokio::test]
    async fn test_get_by_number() {
        let (_dir, catalog) = fixture();
        let hadith = catalog.get_hadith_by_number("muslim", 2).await.unwrap().unwrap();
        assert_eq!(hadith.arab, "الطهور شطر الإيمان");
        assert!(catalog.get_hadith_by_number("muslim", 99).await.unwrap().is_none());
        assert!(matches!(
            catalog.get_hadith_by_number("nasai", 1).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_prepare_embeddings() {
        let (_dir, catalog) = fixture();
        let items = catalog.prepare_embeddings().await.unwrap();
        assert_eq!(items.len(), 4);

        let first = &items[0];
        assert_eq!(first.id, "hadith_bukhari_1");
        assert_eq!(first.text, "إنما الأعمال بالنيات");
        assert_eq!(first.metadata["source"], PayloadValue::from("hadith"));
        assert_eq!(first.metadata["number"], PayloadValue::Integer(1));
        assert_eq!(
            first.metadata["translated_text"],
            PayloadValue::from("Actions are by intentions")
        );
    }

    #[tokio::test]
    async fn test_unreadable_collection_is_skipped() {
        let (dir, catalog) = fixture();
        std::fs::write(dir.path().join("broken.json"), "{not json").unwrap();
        let matches = catalog.search_hadith("الإيمان", None).await.unwrap();
        assert_eq!(matches.len(), 3);
    }

    #[test]
    fn test_collection_names_are_checked() {
        let source = JsonDirectorySource::new("/tmp");
        assert!(source.file_for("../etc/passwd").is_err());
        assert!(source.file_for("bukhari").is_ok());
    }
}

//! Quran, tafseer and scientific-miracle records with full-text search

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use tracing::{debug, info};

use crate::cache::{keys, CacheLayer, WritePolicy};
use crate::database::{to_tsquery_terms, PostgresPool};
use crate::error::{Error, Result};

const SEARCH_TTL: Duration = Duration::from_secs(300);
const LIST_TTL: Duration = Duration::from_secs(3600);
const RECORD_TTL: Duration = Duration::from_secs(3600);

/// Logical table of a corpus record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorpusKind {
    Quran,
    Tafseer,
    Miracles,
}

impl CorpusKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CorpusKind::Quran => "quran",
            CorpusKind::Tafseer => "tafseer",
            CorpusKind::Miracles => "miracles",
        }
    }
}

impl fmt::Display for CorpusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CorpusKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "quran" => Ok(CorpusKind::Quran),
            "tafseer" | "tafsir" => Ok(CorpusKind::Tafseer),
            "miracles" | "scientific_miracles" => Ok(CorpusKind::Miracles),
            other => Err(Error::Validation(format!("Unknown corpus kind '{}'", other))),
        }
    }
}

/// A verse, tafseer entry or scientific miracle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct CorpusRecord {
    pub id: String,
    /// Tafseer name, or the origin of a miracle entry
    #[sqlx(default)]
    pub source: Option<String>,
    #[sqlx(default)]
    pub title: Option<String>,
    pub text: String,
    #[sqlx(default)]
    pub surah: Option<i32>,
    #[sqlx(default)]
    pub ayah: Option<i32>,
    pub metadata: Json<serde_json::Value>,
}

impl CorpusRecord {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        CorpusRecord {
            id: id.into(),
            source: None,
            title: None,
            text: text.into(),
            surah: None,
            ayah: None,
            metadata: Json(serde_json::json!({})),
        }
    }

    /// A verse keyed `{surah}:{ayah}`
    pub fn verse(surah: i32, ayah: i32, text: impl Into<String>) -> Self {
        let mut record = Self::new(format!("{}:{}", surah, ayah), text);
        record.surah = Some(surah);
        record.ayah = Some(ayah);
        record
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Json(metadata);
        self
    }
}

/// A record with its full-text rank
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct RankedRecord {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub record: CorpusRecord,
    pub rank: f32,
}

const COLUMNS: &str = "id, source, title, text, surah, ayah, metadata";

/// Corpus store backed by PostgreSQL, fronted by the cache
#[derive(Clone)]
pub struct CorpusStore {
    pg_pool: PostgresPool,
    cache: Arc<CacheLayer>,
}

impl CorpusStore {
    pub fn new(pg_pool: PostgresPool, cache: Arc<CacheLayer>) -> Self {
        CorpusStore { pg_pool, cache }
    }

    /// Drop every cached read a write to `kind` could have changed
    async fn invalidate(&self, kind: CorpusKind, id: Option<&str>) {
        if let Some(id) = id {
            self.cache.delete(&keys::corpus_record(kind.as_str(), id)).await;
        }
        self.cache.delete(&keys::corpus_all(kind.as_str())).await;
        let cleared = self
            .cache
            .clear(&keys::corpus_search_pattern(kind.as_str()))
            .await;
        debug!("Invalidated {} cached {} searches", cleared, kind);
    }

    fn validate(record: &CorpusRecord) -> Result<()> {
        if record.id.trim().is_empty() {
            return Err(Error::Validation("Corpus records need an id".into()));
        }
        if record.text.trim().is_empty() {
            return Err(Error::Validation(format!("Record {} has no text", record.id)));
        }
        Ok(())
    }

    async fn insert<'e, E>(executor: E, kind: CorpusKind, record: &CorpusRecord) -> Result<()>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query(r#"
            INSERT INTO corpus_documents (kind, id, source, title, text, surah, ayah, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (kind, id) DO UPDATE SET
                source = EXCLUDED.source,
                title = EXCLUDED.title,
                text = EXCLUDED.text,
                surah = EXCLUDED.surah,
                ayah = EXCLUDED.ayah,
                metadata = EXCLUDED.metadata
        "#)
        .bind(kind.as_str())
        .bind(&record.id)
        .bind(&record.source)
        .bind(&record.title)
        .bind(&record.text)
        .bind(record.surah)
        .bind(record.ayah)
        .bind(&record.metadata)
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Insert or replace one record, returning its id
    pub async fn save(&self, kind: CorpusKind, record: &CorpusRecord) -> Result<String> {
        Self::validate(record)?;
        Self::insert(&self.pg_pool, kind, record).await?;
        self.invalidate(kind, Some(&record.id)).await;
        Ok(record.id.clone())
    }

    /// Replace every record of `kind` (only those of `source` when given)
    /// with `records`, in one transaction
    pub async fn replace_all(
        &self,
        kind: CorpusKind,
        source: Option<&str>,
        records: &[CorpusRecord],
    ) -> Result<usize> {
        if records.is_empty() {
            return Err(Error::Validation(format!("No {} records to save", kind)));
        }
        for record in records {
            Self::validate(record)?;
        }

        let mut tx = self.pg_pool.begin().await?;

        match source {
            Some(source) => {
                sqlx::query("DELETE FROM corpus_documents WHERE kind = $1 AND source = $2")
                    .bind(kind.as_str())
                    .bind(source)
                    .execute(&mut *tx)
                    .await?;
            }
            None => {
                sqlx::query("DELETE FROM corpus_documents WHERE kind = $1")
                    .bind(kind.as_str())
                    .execute(&mut *tx)
                    .await?;
            }
        }

        for record in records {
            let mut record = record.clone();
            if let Some(source) = source {
                record.source = Some(source.to_string());
            }
            Self::insert(&mut *tx, kind, &record).await?;
        }

        tx.commit().await?;

        // every record id may have changed, so drop the kind's cached reads wholesale
        self.cache
            .clear(&format!("corpus:{}:*", crate::cache::escape_glob(kind.as_str())))
            .await;
        self.invalidate(kind, None).await;

        info!("Replaced {} {} records", records.len(), kind);
        Ok(records.len())
    }

    /// Fetch one record, cache first
    pub async fn get(&self, kind: CorpusKind, id: &str) -> Result<Option<CorpusRecord>> {
        let key = keys::corpus_record(kind.as_str(), id);
        if let Some(record) = self.cache.get::<CorpusRecord>(&key).await {
            return Ok(Some(record));
        }

        let record: Option<CorpusRecord> = sqlx::query_as(&format!(
            "SELECT {} FROM corpus_documents WHERE kind = $1 AND id = $2",
            COLUMNS
        ))
        .bind(kind.as_str())
        .bind(id)
        .fetch_optional(&self.pg_pool)
        .await?;

        if let Some(record) = &record {
            self.cache
                .set(&key, record, Some(RECORD_TTL), WritePolicy::Persistent)
                .await;
        }
        Ok(record)
    }

    /// Full-text search ranked by `ts_rank`, cached for five minutes
    pub async fn search(
        &self,
        kind: CorpusKind,
        query: &str,
        source: Option<&str>,
        limit: usize,
    ) -> Result<Vec<RankedRecord>> {
        let Some(tsquery) = to_tsquery_terms(query) else {
            return Ok(Vec::new());
        };
        if limit == 0 {
            return Ok(Vec::new());
        }

        let key = keys::corpus_search(kind.as_str(), source, query, limit);
        if let Some(results) = self.cache.get::<Vec<RankedRecord>>(&key).await {
            debug!("Corpus search cache hit for {}", key);
            return Ok(results);
        }

        let results: Vec<RankedRecord> = sqlx::query_as(&format!(
            r#"
            SELECT {}, ts_rank(search_vector, to_tsquery('simple', $2)) AS rank
            FROM corpus_documents
            WHERE kind = $1
              AND search_vector @@ to_tsquery('simple', $2)
              AND ($3::text IS NULL OR source = $3)
            ORDER BY rank DESC, id
            LIMIT $4
            "#,
            COLUMNS
        ))
        .bind(kind.as_str())
        .bind(&tsquery)
        .bind(source)
        .bind(limit as i64)
        .fetch_all(&self.pg_pool)
        .await?;

        self.cache
            .set(&key, &results, Some(SEARCH_TTL), WritePolicy::Persistent)
            .await;
        Ok(results)
    }

    /// Every record of a kind, cached for an hour
    pub async fn list_all(&self, kind: CorpusKind) -> Result<Vec<CorpusRecord>> {
        let key = keys::corpus_all(kind.as_str());
        if let Some(records) = self.cache.get::<Vec<CorpusRecord>>(&key).await {
            return Ok(records);
        }

        let records: Vec<CorpusRecord> = sqlx::query_as(&format!(
            "SELECT {} FROM corpus_documents WHERE kind = $1 ORDER BY surah NULLS LAST, ayah NULLS LAST, id",
            COLUMNS
        ))
        .bind(kind.as_str())
        .fetch_all(&self.pg_pool)
        .await?;

        self.cache
            .set(&key, &records, Some(LIST_TTL), WritePolicy::Persistent)
            .await;
        Ok(records)
    }

    /// Delete one record. `false` if it did not exist.
    pub async fn delete(&self, kind: CorpusKind, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM corpus_documents WHERE kind = $1 AND id = $2")
            .bind(kind.as_str())
            .bind(id)
            .execute(&self.pg_pool)
            .await?;

        self.invalidate(kind, Some(id)).await;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parsing() {
        assert_eq!("Quran".parse::<CorpusKind>().unwrap(), CorpusKind::Quran);
        assert_eq!("tafsir".parse::<CorpusKind>().unwrap(), CorpusKind::Tafseer);
        assert!(matches!("poetry".parse::<CorpusKind>(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_verse_record() {
        let verse = CorpusRecord::verse(2, 255, "اللَّهُ لَا إِلَٰهَ إِلَّا هُوَ");
        assert_eq!(verse.id, "2:255");
        assert_eq!(verse.surah, Some(2));
    }

    #[test]
    fn test_validation() {
        assert!(CorpusStore::validate(&CorpusRecord::new("1:1", "")).is_err());
        assert!(CorpusStore::validate(&CorpusRecord::new("", "text")).is_err());
        assert!(CorpusStore::validate(&CorpusRecord::new("1:1", "text")).is_ok());
    }

    #[test]
    fn test_ranked_record_flattens() {
        let ranked = RankedRecord {
            record: CorpusRecord::verse(1, 1, "بسم الله").with_source("uthmani"),
            rank: 0.5,
        };
        let json = serde_json::to_value(&ranked).unwrap();
        assert_eq!(json["id"], "1:1");
        assert_eq!(json["rank"], 0.5);
        let back: RankedRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, ranked);
    }

    #[tokio::test]
    #[ignore = "needs DATABASE_URL"]
    async fn test_search_cached_and_invalidated() {
        use crate::config::CacheConfig;
        use crate::core::system_clock;

        let url = std::env::var("DATABASE_URL").unwrap();
        let pool = sqlx::postgres::PgPoolOptions::new().connect(&url).await.unwrap();
        crate::database::migrations::run(&pool, 768).await.unwrap();

        let cache = Arc::new(CacheLayer::in_process(&CacheConfig::default(), system_clock()));
        let store = CorpusStore::new(pool, cache.clone());

        store
            .replace_all(
                CorpusKind::Tafseer,
                Some("test_tafseer"),
                &[CorpusRecord::new("t1", "الرحمة واسعة"), CorpusRecord::new("t2", "العدل")],
            )
            .await
            .unwrap();

        let hits = store.search(CorpusKind::Tafseer, "الرحمة", None, 10).await.unwrap();
        assert!(hits.iter().any(|h| h.record.id == "t1"));

        store.delete(CorpusKind::Tafseer, "t1").await.unwrap();
        let hits = store.search(CorpusKind::Tafseer, "الرحمة", None, 10).await.unwrap();
        assert!(hits.iter().all(|h| h.record.id != "t1"));
    }
}

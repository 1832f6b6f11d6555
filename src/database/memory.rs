//! Conversation memory storage and retrieval

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use pgvector::Vector;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use tracing::debug;
use uuid::Uuid;

use crate::cache::{keys, CacheLayer, WritePolicy};
use crate::database::{to_tsquery_terms, PostgresPool};
use crate::error::{Error, Result};

const MEMORY_TTL: Duration = Duration::from_secs(60);

const MEMORY_COLUMNS: &str = "id, user_id, content, metadata, messages, created_at";

/// One turn of the conversation a memory was taken from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryMessage {
    pub role: String,
    pub content: String,
}

impl MemoryMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        MemoryMessage {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// A memory entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Memory {
    /// Unique memory ID
    pub id: Uuid,
    /// User ID who owns this memory
    pub user_id: String,
    /// Main content of the memory
    pub content: String,
    /// Free-form context (conversation id, topic, ...)
    pub metadata: Json<serde_json::Value>,
    /// Conversation turns the memory was extracted from
    #[serde(default)]
    pub messages: Option<Json<Vec<MemoryMessage>>>,
    /// When the memory was created
    pub created_at: DateTime<Utc>,
}

impl Memory {
    /// Create a new memory
    pub fn new(user_id: impl Into<String>, content: impl Into<String>) -> Self {
        Memory {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            content: content.into(),
            metadata: Json(serde_json::json!({})),
            messages: None,
            created_at: Utc::now(),
        }
    }

    /// Set the metadata
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Json(metadata);
        self
    }

    /// Attach the conversation the memory came from
    pub fn with_messages(mut self, messages: Vec<MemoryMessage>) -> Self {
        self.messages = Some(Json(messages));
        self
    }
}

/// A memory with a relevance score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ScoredMemory {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub memory: Memory,
    pub score: f32,
}

/// Embedding stored alongside a memory
#[derive(Debug, Clone)]
pub struct MemoryEmbedding {
    pub model: String,
    pub vector: Vec<f32>,
}

/// Memory store backed by PostgreSQL + pgvector
#[derive(Clone)]
pub struct MemoryStore {
    pg_pool: PostgresPool,
    cache: Arc<CacheLayer>,
}

impl MemoryStore {
    /// Create a new memory store
    pub fn new(pg_pool: PostgresPool, cache: Arc<CacheLayer>) -> Self {
        MemoryStore { pg_pool, cache }
    }

    async fn invalidate_user(&self, user_id: &str) {
        let mut cleared = self.cache.clear(&keys::memory_search_pattern(user_id)).await;
        cleared += self.cache.clear(&keys::memory_recent_pattern(user_id)).await;
        cleared += self.cache.clear(&keys::memory_hybrid_pattern(user_id)).await;
        debug!("Invalidated {} cached memory reads for {}", cleared, user_id);
    }

    /// Save a memory and its embedding in one transaction
    pub async fn save(&self, memory: &Memory, embedding: Option<MemoryEmbedding>) -> Result<Uuid> {
        if memory.content.trim().is_empty() {
            return Err(Error::Validation("Memory content must not be empty".into()));
        }

        let mut tx = self.pg_pool.begin().await?;

        // xmax is zero only for freshly inserted rows
        let (inserted,): (bool,) = sqlx::query_as(r#"
            INSERT INTO memories (id, user_id, content, metadata, messages, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                content = EXCLUDED.content,
                metadata = EXCLUDED.metadata,
                messages = EXCLUDED.messages
            RETURNING (xmax = 0)
        "#)
        .bind(memory.id)
        .bind(&memory.user_id)
        .bind(&memory.content)
        .bind(&memory.metadata)
        .bind(&memory.messages)
        .bind(memory.created_at)
        .fetch_one(&mut *tx)
        .await?;

        match embedding {
            Some(embedding) => {
                sqlx::query(r#"
                    INSERT INTO memory_embeddings (memory_id, model, embedding)
                    VALUES ($1, $2, $3)
                    ON CONFLICT (memory_id) DO UPDATE SET
                        model = EXCLUDED.model,
                        embedding = EXCLUDED.embedding
                "#)
                .bind(memory.id)
                .bind(&embedding.model)
                .bind(Vector::from(embedding.vector))
                .execute(&mut *tx)
                .await?;
            }
            None if !inserted => {
                // the old vector was computed from the previous content
                sqlx::query("DELETE FROM memory_embeddings WHERE memory_id = $1")
                    .bind(memory.id)
                    .execute(&mut *tx)
                    .await?;
            }
            None => {}
        }

        tx.commit().await?;

        self.cache.delete(&keys::memory(memory.id)).await;
        self.invalidate_user(&memory.user_id).await;
        Ok(memory.id)
    }

    /// Get a memory by ID, cached for a minute
    pub async fn get(&self, id: Uuid) -> Result<Option<Memory>> {
        let key = keys::memory(id);
        if let Some(memory) = self.cache.get::<Memory>(&key).await {
            return Ok(Some(memory));
        }

        let memory: Option<Memory> = sqlx::query_as(&format!(
            "SELECT {} FROM memories WHERE id = $1",
            MEMORY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pg_pool)
        .await?;

        if let Some(memory) = &memory {
            self.cache
                .set(&key, memory, Some(MEMORY_TTL), WritePolicy::Persistent)
                .await;
        }
        Ok(memory)
    }

    /// Most recent memories of a user, cached for a minute
    pub async fn recent(&self, user_id: &str, limit: usize) -> Result<Vec<Memory>> {
        let key = keys::memory_recent(user_id, limit);
        if let Some(memories) = self.cache.get::<Vec<Memory>>(&key).await {
            return Ok(memories);
        }

        let memories: Vec<Memory> = sqlx::query_as(&format!(
            r#"
            SELECT {}
            FROM memories
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
            MEMORY_COLUMNS
        ))
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pg_pool)
        .await?;

        self.cache
            .set(&key, &memories, Some(MEMORY_TTL), WritePolicy::Persistent)
            .await;
        Ok(memories)
    }

    /// Search memories by full-text using PostgreSQL tsvector, cached for a minute
    pub async fn search_fulltext(
        &self,
        user_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<ScoredMemory>> {
        let Some(tsquery) = to_tsquery_terms(query) else {
            return Ok(vec![]);
        };

        let key = keys::memory_search(user_id, query, limit);
        if let Some(results) = self.cache.get::<Vec<ScoredMemory>>(&key).await {
            return Ok(results);
        }

        let results: Vec<ScoredMemory> = sqlx::query_as(r#"
            SELECT id, user_id, content, metadata, messages, created_at,
                   ts_rank(search_vector, to_tsquery('simple', $2)) AS score
            FROM memories
            WHERE user_id = $1
              AND search_vector @@ to_tsquery('simple', $2)
            ORDER BY score DESC, created_at DESC
            LIMIT $3
        "#)
        .bind(user_id)
        .bind(&tsquery)
        .bind(limit as i64)
        .fetch_all(&self.pg_pool)
        .await?;

        self.cache
            .set(&key, &results, Some(MEMORY_TTL), WritePolicy::Persistent)
            .await;
        Ok(results)
    }

    /// Search memories by cosine similarity using pgvector
    pub async fn search_semantic(
        &self,
        user_id: &str,
        query_embedding: Vec<f32>,
        limit: usize,
        min_similarity: f32,
    ) -> Result<Vec<ScoredMemory>> {
        let embedding = Vector::from(query_embedding);

        let results: Vec<ScoredMemory> = sqlx::query_as(r#"
            SELECT m.id, m.user_id, m.content, m.metadata, m.messages, m.created_at,
                   (1 - (e.embedding <=> $1))::real AS score
            FROM memories m
            JOIN memory_embeddings e ON e.memory_id = m.id
            WHERE m.user_id = $2
              AND 1 - (e.embedding <=> $1) > $3
            ORDER BY e.embedding <=> $1
            LIMIT $4
        "#)
        .bind(&embedding)
        .bind(user_id)
        .bind(min_similarity as f64)
        .bind(limit as i64)
        .fetch_all(&self.pg_pool)
        .await?;

        Ok(results)
    }

    /// Delete a memory. `false` if it did not exist.
    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let owner: Option<(String,)> =
            sqlx::query_as("DELETE FROM memories WHERE id = $1 RETURNING user_id")
                .bind(id)
                .fetch_optional(&self.pg_pool)
                .await?;

        match owner {
            Some((user_id,)) => {
                self.cache.delete(&keys::memory(id)).await;
                self.invalidate_user(&user_id).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Delete every memory of a user, returning how many were removed
    pub async fn clear_user(&self, user_id: &str) -> Result<u64> {
        let deleted: Vec<(Uuid,)> =
            sqlx::query_as("DELETE FROM memories WHERE user_id = $1 RETURNING id")
                .bind(user_id)
                .fetch_all(&self.pg_pool)
                .await?;

        for (id,) in &deleted {
            self.cache.delete(&keys::memory(id)).await;
        }
        self.invalidate_user(user_id).await;
        Ok(deleted.len() as u64)
    }
}

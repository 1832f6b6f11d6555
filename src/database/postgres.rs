//! PostgreSQL database connection and migrations

use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use secrecy::ExposeSecret;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;

/// PostgreSQL connection pool type alias
pub type PostgresPool = PgPool;

/// Initialize the PostgreSQL connection pool
pub async fn init_pool(config: &DatabaseConfig) -> Result<PostgresPool> {
    init_pool_with_options(config, config.enable_pgvector).await
}

/// Initialize the PostgreSQL connection pool without pgvector check
/// Use this for running migrations before pgvector is installed
pub async fn init_pool_for_migrations(config: &DatabaseConfig) -> Result<PostgresPool> {
    init_pool_with_options(config, false).await
}

async fn init_pool_with_options(config: &DatabaseConfig, require_pgvector: bool) -> Result<PostgresPool> {
    info!("Initializing PostgreSQL connection pool");

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .connect(config.url.expose_secret())
        .await
        .map_err(|e| Error::StoreConnection(format!("PostgreSQL unreachable: {}", e)))?;

    verify_database(&pool, require_pgvector).await?;

    info!("PostgreSQL connection pool initialized successfully");
    Ok(pool)
}

/// Verify database connection and optionally check for the pgvector extension
pub async fn verify_database(pool: &PgPool, require_pgvector: bool) -> Result<()> {
    sqlx::query("SELECT 1").execute(pool).await?;

    if require_pgvector {
        let result: Option<(String,)> =
            sqlx::query_as("SELECT extname FROM pg_extension WHERE extname = 'vector'")
                .fetch_optional(pool)
                .await?;

        if result.is_none() {
            return Err(Error::Database(sqlx::Error::Configuration(
                "pgvector extension is not installed. Run: noor migrate".into(),
            )));
        }
    }

    Ok(())
}

/// Database migrations
pub mod migrations {
    use super::*;
    use tracing::warn;

    /// Run all migrations. `embedding_dims` sizes the memory embedding column.
    pub async fn run(pool: &PgPool, embedding_dims: usize) -> Result<()> {
        info!("Running database migrations");

        match sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(pool)
            .await
        {
            Ok(_) => info!("pgvector extension enabled"),
            Err(e) => {
                warn!("Could not create pgvector extension: {}. Semantic memory search will not work.", e);
                warn!("Run as superuser: CREATE EXTENSION vector;");
            }
        }

        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS users (
                id UUID PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL UNIQUE,
                display_name TEXT,
                preferences JSONB NOT NULL DEFAULT '{}',
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
        "#)
        .execute(pool)
        .await?;

        // Quran verses, tafseer entries and scientific miracles share one table keyed by kind
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS corpus_documents (
                kind TEXT NOT NULL,
                id TEXT NOT NULL,
                source TEXT,
                title TEXT,
                text TEXT NOT NULL,
                surah INTEGER,
                ayah INTEGER,
                metadata JSONB NOT NULL DEFAULT '{}',
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                search_vector TSVECTOR GENERATED ALWAYS AS (
                    setweight(to_tsvector('simple', COALESCE(title, '')), 'A') ||
                    setweight(to_tsvector('simple', text), 'B')
                ) STORED,
                PRIMARY KEY (kind, id)
            )
        "#)
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_corpus_search_vector ON corpus_documents USING GIN(search_vector)")
            .execute(pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_corpus_location ON corpus_documents(kind, surah, ayah)")
            .execute(pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_corpus_source ON corpus_documents(kind, source)")
            .execute(pool)
            .await?;

        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS memories (
                id UUID PRIMARY KEY,
                user_id TEXT NOT NULL,
                content TEXT NOT NULL,
                metadata JSONB NOT NULL DEFAULT '{}',
                messages JSONB,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                search_vector TSVECTOR GENERATED ALWAYS AS (
                    to_tsvector('simple', content)
                ) STORED
            )
        "#)
        .execute(pool)
        .await?;

        // tables created before messages were stored
        sqlx::query("ALTER TABLE memories ADD COLUMN IF NOT EXISTS messages JSONB")
            .execute(pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_memories_user_time ON memories(user_id, created_at DESC)")
            .execute(pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_memories_search_vector ON memories USING GIN(search_vector)")
            .execute(pool)
            .await?;

        // Needs pgvector; skipped with a warning when the extension is missing
        let embeddings_table = format!(
            r#"
            CREATE TABLE IF NOT EXISTS memory_embeddings (
                memory_id UUID PRIMARY KEY REFERENCES memories(id) ON DELETE CASCADE,
                model TEXT NOT NULL,
                embedding vector({}) NOT NULL
            )
            "#,
            embedding_dims
        );

        match sqlx::query(&embeddings_table).execute(pool).await {
            Ok(_) => {
                sqlx::query(r#"
                    CREATE INDEX IF NOT EXISTS idx_memory_embeddings_hnsw ON memory_embeddings
                    USING hnsw (embedding vector_cosine_ops)
                "#)
                .execute(pool)
                .await
                .ok(); // older pgvector releases lack hnsw
            }
            Err(e) => warn!("Skipping memory_embeddings table: {}", e),
        }

        info!("Database migrations completed");
        Ok(())
    }
}

/// Build a `to_tsquery` expression matching every word of `query`.
/// Returns `None` when the query has no searchable words.
pub fn to_tsquery_terms(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split_whitespace()
        .map(|w| {
            w.chars()
                .filter(|c| c.is_alphanumeric() || *c == '_')
                .collect::<String>()
        })
        .filter(|w| !w.is_empty())
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" & "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tsquery_terms() {
        assert_eq!(to_tsquery_terms("الصلاة  الزكاة").as_deref(), Some("الصلاة & الزكاة"));
        assert_eq!(to_tsquery_terms("fasting's & (rules)").as_deref(), Some("fastings & rules"));
        assert_eq!(to_tsquery_terms("  !! "), None);
    }

    #[tokio::test]
    #[ignore = "needs DATABASE_URL"]
    async fn test_migrations_are_idempotent() {
        let url = std::env::var("DATABASE_URL").unwrap();
        let pool = PgPoolOptions::new().connect(&url).await.unwrap();
        migrations::run(&pool, 768).await.unwrap();
        migrations::run(&pool, 768).await.unwrap();
        verify_database(&pool, false).await.unwrap();
    }
}

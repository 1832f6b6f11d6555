//! Database module - PostgreSQL + pgvector
//!
//! Provides storage for:
//! - Users, looked up by id, username or email
//! - Quran verses, tafseer and scientific miracles with tsvector full-text search
//! - Conversation memories with full-text and pgvector semantic search
//!
//! Every read goes through the cache first; every write invalidates the
//! cached reads it could have changed.

mod corpus;
mod memory;
mod postgres;
mod users;

pub use corpus::{CorpusKind, CorpusRecord, CorpusStore, RankedRecord};
pub use memory::{Memory, MemoryEmbedding, MemoryMessage, MemoryStore, ScoredMemory};
pub use postgres::{
    init_pool, init_pool_for_migrations, migrations, to_tsquery_terms, verify_database,
    PostgresPool,
};
pub use users::{User, UserLookup, UserStore};

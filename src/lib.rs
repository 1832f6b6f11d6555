//! # Noor
//!
//! Retrieval core for Islamic text corpora: Quran, tafseer, hadith, fiqh and
//! related collections.
//!
//! ## Features
//!
//! - **Embeddings:** local ONNX models via fastembed, or any OpenAI-compatible endpoint
//! - **Two-tier cache:** bounded in-process tier in front of Redis
//! - **Vector search:** Qdrant collections with batched uploads and payload filters
//! - **Full-text search:** PostgreSQL tsvector tables with cache invalidation on write
//! - **Orchestration:** a per-query state machine that tolerates failing collections

pub mod cache;
pub mod config;
pub mod core;
pub mod corpus;
pub mod database;
pub mod embedding;
pub mod error;
pub mod retrieval;
pub mod telemetry;
pub mod vector;

pub use config::Config;
pub use error::{Error, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const NAME: &str = env!("CARGO_PKG_NAME");

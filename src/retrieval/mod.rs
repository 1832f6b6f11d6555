//! Retrieval orchestration
//!
//! - orchestrator.rs: the per-query state machine over vector collections
//! - memory.rs: hybrid semantic and full-text retrieval over user memories
//! - rank.rs: score normalization and merging

mod memory;
mod orchestrator;
pub mod rank;

pub use memory::{format_memories, MemoryRetriever};
pub use orchestrator::{
    RetrievalOutcome, RetrievalQuery, RetrievalState, Retriever, SourceFailure,
};

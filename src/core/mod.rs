//! Core module - Fundamental traits and types
//!
//! - Clock abstraction for TTL decisions
//! - Typed payloads and structured filters
//! - Storage traits for the vector index and the persistent cache tier
//! - The embedding provider trait

pub mod clock;
pub mod filter;
pub mod payload;
pub mod provider;
pub mod storage;
pub mod types;

pub use clock::{system_clock, Clock, ManualClock, SystemClock};
pub use filter::{Condition, MatchValue, RangeBounds, SearchFilter};
pub use payload::{payload_from_json, payload_to_json, Payload, PayloadValue};
pub use provider::EmbeddingProvider;
pub use storage::{KeyValueStore, VectorBackend};
pub use types::*;

//! Vector store integration
//!
//! - qdrant.rs: Qdrant backend
//! - memory.rs: in-process backend
//! - store.rs: the client callers use

mod memory;
mod qdrant;
mod store;

pub use memory::{score, InMemoryVectorBackend};
pub use qdrant::{to_qdrant_filter, QdrantBackend};
pub use store::{
    default_collection_spec, BatchFailure, CollectionReport, UploadReport, VectorStore,
    DEFAULT_COLLECTIONS,
};

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{VectorBackendType, VectorStoreConfig};
use crate::core::{system_clock, VectorBackend};
use crate::error::Result;

/// Build a vector store for the configured backend. Qdrant is probed once;
/// an unreachable service is logged and left to fail per call.
pub async fn connect(config: &VectorStoreConfig) -> Result<VectorStore> {
    let backend: Arc<dyn VectorBackend> = match config.backend {
        VectorBackendType::Qdrant => {
            let backend = QdrantBackend::new(config)?;
            match backend.health_check().await {
                Ok(()) => info!("Connected to Qdrant at {}", config.url),
                Err(e) => warn!("Qdrant at {} is not responding: {}", config.url, e),
            }
            Arc::new(backend)
        }
        VectorBackendType::Memory => {
            warn!("Using in-process vector backend; indexed data is not persisted");
            Arc::new(InMemoryVectorBackend::new())
        }
    };

    Ok(VectorStore::new(backend, config.clone(), system_clock()))
}

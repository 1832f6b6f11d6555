//! Query orchestration state machine
//!
//! RECEIVED -> CACHE_CHECK -> CACHE_HIT -> DONE
//!                         -> CACHE_MISS -> EMBED -> VECTOR_SEARCH -> MERGE_RANK -> CACHE_WRITE -> DONE
//!
//! Any step may end in FAILED: the query embedding could not be computed, or
//! every collection search failed. A single failing collection only makes
//! the result partial.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::rank;
use crate::cache::{keys, CacheLayer, WritePolicy};
use crate::config::RetrievalConfig;
use crate::core::{
    EmbeddingProvider, IndexItem, Payload, Point, PointId, SearchFilter, SearchRequest,
    SearchResult,
};
use crate::corpus::CorpusLoader;
use crate::error::{Error, ErrorKind, Result};
use crate::vector::{UploadReport, VectorStore};

/// A retrieval request
#[derive(Debug, Clone, Default)]
pub struct RetrievalQuery {
    pub text: String,
    /// Collections to search; empty means the configured defaults
    pub collections: Vec<String>,
    pub filter: Option<SearchFilter>,
    pub limit: Option<usize>,
}

impl RetrievalQuery {
    pub fn new(text: impl Into<String>) -> Self {
        RetrievalQuery {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn in_collections<I, S>(mut self, collections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.collections = collections.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_filter(mut self, filter: SearchFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// States a query passes through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RetrievalState {
    Received,
    CacheCheck,
    CacheHit,
    CacheMiss,
    Embed,
    VectorSearch,
    MergeRank,
    CacheWrite,
    Done,
    Failed,
}

/// A collection whose search failed
#[derive(Debug, Clone, Serialize)]
pub struct SourceFailure {
    pub collection: String,
    pub kind: ErrorKind,
    pub error: String,
}

/// Terminal outcome of a query
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalOutcome {
    /// `Done` or `Failed`
    pub state: RetrievalState,
    pub results: Vec<SearchResult>,
    /// Every state visited, in order
    pub trace: Vec<RetrievalState>,
    pub from_cache: bool,
    pub failures: Vec<SourceFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl RetrievalOutcome {
    pub fn is_failed(&self) -> bool {
        self.state == RetrievalState::Failed
    }

    /// Completed with some collections missing
    pub fn is_partial(&self) -> bool {
        self.state == RetrievalState::Done && !self.failures.is_empty()
    }

    /// Results, or the failure as an error
    pub fn into_result(self) -> Result<Vec<SearchResult>> {
        if self.is_failed() {
            let message = self.error.unwrap_or_else(|| "retrieval failed".to_string());
            return Err(Error::StoreConnection(message));
        }
        Ok(self.results)
    }
}

/// Per-query working state
enum Step {
    Received,
    CacheCheck {
        key: String,
    },
    CacheHit {
        results: Vec<SearchResult>,
    },
    CacheMiss {
        key: String,
    },
    Embed {
        key: String,
    },
    VectorSearch {
        key: String,
        vector: Vec<f32>,
    },
    MergeRank {
        key: String,
        per_source: Vec<Vec<SearchResult>>,
        failures: Vec<SourceFailure>,
    },
    CacheWrite {
        key: String,
        results: Vec<SearchResult>,
        failures: Vec<SourceFailure>,
    },
    Done {
        results: Vec<SearchResult>,
        failures: Vec<SourceFailure>,
        from_cache: bool,
    },
    Failed {
        error: String,
        failures: Vec<SourceFailure>,
    },
}

impl Step {
    fn state(&self) -> RetrievalState {
        match self {
            Step::Received => RetrievalState::Received,
            Step::CacheCheck { .. } => RetrievalState::CacheCheck,
            Step::CacheHit { .. } => RetrievalState::CacheHit,
            Step::CacheMiss { .. } => RetrievalState::CacheMiss,
            Step::Embed { .. } => RetrievalState::Embed,
            Step::VectorSearch { .. } => RetrievalState::VectorSearch,
            Step::MergeRank { .. } => RetrievalState::MergeRank,
            Step::CacheWrite { .. } => RetrievalState::CacheWrite,
            Step::Done { .. } => RetrievalState::Done,
            Step::Failed { .. } => RetrievalState::Failed,
        }
    }
}

/// Query parameters resolved against configuration
struct Plan<'a> {
    text: &'a str,
    collections: Vec<String>,
    filter: Option<&'a SearchFilter>,
    limit: usize,
}

/// Coordinates embedding, vector search, merging and caching
pub struct Retriever {
    vectors: Arc<VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    cache: Arc<CacheLayer>,
    config: RetrievalConfig,
}

impl Retriever {
    pub fn new(
        vectors: Arc<VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        cache: Arc<CacheLayer>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            vectors,
            embedder,
            cache,
            config,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    pub fn vectors(&self) -> &Arc<VectorStore> {
        &self.vectors
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    async fn with_deadline<T, F>(&self, op: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.config.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!(
                "{} exceeded {:?}",
                op, self.config.call_timeout
            ))),
        }
    }

    /// Run a query through the state machine. Never panics or errors; the
    /// outcome records how it ended.
    pub async fn search(&self, query: &RetrievalQuery) -> RetrievalOutcome {
        let started = Instant::now();
        let collections = if query.collections.is_empty() {
            self.config.collections.clone()
        } else {
            query.collections.clone()
        };
        let plan = Plan {
            text: query.text.trim(),
            collections,
            filter: query.filter.as_ref().filter(|f| !f.is_empty()),
            limit: query.limit.unwrap_or(self.config.default_limit),
        };

        let mut trace = Vec::new();
        let mut step = Step::Received;

        loop {
            trace.push(step.state());
            step = match step {
                Step::Received => self.handle_received(&plan),
                Step::CacheCheck { key } => self.handle_cache_check(key).await,
                Step::CacheHit { results } => Step::Done {
                    results,
                    failures: Vec::new(),
                    from_cache: true,
                },
                Step::CacheMiss { key } => Step::Embed { key },
                Step::Embed { key } => self.handle_embed(&plan, key).await,
                Step::VectorSearch { key, vector } => {
                    self.handle_vector_search(&plan, key, vector).await
                }
                Step::MergeRank {
                    key,
                    per_source,
                    failures,
                } => Step::CacheWrite {
                    key,
                    results: rank::merge(per_source, self.config.normalization, plan.limit),
                    failures,
                },
                Step::CacheWrite {
                    key,
                    results,
                    failures,
                } => self.handle_cache_write(key, results, failures).await,
                Step::Done {
                    results,
                    failures,
                    from_cache,
                } => {
                    let elapsed_ms = started.elapsed().as_millis() as u64;
                    info!(
                        "Retrieved {} results for query in {}ms (cache: {}, failed sources: {})",
                        results.len(),
                        elapsed_ms,
                        from_cache,
                        failures.len()
                    );
                    return RetrievalOutcome {
                        state: RetrievalState::Done,
                        results,
                        trace,
                        from_cache,
                        failures,
                        error: None,
                        elapsed_ms,
                    };
                }
                Step::Failed { error, failures } => {
                    warn!("Retrieval failed: {}", error);
                    return RetrievalOutcome {
                        state: RetrievalState::Failed,
                        results: Vec::new(),
                        trace,
                        from_cache: false,
                        failures,
                        error: Some(error),
                        elapsed_ms: started.elapsed().as_millis() as u64,
                    };
                }
            };
        }
    }

    /// Convenience wrapper returning only the results
    pub async fn search_text(&self, text: &str, limit: usize) -> Result<Vec<SearchResult>> {
        self.search(&RetrievalQuery::new(text).with_limit(limit))
            .await
            .into_result()
    }

    fn handle_received(&self, plan: &Plan<'_>) -> Step {
        if plan.text.is_empty() || plan.limit == 0 || plan.collections.is_empty() {
            debug!("Nothing to retrieve");
            return Step::Done {
                results: Vec::new(),
                failures: Vec::new(),
                from_cache: false,
            };
        }

        Step::CacheCheck {
            key: keys::vector_search(&plan.collections, plan.limit, plan.filter, plan.text),
        }
    }

    async fn handle_cache_check(&self, key: String) -> Step {
        match self.cache.get::<Vec<SearchResult>>(&key).await {
            Some(results) => {
                debug!("Result cache hit for {}", key);
                Step::CacheHit { results }
            }
            None => Step::CacheMiss { key },
        }
    }

    async fn handle_embed(&self, plan: &Plan<'_>, key: String) -> Step {
        match self.query_embedding(plan.text).await {
            Ok(vector) => Step::VectorSearch { key, vector },
            Err(e) => Step::Failed {
                error: format!("Query embedding failed: {}", e),
                failures: Vec::new(),
            },
        }
    }

    /// Embed the query, reusing a cached embedding when there is one
    async fn query_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let key = keys::embedding(self.embedder.model_name(), text);
        if let Some(vector) = self.cache.get::<Vec<f32>>(&key).await {
            return Ok(vector);
        }

        let vector = self
            .with_deadline("embed", self.embedder.embed(text))
            .await?;

        self.cache
            .set(&key, &vector, Some(self.config.embedding_ttl), WritePolicy::Hot)
            .await;
        Ok(vector)
    }

    async fn handle_vector_search(&self, plan: &Plan<'_>, key: String, vector: Vec<f32>) -> Step {
        let mut request = SearchRequest::new(vector, plan.limit);
        request.filter = plan.filter.cloned();
        let request = &request;

        let outcomes: Vec<(String, Result<Vec<SearchResult>>)> =
            stream::iter(plan.collections.iter().cloned())
                .map(|collection| async move {
                    let hits = self
                        .with_deadline("search", self.vectors.try_search(&collection, request))
                        .await
                        .map(|points| {
                            points
                                .into_iter()
                                .map(|p| SearchResult::from_scored(&collection, p))
                                .collect()
                        });
                    (collection, hits)
                })
                .buffered(self.config.workers.max(1))
                .collect()
                .await;

        let mut per_source = Vec::new();
        let mut failures = Vec::new();
        for (collection, outcome) in outcomes {
            match outcome {
                Ok(results) => per_source.push(results),
                Err(e) => {
                    warn!("Search in {} failed: {}", collection, e);
                    failures.push(SourceFailure {
                        collection,
                        kind: e.kind(),
                        error: e.to_string(),
                    });
                }
            }
        }

        if per_source.is_empty() {
            return Step::Failed {
                error: format!("All {} collection searches failed", failures.len()),
                failures,
            };
        }

        Step::MergeRank {
            key,
            per_source,
            failures,
        }
    }

    async fn handle_cache_write(
        &self,
        key: String,
        results: Vec<SearchResult>,
        failures: Vec<SourceFailure>,
    ) -> Step {
        if failures.is_empty() {
            self.cache
                .set(&key, &results, Some(self.config.result_ttl), WritePolicy::Persistent)
                .await;
        } else {
            debug!("Partial result for {} not cached", key);
        }
        Step::Done {
            results,
            failures,
            from_cache: false,
        }
    }

    async fn invalidate(&self, collection: &str) {
        let cleared = self
            .cache
            .clear(&keys::vector_search_pattern(collection))
            .await;
        debug!("Invalidated {} cached searches touching {}", cleared, collection);
    }

    /// Embed and store one text, returning its generated id
    pub async fn index(&self, collection: &str, text: &str, metadata: Payload) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let item = IndexItem::new(id.clone(), text).with_metadata(metadata);

        let vector = self
            .with_deadline("embed", self.embedder.embed(text))
            .await?;

        self.vectors
            .upload_points(
                collection,
                vec![Point {
                    id: PointId::Text(id.clone()),
                    vector,
                    payload: item.to_payload(),
                }],
                1,
            )
            .await?;

        self.invalidate(collection).await;
        Ok(id)
    }

    /// Embed and store many items, batch by batch
    pub async fn index_batch(
        &self,
        collection: &str,
        items: Vec<IndexItem>,
        batch_size: usize,
    ) -> Result<UploadReport> {
        if batch_size == 0 {
            return Err(Error::Validation("batch_size must be at least 1".into()));
        }
        if let Some(empty) = items.iter().find(|i| i.text.trim().is_empty()) {
            return Err(Error::Validation(format!("Item {} has no text", empty.id)));
        }

        let mut points = Vec::with_capacity(items.len());
        for chunk in items.chunks(batch_size) {
            let texts: Vec<String> = chunk.iter().map(|i| i.text.clone()).collect();
            let vectors = self
                .with_deadline("embed_batch", self.embedder.embed_batch(texts))
                .await?;

            if vectors.len() != chunk.len() {
                return Err(Error::Embedding(format!(
                    "Requested {} embeddings, got {}",
                    chunk.len(),
                    vectors.len()
                )));
            }

            points.extend(chunk.iter().zip(vectors).map(|(item, vector)| Point {
                id: PointId::Text(item.id.clone()),
                vector,
                payload: item.to_payload(),
            }));
            debug!("Embedded {}/{} items for {}", points.len(), items.len(), collection);
        }

        let report = self
            .vectors
            .upload_points(collection, points, batch_size)
            .await;
        // earlier batches may have landed even when a later one failed
        self.invalidate(collection).await;
        report
    }

    /// Load a corpus and index it into `collection`
    pub async fn index_corpus(
        &self,
        collection: &str,
        loader: &dyn CorpusLoader,
        batch_size: usize,
    ) -> Result<UploadReport> {
        let items = loader.load().await?;
        info!(
            "Indexing {} items from {} into {}",
            items.len(),
            loader.name(),
            collection
        );
        self.index_batch(collection, items, batch_size).await
    }

    /// Deadline applied to each embedding and search call
    pub fn call_timeout(&self) -> Duration {
        self.config.call_timeout
    }
}

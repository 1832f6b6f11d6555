//! Vector store client
//!
//! Wraps a [`VectorBackend`] with input validation, per-call timeouts,
//! retry of transient failures, batched uploads and a short-lived cache of
//! the collection listing.
//!
//! Search scores are similarities for every metric: euclidean distances `d`
//! come back as `1 / (1 + d)`, so higher always ranks first.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use backoff::ExponentialBackoffBuilder;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::cache::{keys, CacheLayer};
use crate::config::VectorStoreConfig;
use crate::core::{
    CollectionInfo, CollectionSpec, Clock, Distance, Payload, PayloadFieldType,
    Point, PointId, ScoredPoint, SearchFilter, SearchRequest, VectorBackend,
};
use crate::error::{Error, ErrorKind, Result};

/// Collections created by `ensure_default_collections`
pub const DEFAULT_COLLECTIONS: &[&str] = &[
    "quran",
    "tafseer",
    "hadith",
    "fiqh",
    "aqeedah",
    "seera",
    "scientific_miracles",
];

/// Spec of a default collection, with the payload indexes its loaders rely on
pub fn default_collection_spec(name: &str, dimension: u64) -> CollectionSpec {
    let spec = CollectionSpec::new(name, dimension, Distance::Cosine);
    match name {
        "quran" => spec
            .with_index("surah", PayloadFieldType::Integer)
            .with_index("ayah", PayloadFieldType::Integer),
        "tafseer" => spec
            .with_index("tafseer_name", PayloadFieldType::Keyword)
            .with_index("surah", PayloadFieldType::Integer),
        "hadith" => spec
            .with_index("collection", PayloadFieldType::Keyword)
            .with_index("number", PayloadFieldType::Integer),
        _ => spec.with_index("source", PayloadFieldType::Keyword),
    }
}

/// One batch that did not make it into the store
#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    pub index: usize,
    pub points: usize,
    pub error: String,
}

/// Outcome of a batched upload
#[derive(Debug, Clone, Default, Serialize)]
pub struct UploadReport {
    pub total_points: usize,
    pub batches: usize,
    pub committed_batches: usize,
    pub committed_points: usize,
    pub failed_batches: Vec<BatchFailure>,
}

impl UploadReport {
    pub fn is_complete(&self) -> bool {
        self.failed_batches.is_empty() && self.committed_points == self.total_points
    }
}

/// Collection info, or the reason it could not be fetched
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum CollectionReport {
    Info(CollectionInfo),
    Error {
        name: String,
        error: String,
        kind: ErrorKind,
    },
}

impl CollectionReport {
    pub fn is_error(&self) -> bool {
        matches!(self, CollectionReport::Error { .. })
    }
}

struct CollectionListing {
    names: HashSet<String>,
    fetched_at: DateTime<Utc>,
}

/// Client for the vector index service
pub struct VectorStore {
    backend: Arc<dyn VectorBackend>,
    clock: Arc<dyn Clock>,
    config: VectorStoreConfig,
    listing: RwLock<Option<CollectionListing>>,
    distances: RwLock<HashMap<String, Distance>>,
    cache: Option<Arc<CacheLayer>>,
}

impl VectorStore {
    pub fn new(
        backend: Arc<dyn VectorBackend>,
        config: VectorStoreConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            backend,
            clock,
            config,
            listing: RwLock::new(None),
            distances: RwLock::new(HashMap::new()),
            cache: None,
        }
    }

    /// Cache holding search results for collections of this store, cleared
    /// when a collection is deleted
    pub fn with_cache(mut self, cache: Arc<CacheLayer>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn backend(&self) -> &Arc<dyn VectorBackend> {
        &self.backend
    }

    pub fn config(&self) -> &VectorStoreConfig {
        &self.config
    }

    /// Run one backend call under the configured timeout
    async fn call<T, F>(&self, op: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.config.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!(
                "{} on {} exceeded {:?}",
                op,
                self.backend.name(),
                self.config.timeout
            ))),
        }
    }

    /// Run a backend call, retrying transient failures with exponential
    /// backoff until `retry_max_elapsed` has passed
    async fn retrying<T, F, Fut>(&self, op: &str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if self.config.retry_max_elapsed.is_zero() {
            return self.call(op, f()).await;
        }

        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(200))
            .with_max_elapsed_time(Some(self.config.retry_max_elapsed))
            .build();

        backoff::future::retry(policy, || {
            let fut = f();
            async move {
                self.call(op, fut).await.map_err(|e| {
                    if e.is_retryable() {
                        warn!("{} failed, retrying: {}", op, e);
                        backoff::Error::transient(e)
                    } else {
                        backoff::Error::permanent(e)
                    }
                })
            }
        })
        .await
    }

    async fn remember(&self, name: &str) {
        if let Some(listing) = self.listing.write().await.as_mut() {
            listing.names.insert(name.to_string());
        }
    }

    async fn forget(&self, name: &str) {
        if let Some(listing) = self.listing.write().await.as_mut() {
            listing.names.remove(name);
        }
        self.distances.write().await.remove(name);
    }

    /// Metric of a collection, looked up once and then kept
    async fn distance_of(&self, collection: &str) -> Result<Distance> {
        if let Some(distance) = self.distances.read().await.get(collection) {
            return Ok(*distance);
        }
        let info = self
            .call("collection_info", self.backend.collection_info(collection))
            .await?
            .ok_or_else(|| Error::NotFound(format!("Collection {} does not exist", collection)))?;
        self.distances
            .write()
            .await
            .insert(collection.to_string(), info.distance);
        Ok(info.distance)
    }

    /// Create a collection unless it already exists. Returns whether it was
    /// created by this call.
    pub async fn create_collection(&self, spec: &CollectionSpec) -> Result<bool> {
        if spec.name.trim().is_empty() {
            return Err(Error::Validation("Collection name must not be empty".into()));
        }
        if spec.dimension == 0 {
            return Err(Error::Validation(format!(
                "Collection {} needs a positive vector dimension",
                spec.name
            )));
        }

        if self
            .retrying("collection_exists", || self.backend.collection_exists(&spec.name))
            .await?
        {
            debug!("Collection {} already exists", spec.name);
            self.remember(&spec.name).await;
            return Ok(false);
        }

        match self
            .retrying("create_collection", || self.backend.create_collection(spec))
            .await
        {
            Ok(()) => {
                info!(
                    "Created collection {} (dim {}, {})",
                    spec.name, spec.dimension, spec.distance
                );
                self.remember(&spec.name).await;
                self.distances
                    .write()
                    .await
                    .insert(spec.name.clone(), spec.distance);
                Ok(true)
            }
            Err(Error::AlreadyExists(_)) => {
                // lost a race with a concurrent creator
                debug!("Collection {} created concurrently", spec.name);
                self.remember(&spec.name).await;
                Ok(false)
            }
            Err(e) => {
                error!("Failed to create collection {}: {}", spec.name, e);
                Err(e)
            }
        }
    }

    /// Names of existing collections, served from a short-lived cache unless
    /// `force_refresh`. Returns an empty set when the service is unreachable.
    pub async fn list_collections(&self, force_refresh: bool) -> HashSet<String> {
        if !force_refresh {
            let listing = self.listing.read().await;
            if let Some(listing) = listing.as_ref() {
                let age = self.clock.now() - listing.fetched_at;
                if age.to_std().map(|a| a <= self.config.list_cache_ttl).unwrap_or(true) {
                    return listing.names.clone();
                }
            }
        }

        match self
            .retrying("list_collections", || self.backend.list_collections())
            .await
        {
            Ok(names) => {
                let names: HashSet<String> = names.into_iter().collect();
                *self.listing.write().await = Some(CollectionListing {
                    names: names.clone(),
                    fetched_at: self.clock.now(),
                });
                names
            }
            Err(e) => {
                error!("Failed to list collections: {}", e);
                HashSet::new()
            }
        }
    }

    /// Delete a collection. `false` if it did not exist.
    pub async fn delete_collection(&self, name: &str) -> Result<bool> {
        let deleted = self
            .call("delete_collection", self.backend.delete_collection(name))
            .await?;
        self.forget(name).await;
        if let Some(cache) = &self.cache {
            let cleared = cache.clear(&keys::vector_search_pattern(name)).await;
            debug!("Dropped {} cached searches for {}", cleared, name);
        }
        if deleted {
            info!("Deleted collection {}", name);
        } else {
            debug!("Collection {} did not exist", name);
        }
        Ok(deleted)
    }

    /// Collection status, or a structured error describing why it is missing
    pub async fn get_collection_info(&self, name: &str) -> CollectionReport {
        let result = self
            .call("collection_info", self.backend.collection_info(name))
            .await
            .and_then(|info| {
                info.ok_or_else(|| Error::NotFound(format!("Collection {} does not exist", name)))
            });

        match result {
            Ok(info) => CollectionReport::Info(info),
            Err(e) => {
                warn!("Collection info for {} unavailable: {}", name, e);
                CollectionReport::Error {
                    name: name.to_string(),
                    kind: e.kind(),
                    error: e.to_string(),
                }
            }
        }
    }

    /// Pair vectors with payloads and ids. Ids default to positions.
    fn build_points(
        vectors: Vec<Vec<f32>>,
        metadata: Vec<Payload>,
        ids: Option<Vec<PointId>>,
    ) -> Result<Vec<Point>> {
        if vectors.len() != metadata.len() {
            return Err(Error::Validation(format!(
                "Got {} vectors but {} metadata entries",
                vectors.len(),
                metadata.len()
            )));
        }
        if let Some(ids) = &ids {
            if ids.len() != vectors.len() {
                return Err(Error::Validation(format!(
                    "Got {} vectors but {} ids",
                    vectors.len(),
                    ids.len()
                )));
            }
            let distinct: HashSet<&PointId> = ids.iter().collect();
            if distinct.len() != ids.len() {
                return Err(Error::Validation("Point ids must be unique".into()));
            }
        }
        if let Some(dim) = vectors.first().map(Vec::len) {
            if dim == 0 {
                return Err(Error::Validation("Vectors must not be empty".into()));
            }
            if let Some(bad) = vectors.iter().position(|v| v.len() != dim) {
                return Err(Error::Validation(format!(
                    "Vector {} has dimension {}, expected {}",
                    bad,
                    vectors[bad].len(),
                    dim
                )));
            }
        }

        let ids = ids.unwrap_or_else(|| (0..vectors.len() as u64).map(PointId::Num).collect());

        Ok(vectors
            .into_iter()
            .zip(metadata)
            .zip(ids)
            .map(|((vector, payload), id)| Point {
                id,
                vector,
                payload,
            })
            .collect())
    }

    fn check_batch_size(batch_size: usize) -> Result<usize> {
        if batch_size == 0 {
            return Err(Error::Validation("batch_size must be at least 1".into()));
        }
        Ok(batch_size)
    }

    /// Upload vectors with their payloads in batches. Inputs are validated
    /// before any backend call; a failing batch stops the upload and earlier
    /// batches stay committed.
    pub async fn upload_vectors(
        &self,
        collection: &str,
        vectors: Vec<Vec<f32>>,
        metadata: Vec<Payload>,
        ids: Option<Vec<PointId>>,
        batch_size: usize,
    ) -> Result<UploadReport> {
        Self::check_batch_size(batch_size)?;
        let points = Self::build_points(vectors, metadata, ids)?;
        self.upload_points(collection, points, batch_size).await
    }

    /// Upload prepared points sequentially in batches
    pub async fn upload_points(
        &self,
        collection: &str,
        points: Vec<Point>,
        batch_size: usize,
    ) -> Result<UploadReport> {
        let batch_size = Self::check_batch_size(batch_size)?;
        let batches: Vec<Vec<Point>> = chunk(points, batch_size);

        let mut report = UploadReport {
            total_points: batches.iter().map(Vec::len).sum(),
            batches: batches.len(),
            ..Default::default()
        };

        for (index, batch) in batches.into_iter().enumerate() {
            let count = batch.len();
            match self.upsert_batch(collection, batch).await {
                Ok(()) => {
                    report.committed_batches += 1;
                    report.committed_points += count;
                    info!(
                        "Uploaded batch {}/{} ({} points) to {}",
                        index + 1,
                        report.batches,
                        count,
                        collection
                    );
                }
                Err(e) => {
                    error!(
                        "Upload to {} failed at batch {}/{} after {} points: {}",
                        collection,
                        index + 1,
                        report.batches,
                        report.committed_points,
                        e
                    );
                    return Err(e);
                }
            }
        }

        Ok(report)
    }

    /// Upload batches with up to `workers` in flight. Failed batches are
    /// reported instead of aborting the rest.
    pub async fn upload_vectors_concurrent(
        &self,
        collection: &str,
        vectors: Vec<Vec<f32>>,
        metadata: Vec<Payload>,
        ids: Option<Vec<PointId>>,
        batch_size: usize,
        workers: usize,
    ) -> Result<UploadReport> {
        let batch_size = Self::check_batch_size(batch_size)?;
        let points = Self::build_points(vectors, metadata, ids)?;
        let workers = if workers == 0 {
            self.config.upload_workers.max(1)
        } else {
            workers
        };

        let batches = chunk(points, batch_size);
        let mut report = UploadReport {
            total_points: batches.iter().map(Vec::len).sum(),
            batches: batches.len(),
            ..Default::default()
        };

        let outcomes: Vec<(usize, usize, Result<()>)> = stream::iter(batches.into_iter().enumerate())
            .map(|(index, batch)| async move {
                let count = batch.len();
                (index, count, self.upsert_batch(collection, batch).await)
            })
            .buffer_unordered(workers)
            .collect()
            .await;

        for (index, count, outcome) in outcomes {
            match outcome {
                Ok(()) => {
                    report.committed_batches += 1;
                    report.committed_points += count;
                }
                Err(e) => {
                    error!("Batch {} to {} failed: {}", index + 1, collection, e);
                    report.failed_batches.push(BatchFailure {
                        index,
                        points: count,
                        error: e.to_string(),
                    });
                }
            }
        }
        report.failed_batches.sort_by_key(|f| f.index);

        info!(
            "Uploaded {}/{} points to {} with {} workers",
            report.committed_points, report.total_points, collection, workers
        );
        Ok(report)
    }

    async fn upsert_batch(&self, collection: &str, batch: Vec<Point>) -> Result<()> {
        self.retrying("upsert", || self.backend.upsert(collection, batch.clone()))
            .await
    }

    /// Similarity search that surfaces errors
    pub async fn try_search(
        &self,
        collection: &str,
        request: &SearchRequest,
    ) -> Result<Vec<ScoredPoint>> {
        if request.limit == 0 {
            return Ok(Vec::new());
        }
        if request.vector.is_empty() {
            return Err(Error::Validation("Query vector must not be empty".into()));
        }
        let distance = self.distance_of(collection).await?;
        let mut hits = self
            .call("search", self.backend.search(collection, request))
            .await?;
        if distance == Distance::Euclid {
            for hit in &mut hits {
                hit.score = 1.0 / (1.0 + hit.score);
            }
        }
        Ok(hits)
    }

    /// Similarity search. Failures are logged and yield no results.
    pub async fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: usize,
        filter: Option<SearchFilter>,
        with_payload: bool,
        with_vectors: bool,
    ) -> Vec<ScoredPoint> {
        let mut request = SearchRequest::new(vector, limit)
            .with_payload(with_payload)
            .with_vectors(with_vectors);
        request.filter = filter;

        match self.try_search(collection, &request).await {
            Ok(hits) => hits,
            Err(e) => {
                error!("Search in {} failed: {}", collection, e);
                Vec::new()
            }
        }
    }

    /// Create the standard corpus collections. Returns per-collection success.
    pub async fn ensure_default_collections(&self, dimension: u64) -> BTreeMap<String, bool> {
        let mut results = BTreeMap::new();
        for name in DEFAULT_COLLECTIONS {
            let ok = match self
                .create_collection(&default_collection_spec(name, dimension))
                .await
            {
                Ok(_) => true,
                Err(e) => {
                    error!("Could not ensure collection {}: {}", name, e);
                    false
                }
            };
            results.insert(name.to_string(), ok);
        }
        results
    }

    pub async fn health_check(&self) -> Result<()> {
        self.call("health_check", self.backend.health_check()).await
    }
}

fn chunk(points: Vec<Point>, size: usize) -> Vec<Vec<Point>> {
    let mut batches = Vec::with_capacity(points.len().div_ceil(size.max(1)));
    let mut iter = points.into_iter().peekable();
    while iter.peek().is_some() {
        batches.push(iter.by_ref().take(size.max(1)).collect());
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ManualClock;
    use crate::payload;
    use crate::vector::InMemoryVectorBackend;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_config() -> VectorStoreConfig {
        VectorStoreConfig {
            retry_max_elapsed: Duration::ZERO,
            ..Default::default()
        }
    }

    fn store_with(backend: Arc<InMemoryVectorBackend>) -> (VectorStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let store = VectorStore::new(backend, test_config(), clock.clone());
        (store, clock)
    }

    fn unit(i: usize, dim: usize) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[i % dim] = 1.0;
        v
    }

    #[tokio::test]
    async fn test_create_collection_is_idempotent() {
        let backend = Arc::new(InMemoryVectorBackend::new());
        let (store, _) = store_with(backend);
        let spec = CollectionSpec::new("quran_verses", 768, Distance::Cosine);

        assert!(store.create_collection(&spec).await.unwrap());
        assert!(!store.create_collection(&spec).await.unwrap());
        assert!(store.list_collections(false).await.contains("quran_verses"));
    }

    #[tokio::test]
    async fn test_zero_dimension_rejected() {
        let backend = Arc::new(InMemoryVectorBackend::new());
        let (store, _) = store_with(backend.clone());
        let spec = CollectionSpec::new("x", 0, Distance::Cosine);
        assert!(matches!(
            store.create_collection(&spec).await,
            Err(Error::Validation(_))
        ));
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_upload_in_batches_then_search() {
        let backend = Arc::new(InMemoryVectorBackend::new());
        let (store, _) = store_with(backend.clone());
        store
            .create_collection(&CollectionSpec::new("quran_verses", 768, Distance::Cosine))
            .await
            .unwrap();

        let vectors: Vec<Vec<f32>> = (0..250).map(|i| unit(i, 768)).collect();
        let metadata: Vec<Payload> = (0..250)
            .map(|i| payload! { "text" => format!("verse {}", i), "n" => i as i64 })
            .collect();

        let report = store
            .upload_vectors("quran_verses", vectors, metadata, None, 100)
            .await
            .unwrap();
        assert_eq!(report.batches, 3);
        assert_eq!(report.committed_points, 250);
        assert!(report.is_complete());
        assert_eq!(backend.point_count("quran_verses"), 250);

        let hits = store
            .search("quran_verses", unit(5, 768), 5, None, true, false)
            .await;
        assert_eq!(hits.len(), 5);
        assert_eq!(hits[0].id, PointId::Num(5));
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn test_mismatched_lengths_make_no_calls() {
        let backend = Arc::new(InMemoryVectorBackend::new());
        let (store, _) = store_with(backend.clone());

        let result = store
            .upload_vectors("c", vec![vec![1.0]; 3], vec![Payload::new(); 2], None, 10)
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));

        let result = store
            .upload_vectors(
                "c",
                vec![vec![1.0]; 2],
                vec![Payload::new(); 2],
                Some(vec![PointId::Num(1), PointId::Num(1)]),
                10,
            )
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));

        let result = store
            .upload_vectors("c", vec![vec![1.0]; 2], vec![Payload::new(); 2], None, 0)
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_search_failures_yield_empty() {
        let backend = Arc::new(InMemoryVectorBackend::new());
        let (store, _) = store_with(backend);

        let hits = store.search("missing", vec![1.0], 3, None, true, false).await;
        assert!(hits.is_empty());

        let err = store
            .try_search("missing", &SearchRequest::new(vec![1.0], 3))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let none = store
            .try_search("missing", &SearchRequest::new(vec![1.0], 0))
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_listing_cache_respects_ttl() {
        let backend = Arc::new(InMemoryVectorBackend::new());
        let (store, clock) = store_with(backend.clone());

        assert!(store.list_collections(false).await.is_empty());
        backend
            .create_collection(&CollectionSpec::new("tafseer", 4, Distance::Cosine))
            .await
            .unwrap();

        // stale listing still served inside the ttl
        assert!(store.list_collections(false).await.is_empty());
        assert!(store.list_collections(true).await.contains("tafseer"));

        backend.delete_collection("tafseer").await.unwrap();
        clock.advance(Duration::from_secs(301));
        assert!(store.list_collections(false).await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_and_info() {
        let backend = Arc::new(InMemoryVectorBackend::new());
        let (store, _) = store_with(backend);
        store
            .create_collection(&CollectionSpec::new("hadith", 8, Distance::Cosine))
            .await
            .unwrap();

        match store.get_collection_info("hadith").await {
            CollectionReport::Info(info) => assert_eq!(info.vector_size, 8),
            other => panic!("unexpected {:?}", other),
        }

        assert!(store.delete_collection("hadith").await.unwrap());
        assert!(!store.delete_collection("hadith").await.unwrap());

        let report = store.get_collection_info("hadith").await;
        assert!(report.is_error());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["kind"], "not_found");
        assert_eq!(json["name"], "hadith");
    }

    #[tokio::test]
    async fn test_ensure_default_collections() {
        let backend = Arc::new(InMemoryVectorBackend::new());
        let (store, _) = store_with(backend);
        let results = store.ensure_default_collections(384).await;
        assert_eq!(results.len(), DEFAULT_COLLECTIONS.len());
        assert!(results.values().all(|ok| *ok));

        // second run finds them all existing
        let again = store.ensure_default_collections(384).await;
        assert!(again.values().all(|ok| *ok));
    }

    /// Backend that fails every other upsert
    struct FlakyUpserts {
        inner: InMemoryVectorBackend,
        upserts: AtomicUsize,
    }

    #[async_trait]
    impl VectorBackend for FlakyUpserts {
        fn name(&self) -> &'static str {
            "flaky"
        }
        async fn collection_exists(&self, name: &str) -> Result<bool> {
            self.inner.collection_exists(name).await
        }
        async fn create_collection(&self, spec: &CollectionSpec) -> Result<()> {
            self.inner.create_collection(spec).await
        }
        async fn list_collections(&self) -> Result<Vec<String>> {
            self.inner.list_collections().await
        }
        async fn delete_collection(&self, name: &str) -> Result<bool> {
            self.inner.delete_collection(name).await
        }
        async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>> {
            self.inner.collection_info(name).await
        }
        async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<()> {
            if self.upserts.fetch_add(1, Ordering::SeqCst) % 2 == 1 {
                return Err(Error::StoreConnection("connection reset".into()));
            }
            self.inner.upsert(collection, points).await
        }
        async fn search(
            &self,
            collection: &str,
            request: &SearchRequest,
        ) -> Result<Vec<ScoredPoint>> {
            self.inner.search(collection, request).await
        }
        async fn health_check(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failed_batch_keeps_earlier_batches() {
        let backend = Arc::new(FlakyUpserts {
            inner: InMemoryVectorBackend::new(),
            upserts: AtomicUsize::new(0),
        });
        let store = VectorStore::new(
            backend.clone(),
            test_config(),
            Arc::new(ManualClock::default()),
        );
        store
            .create_collection(&CollectionSpec::new("fiqh", 2, Distance::Dot))
            .await
            .unwrap();

        let result = store
            .upload_vectors("fiqh", vec![vec![1.0, 0.0]; 5], vec![Payload::new(); 5], None, 2)
            .await;
        assert!(matches!(result, Err(Error::StoreConnection(_))));
        assert_eq!(backend.inner.point_count("fiqh"), 2);
    }

    #[tokio::test]
    async fn test_concurrent_upload_reports_failed_batches() {
        let backend = Arc::new(FlakyUpserts {
            inner: InMemoryVectorBackend::new(),
            upserts: AtomicUsize::new(0),
        });
        let store = VectorStore::new(
            backend.clone(),
            test_config(),
            Arc::new(ManualClock::default()),
        );
        store
            .create_collection(&CollectionSpec::new("seera", 2, Distance::Dot))
            .await
            .unwrap();

        let ids: Vec<PointId> = (0..8).map(|i| PointId::Text(format!("s{}", i))).collect();
        let report = store
            .upload_vectors_concurrent(
                "seera",
                vec![vec![0.5, 0.5]; 8],
                vec![Payload::new(); 8],
                Some(ids),
                2,
                2,
            )
            .await
            .unwrap();

        assert_eq!(report.batches, 4);
        assert_eq!(report.failed_batches.len(), 2);
        assert_eq!(report.committed_points, 4);
        assert!(!report.is_complete());
        assert_eq!(backend.inner.point_count("seera"), 4);
    }

    #[tokio::test]
    async fn test_euclid_scores_rank_closest_first() {
        let backend = Arc::new(InMemoryVectorBackend::new());
        let (store, _) = store_with(backend);
        store
            .create_collection(&CollectionSpec::new("seera", 2, Distance::Euclid))
            .await
            .unwrap();
        store
            .upload_vectors(
                "seera",
                vec![vec![0.0, 0.0], vec![3.0, 4.0]],
                vec![Payload::new(); 2],
                Some(vec![PointId::Num(1), PointId::Num(2)]),
                10,
            )
            .await
            .unwrap();

        let hits = store
            .try_search("seera", &SearchRequest::new(vec![0.0, 0.0], 2))
            .await
            .unwrap();
        assert_eq!(hits[0].id, PointId::Num(1));
        assert_eq!(hits[0].score, 1.0);
        // distance 5
        assert!((hits[1].score - 1.0 / 6.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_euclid_metric_looked_up_for_existing_collections() {
        let backend = Arc::new(InMemoryVectorBackend::new());
        backend
            .create_collection(&CollectionSpec::new("fiqh", 1, Distance::Euclid))
            .await
            .unwrap();
        backend
            .upsert(
                "fiqh",
                vec![Point {
                    id: PointId::Num(7),
                    vector: vec![2.0],
                    payload: Payload::new(),
                }],
            )
            .await
            .unwrap();

        let (store, _) = store_with(backend);
        let hits = store
            .try_search("fiqh", &SearchRequest::new(vec![1.0], 1))
            .await
            .unwrap();
        assert_eq!(hits[0].score, 0.5);
    }

    #[tokio::test]
    async fn test_delete_collection_drops_cached_searches() {
        let backend = Arc::new(InMemoryVectorBackend::new());
        let clock = Arc::new(ManualClock::default());
        let cache = Arc::new(CacheLayer::in_process(
            &crate::config::CacheConfig::default(),
            clock.clone(),
        ));
        let store = VectorStore::new(backend, test_config(), clock).with_cache(cache.clone());
        store
            .create_collection(&CollectionSpec::new("hadith", 2, Distance::Cosine))
            .await
            .unwrap();

        let hadith = keys::vector_search(&["hadith".to_string()], 5, None, "niyyah");
        let quran = keys::vector_search(&["quran".to_string()], 5, None, "niyyah");
        for key in [&hadith, &quran] {
            cache
                .set(key, &vec![1u8], None, crate::cache::WritePolicy::Persistent)
                .await;
        }

        assert!(store.delete_collection("hadith").await.unwrap());
        assert!(cache.get::<Vec<u8>>(&hadith).await.is_none());
        assert!(cache.get::<Vec<u8>>(&quran).await.is_some());
    }

    /// Backend that creates the collection but then reports a failure, the
    /// way a payload index error surfaces after the collection exists
    struct HalfCreated {
        inner: InMemoryVectorBackend,
    }

    #[async_trait]
    impl VectorBackend for HalfCreated {
        fn name(&self) -> &'static str {
            "half-created"
        }
        async fn collection_exists(&self, name: &str) -> Result<bool> {
            self.inner.collection_exists(name).await
        }
        async fn create_collection(&self, spec: &CollectionSpec) -> Result<()> {
            self.inner.create_collection(spec).await?;
            Err(Error::StoreConnection("payload index creation failed".into()))
        }
        async fn list_collections(&self) -> Result<Vec<String>> {
            self.inner.list_collections().await
        }
        async fn delete_collection(&self, name: &str) -> Result<bool> {
            self.inner.delete_collection(name).await
        }
        async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>> {
            self.inner.collection_info(name).await
        }
        async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<()> {
            self.inner.upsert(collection, points).await
        }
        async fn search(
            &self,
            collection: &str,
            request: &SearchRequest,
        ) -> Result<Vec<ScoredPoint>> {
            self.inner.search(collection, request).await
        }
        async fn health_check(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_create_failure_after_partial_create_is_reported() {
        let backend = Arc::new(HalfCreated {
            inner: InMemoryVectorBackend::new(),
        });
        let store = VectorStore::new(
            backend.clone(),
            test_config(),
            Arc::new(ManualClock::default()),
        );
        let spec = default_collection_spec("quran", 4);

        let result = store.create_collection(&spec).await;
        assert!(matches!(result, Err(Error::StoreConnection(_))));
    }

    #[tokio::test]
    async fn test_create_race_reports_not_created() {
        let backend = Arc::new(InMemoryVectorBackend::new());
        let (store, _) = store_with(backend.clone());
        let spec = CollectionSpec::new("aqeedah", 4, Distance::Cosine);

        // another writer creates it between the existence check and create
        backend.create_collection(&spec).await.unwrap();
        assert!(matches!(
            backend.create_collection(&spec).await,
            Err(Error::AlreadyExists(_))
        ));
        assert!(!store.create_collection(&spec).await.unwrap());
    }

    #[test]
    fn test_chunking() {
        let points: Vec<Point> = (0..5)
            .map(|i| Point {
                id: PointId::Num(i),
                vector: vec![1.0],
                payload: Payload::new(),
            })
            .collect();
        let batches = chunk(points, 2);
        assert_eq!(batches.iter().map(Vec::len).collect::<Vec<_>>(), vec![2, 2, 1]);
    }
}

//! In-process vector backend
//!
//! Brute-force search over points held in memory. Used when no Qdrant
//! service is configured and as the backend in tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::core::{
    CollectionInfo, CollectionSpec, Distance, Point, PointId, ScoredPoint, SearchRequest,
    VectorBackend,
};
use crate::error::{Error, Result};

struct Collection {
    spec: CollectionSpec,
    points: BTreeMap<PointId, Point>,
}

/// Vector backend keeping every collection in process memory
#[derive(Default)]
pub struct InMemoryVectorBackend {
    collections: RwLock<HashMap<String, Collection>>,
    calls: AtomicU64,
}

impl InMemoryVectorBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of backend operations served so far
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Number of points stored in a collection
    pub fn point_count(&self, collection: &str) -> usize {
        self.read()
            .get(collection)
            .map(|c| c.points.len())
            .unwrap_or(0)
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Collection>> {
        self.collections.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Collection>> {
        self.collections.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn norm(a: &[f32]) -> f32 {
    dot(a, a).sqrt()
}

/// Similarity score under `distance`. Euclid returns the distance itself,
/// where lower is closer.
pub fn score(distance: Distance, a: &[f32], b: &[f32]) -> f32 {
    match distance {
        Distance::Cosine => {
            let denom = norm(a) * norm(b);
            if denom == 0.0 {
                0.0
            } else {
                dot(a, b) / denom
            }
        }
        Distance::Dot => dot(a, b),
        Distance::Euclid => a
            .iter()
            .zip(b)
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f32>()
            .sqrt(),
    }
}

fn not_found(collection: &str) -> Error {
    Error::NotFound(format!("Collection {} does not exist", collection))
}

fn check_dimension(spec: &CollectionSpec, vector: &[f32], what: &str) -> Result<()> {
    if vector.len() as u64 != spec.dimension {
        return Err(Error::Validation(format!(
            "{} has dimension {} but collection {} expects {}",
            what,
            vector.len(),
            spec.name,
            spec.dimension
        )));
    }
    Ok(())
}

#[async_trait]
impl VectorBackend for InMemoryVectorBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        self.record_call();
        Ok(self.read().contains_key(name))
    }

    async fn create_collection(&self, spec: &CollectionSpec) -> Result<()> {
        self.record_call();
        let mut collections = self.write();
        if collections.contains_key(&spec.name) {
            return Err(Error::AlreadyExists(format!(
                "Collection {} already exists",
                spec.name
            )));
        }
        collections.insert(
            spec.name.clone(),
            Collection {
                spec: spec.clone(),
                points: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        self.record_call();
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn delete_collection(&self, name: &str) -> Result<bool> {
        self.record_call();
        Ok(self.write().remove(name).is_some())
    }

    async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>> {
        self.record_call();
        Ok(self.read().get(name).map(|c| CollectionInfo {
            name: name.to_string(),
            vector_size: c.spec.dimension,
            distance: c.spec.distance,
            points_count: c.points.len() as u64,
            indexed_vectors_count: c.points.len() as u64,
            status: "green".to_string(),
        }))
    }

    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<()> {
        self.record_call();
        let mut collections = self.write();
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| not_found(collection))?;

        // validate the whole batch before touching anything
        for point in &points {
            check_dimension(&target.spec, &point.vector, &format!("Point {}", point.id))?;
        }

        for point in points {
            target.points.insert(point.id.clone(), point);
        }
        Ok(())
    }

    async fn search(&self, collection: &str, request: &SearchRequest) -> Result<Vec<ScoredPoint>> {
        self.record_call();
        let collections = self.read();
        let target = collections
            .get(collection)
            .ok_or_else(|| not_found(collection))?;

        check_dimension(&target.spec, &request.vector, "Query vector")?;

        let distance = target.spec.distance;
        let mut hits: Vec<ScoredPoint> = target
            .points
            .values()
            .filter(|p| {
                request
                    .filter
                    .as_ref()
                    .map(|f| f.matches(&p.payload))
                    .unwrap_or(true)
            })
            .map(|p| ScoredPoint {
                id: p.id.clone(),
                score: score(distance, &request.vector, &p.vector),
                payload: if request.with_payload {
                    p.payload.clone()
                } else {
                    Default::default()
                },
                vector: request.with_vectors.then(|| p.vector.clone()),
            })
            .collect();

        hits.sort_by(|a, b| {
            let order = match distance {
                Distance::Euclid => a.score.total_cmp(&b.score),
                _ => b.score.total_cmp(&a.score),
            };
            order.then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(request.limit);
        Ok(hits)
    }

    async fn health_check(&self) -> Result<()> {
        self.record_call();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{PayloadValue, SearchFilter};
    use crate::payload;

    async fn seeded() -> InMemoryVectorBackend {
        let backend = InMemoryVectorBackend::new();
        backend
            .create_collection(&CollectionSpec::new("quran", 3, Distance::Cosine))
            .await
            .unwrap();
        backend
            .upsert(
                "quran",
                vec![
                    Point {
                        id: PointId::Num(1),
                        vector: vec![1.0, 0.0, 0.0],
                        payload: payload! { "surah" => 1i64 },
                    },
                    Point {
                        id: PointId::Num(2),
                        vector: vec![0.7, 0.7, 0.0],
                        payload: payload! { "surah" => 2i64 },
                    },
                    Point {
                        id: PointId::Num(3),
                        vector: vec![0.0, 0.0, 1.0],
                        payload: payload! { "surah" => 2i64 },
                    },
                ],
            )
            .await
            .unwrap();
        backend
    }

    #[tokio::test]
    async fn test_search_orders_by_similarity() {
        let backend = seeded().await;
        let hits = backend
            .search("quran", &SearchRequest::new(vec![1.0, 0.1, 0.0], 2))
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, PointId::Num(1));
        assert_eq!(hits[1].id, PointId::Num(2));
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn test_filtered_search() {
        let backend = seeded().await;
        let request = SearchRequest::new(vec![1.0, 0.0, 0.0], 10)
            .with_filter(SearchFilter::new().equals("surah", 2i64));
        let hits = backend.search("quran", &request).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.payload["surah"] == PayloadValue::Integer(2)));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejects_whole_batch() {
        let backend = seeded().await;
        let result = backend
            .upsert(
                "quran",
                vec![
                    Point {
                        id: PointId::Num(10),
                        vector: vec![1.0, 0.0, 0.0],
                        payload: Default::default(),
                    },
                    Point {
                        id: PointId::Num(11),
                        vector: vec![1.0, 0.0],
                        payload: Default::default(),
                    },
                ],
            )
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));
        assert_eq!(backend.point_count("quran"), 3);
    }

    #[tokio::test]
    async fn test_missing_collection() {
        let backend = InMemoryVectorBackend::new();
        let result = backend
            .search("nope", &SearchRequest::new(vec![1.0], 1))
            .await;
        assert!(matches!(result, Err(Error::NotFound(_))));
        assert!(!backend.delete_collection("nope").await.unwrap());
        assert!(backend.collection_info("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_replaces_existing_id() {
        let backend = seeded().await;
        backend
            .upsert(
                "quran",
                vec![Point {
                    id: PointId::Num(1),
                    vector: vec![0.0, 1.0, 0.0],
                    payload: payload! { "surah" => 9i64 },
                }],
            )
            .await
            .unwrap();
        assert_eq!(backend.point_count("quran"), 3);
        let info = backend.collection_info("quran").await.unwrap().unwrap();
        assert_eq!(info.points_count, 3);
        assert_eq!(info.vector_size, 3);
    }

    #[test]
    fn test_euclid_score_is_distance() {
        assert_eq!(score(Distance::Euclid, &[0.0, 0.0], &[3.0, 4.0]), 5.0);
        assert_eq!(score(Distance::Cosine, &[0.0, 0.0], &[3.0, 4.0]), 0.0);
        assert_eq!(score(Distance::Dot, &[1.0, 2.0], &[3.0, 4.0]), 11.0);
    }
}

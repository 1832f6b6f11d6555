//! Hybrid retrieval over a user's memories
//!
//! Combines semantic search (pgvector) and full-text search (tsvector),
//! each min-max scaled, into one deduplicated ranking.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use super::rank;
use crate::cache::{keys, CacheLayer, WritePolicy};
use crate::core::EmbeddingProvider;
use crate::database::{Memory, MemoryEmbedding, MemoryStore, ScoredMemory};
use crate::error::Result;

const HYBRID_TTL: Duration = Duration::from_secs(60);
const MIN_SIMILARITY: f32 = 0.3;

/// Orchestrates memory retrieval across semantic and full-text search
#[derive(Clone)]
pub struct MemoryRetriever {
    store: MemoryStore,
    embedder: Arc<dyn EmbeddingProvider>,
    cache: Arc<CacheLayer>,
}

impl MemoryRetriever {
    pub fn new(
        store: MemoryStore,
        embedder: Arc<dyn EmbeddingProvider>,
        cache: Arc<CacheLayer>,
    ) -> Self {
        MemoryRetriever {
            store,
            embedder,
            cache,
        }
    }

    /// Most relevant memories for `query`. Either search may fail on its own;
    /// the other still contributes.
    pub async fn retrieve(
        &self,
        user_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<ScoredMemory>> {
        let query = query.trim();
        if query.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let key = keys::memory_hybrid(user_id, query, limit);
        if let Some(cached) = self.cache.get::<Vec<ScoredMemory>>(&key).await {
            info!("Memory cache hit for user={}", user_id);
            return Ok(cached);
        }

        let mut degraded = false;

        let semantic = match self.query_embedding(query).await {
            Ok(vector) => match self
                .store
                .search_semantic(user_id, vector, limit, MIN_SIMILARITY)
                .await
            {
                Ok(results) => results,
                Err(e) => {
                    warn!("Semantic search failed: {}", e);
                    degraded = true;
                    vec![]
                }
            },
            Err(e) => {
                warn!("Query embedding failed, using full-text only: {}", e);
                degraded = true;
                vec![]
            }
        };

        let fulltext = match self.store.search_fulltext(user_id, query, limit).await {
            Ok(results) => results,
            Err(e) => {
                warn!("Full-text search failed: {}", e);
                degraded = true;
                vec![]
            }
        };

        let combined = fuse(semantic, fulltext, limit);

        // a partial answer is served but not remembered
        if !degraded {
            self.cache
                .set(&key, &combined, Some(HYBRID_TTL), WritePolicy::Persistent)
                .await;
        }

        info!(
            "Retrieved {} memories for user={}",
            combined.len(),
            user_id
        );
        Ok(combined)
    }

    /// Save a memory with its embedding. An embedding failure still saves
    /// the memory, which then only shows up in full-text search.
    pub async fn save_memory(&self, memory: &Memory) -> Result<Uuid> {
        let embedding = match self.embedder.embed(&memory.content).await {
            Ok(vector) => Some(MemoryEmbedding {
                model: self.embedder.model_name().to_string(),
                vector,
            }),
            Err(e) => {
                warn!("Failed to generate embedding: {}", e);
                None
            }
        };

        self.store.save(memory, embedding).await
    }

    async fn query_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let key = keys::embedding(self.embedder.model_name(), text);
        if let Some(cached) = self.cache.get::<Vec<f32>>(&key).await {
            return Ok(cached);
        }

        let vector = self.embedder.embed(text).await?;
        self.cache.set(&key, &vector, None, WritePolicy::Hot).await;
        Ok(vector)
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }
}

/// Scale each list into [0, 1], keep the best score per memory and order by
/// it. Semantic hits win ties.
fn fuse(
    mut semantic: Vec<ScoredMemory>,
    mut fulltext: Vec<ScoredMemory>,
    limit: usize,
) -> Vec<ScoredMemory> {
    rank::min_max(&mut semantic, |m| &mut m.score);
    rank::min_max(&mut fulltext, |m| &mut m.score);

    let mut best: HashMap<Uuid, usize> = HashMap::new();
    let mut combined: Vec<ScoredMemory> = Vec::new();
    for hit in semantic.into_iter().chain(fulltext) {
        match best.get(&hit.memory.id) {
            Some(&i) => {
                if hit.score > combined[i].score {
                    combined[i].score = hit.score;
                }
            }
            None => {
                best.insert(hit.memory.id, combined.len());
                combined.push(hit);
            }
        }
    }

    combined.sort_by(|a, b| b.score.total_cmp(&a.score));
    combined.truncate(limit);
    combined
}

/// Render memories as a context block
pub fn format_memories(memories: &[ScoredMemory]) -> String {
    if memories.is_empty() {
        return String::new();
    }

    let mut output = String::from("## Relevant Memories\n\n");
    for (i, hit) in memories.iter().enumerate() {
        output.push_str(&format!("{}. {}\n", i + 1, hit.memory.content));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(memory: &Memory, score: f32) -> ScoredMemory {
        ScoredMemory {
            memory: memory.clone(),
            score,
        }
    }

    #[test]
    fn test_fuse_dedups_and_keeps_best_score() {
        let a = Memory::new("u1", "asked about zakat on gold");
        let b = Memory::new("u1", "prefers Ibn Kathir's tafseer");
        let c = Memory::new("u1", "studying surah al-kahf");

        let semantic = vec![scored(&a, 0.9), scored(&b, 0.6), scored(&c, 0.3)];
        let fulltext = vec![scored(&c, 0.08), scored(&a, 0.02)];

        let fused = fuse(semantic, fulltext, 10);
        assert_eq!(fused.len(), 3);
        // a: 1.0 semantic; c: 1.0 full-text beats 0.0 semantic; b: 0.5
        assert_eq!(fused[0].memory.id, a.id);
        assert_eq!(fused[1].memory.id, c.id);
        assert_eq!(fused[2].memory.id, b.id);
        assert_eq!(fused[1].score, 1.0);
    }

    #[test]
    fn test_fuse_limit_and_single_source() {
        let a = Memory::new("u1", "a");
        let b = Memory::new("u1", "b");
        let fused = fuse(vec![], vec![scored(&a, 0.4), scored(&b, 0.1)], 1);
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].memory.id, a.id);
    }

    struct FixedEmbedder;

    #[async_trait::async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        fn model_name(&self) -> &str {
            "fixed"
        }

        fn dimensions(&self) -> usize {
            3
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0, 0.0])
        }

        async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
            Ok(vec![vec![1.0, 0.0, 0.0]; texts.len()])
        }
    }

    #[tokio::test]
    async fn test_failed_searches_are_not_cached() {
        use crate::config::CacheConfig;
        use crate::core::ManualClock;

        let pool = sqlx::postgres::PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(200))
            .connect_lazy("postgres://noor@127.0.0.1:1/noor")
            .unwrap();
        let cache = Arc::new(CacheLayer::in_process(
            &CacheConfig::default(),
            Arc::new(ManualClock::default()),
        ));
        let retriever = MemoryRetriever::new(
            MemoryStore::new(pool, cache.clone()),
            Arc::new(FixedEmbedder),
            cache.clone(),
        );

        let results = retriever.retrieve("u1", "زكاة", 5).await.unwrap();
        assert!(results.is_empty());
        let key = keys::memory_hybrid("u1", "زكاة", 5);
        assert!(cache.get::<Vec<ScoredMemory>>(&key).await.is_none());
    }

    #[test]
    fn test_format_memories() {
        assert_eq!(format_memories(&[]), "");

        let memories = vec![
            scored(&Memory::new("u1", "First memory"), 1.0),
            scored(&Memory::new("u1", "Second memory"), 0.5),
        ];
        let result = format_memories(&memories);
        assert!(result.contains("## Relevant Memories"));
        assert!(result.contains("1. First memory"));
        assert!(result.contains("2. Second memory"));
    }
}

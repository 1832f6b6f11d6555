//! Cache key builders
//!
//! Keeping every key shape in one place keeps writes and their
//! invalidation patterns in agreement.

use super::entry::escape_glob;
use crate::core::SearchFilter;

pub fn user(lookup: &str) -> String {
    format!("user:{}", lookup)
}

pub fn corpus_record(kind: &str, id: &str) -> String {
    format!("corpus:{}:{}", kind, id)
}

pub fn corpus_all(kind: &str) -> String {
    format!("all_{}", kind)
}

/// `{kind}_search:{source|all}:{query}:{limit}`
pub fn corpus_search(kind: &str, source: Option<&str>, query: &str, limit: usize) -> String {
    format!("{}_search:{}:{}:{}", kind, source.unwrap_or("all"), query, limit)
}

/// Every cached search of one corpus kind
pub fn corpus_search_pattern(kind: &str) -> String {
    format!("{}_search:*", escape_glob(kind))
}

pub fn memory(id: impl std::fmt::Display) -> String {
    format!("memory:{}", id)
}

pub fn memory_search(user_id: &str, query: &str, limit: usize) -> String {
    format!("memory_search:{}:{}:{}", user_id, query, limit)
}

pub fn memory_search_pattern(user_id: &str) -> String {
    format!("memory_search:{}:*", escape_glob(user_id))
}

pub fn memory_recent(user_id: &str, limit: usize) -> String {
    format!("memory_recent:{}:{}", user_id, limit)
}

pub fn memory_recent_pattern(user_id: &str) -> String {
    format!("memory_recent:{}:*", escape_glob(user_id))
}

pub fn memory_hybrid(user_id: &str, query: &str, limit: usize) -> String {
    format!("memory_hybrid:{}:{}:{}", user_id, query, limit)
}

pub fn memory_hybrid_pattern(user_id: &str) -> String {
    format!("memory_hybrid:{}:*", escape_glob(user_id))
}

pub fn embedding(model: &str, text: &str) -> String {
    format!("embedding:{}:{}", model, text)
}

/// `vsearch:{collections}:{limit}:{filter}:{query}` with collections sorted
pub fn vector_search(
    collections: &[String],
    limit: usize,
    filter: Option<&SearchFilter>,
    query: &str,
) -> String {
    let mut names: Vec<&str> = collections.iter().map(String::as_str).collect();
    names.sort_unstable();
    names.dedup();

    let filter = filter
        .filter(|f| !f.is_empty())
        .and_then(|f| serde_json::to_string(f).ok())
        .unwrap_or_else(|| "-".to_string());

    format!("vsearch:{}:{}:{}:{}", names.join(","), limit, filter, query)
}

/// Cached searches that touched `collection`. Over-matches on shared name
/// prefixes, which only costs extra misses.
pub fn vector_search_pattern(collection: &str) -> String {
    format!("vsearch:*{}*", escape_glob(collection))
}

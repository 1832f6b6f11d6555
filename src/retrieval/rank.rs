//! Score normalization and merging of per-source result lists
//!
//! Scores are similarities, higher is better. `VectorStore::try_search`
//! already turns euclidean distances into similarities.

use crate::config::ScoreNormalization;
use crate::core::SearchResult;

/// Rescale one source's scores in place. Input is ordered best first.
pub fn normalize(results: &mut [SearchResult], policy: ScoreNormalization) {
    match policy {
        ScoreNormalization::None => {}
        ScoreNormalization::MinMax => min_max(results, |r| &mut r.score),
        ScoreNormalization::Rank => {
            for (i, r) in results.iter_mut().enumerate() {
                r.score = 1.0 / (i as f32 + 1.0);
            }
        }
    }
}

/// Scale the scores selected by `score` into [0, 1]. A constant list maps
/// to 1.0.
pub fn min_max<T>(items: &mut [T], score: impl Fn(&mut T) -> &mut f32) {
    let (mut lo, mut hi) = (f32::INFINITY, f32::NEG_INFINITY);
    for item in items.iter_mut() {
        let s = *score(item);
        lo = lo.min(s);
        hi = hi.max(s);
    }
    let span = hi - lo;
    for item in items.iter_mut() {
        let s = score(item);
        *s = if span > f32::EPSILON { (*s - lo) / span } else { 1.0 };
    }
}

/// Normalize each source, concatenate, and keep the `limit` best by
/// descending score. Ties keep source order.
pub fn merge(
    per_source: Vec<Vec<SearchResult>>,
    policy: ScoreNormalization,
    limit: usize,
) -> Vec<SearchResult> {
    let mut merged: Vec<SearchResult> = per_source
        .into_iter()
        .flat_map(|mut results| {
            normalize(&mut results, policy);
            results
        })
        .collect();

    merged.sort_by(|a, b| b.score.total_cmp(&a.score));
    merged.truncate(limit);
    merged
}

//! Per-doc score accumulation and top-K selection.
//!
//! Grounded on `original_source/src/query/results.c` (`nxs_resp_addresult`,
//! the yyjson-based `to_json`) composed with `heap::MinHeap` for the
//! top-K cap described in `spec.md` §4.6 steps 5-7.

use rustc_hash::FxHashMap;
use serde_json::json;

use crate::heap::MinHeap;

#[derive(Debug, Clone, Copy)]
pub struct Hit {
    pub doc_id: u64,
    pub score: f64,
}

/// Accumulates per-doc scores across matching terms, then caps to the
/// top `limit` via a min-heap.
pub struct Response {
    hits: Vec<Hit>,
}

impl Response {
    /// Builds the ordered, capped response from a raw per-doc score map.
    /// `spec.md` §4.6 step 6: ties broken arbitrarily.
    pub fn from_scores(scores: FxHashMap<u64, f64>, limit: u64) -> Self {
        let cap = limit.min(usize::MAX as u64) as usize;
        let mut heap = MinHeap::new(cap, |a: &Hit, b: &Hit| {
            a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal)
        });
        for (doc_id, score) in scores {
            if score.is_nan() || score < 0.0 {
                continue;
            }
            heap.add(Hit { doc_id, score });
        }
        Response {
            hits: heap.into_sorted_desc(),
        }
    }

    pub fn empty() -> Self {
        Response { hits: Vec::new() }
    }

    pub fn count(&self) -> usize {
        self.hits.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Hit> {
        self.hits.iter()
    }

    /// `{"count": N, "results": [{"id": u64, "score": f64}, ...]}`.
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "count": self.hits.len(),
            "results": self.hits.iter().map(|h| json!({ "id": h.doc_id, "score": h.score })).collect::<Vec<_>>(),
        })
    }
}

//! Fuzzy term lookup: BK-tree over term strings keyed by Levenshtein
//! distance, tolerating up to [`LEVDIST_TOLERANCE`] edits.

pub mod bktree;
pub mod levdist;

use bktree::BkTree;
use levdist::LevDist;

/// `LEVDIST_TOLERANCE` in `original_source/src/index/index.h`.
pub const LEVDIST_TOLERANCE: usize = 2;

fn dist(a: &(u32, String), b: &(u32, String)) -> usize {
    LevDist::new().distance(&a.1, &b.1)
}

/// BK-tree over `(term_id, value)` pairs. Fuzzy lookups are off the hot
/// append path, so each comparison building its own small `LevDist` scratch
/// buffer (rather than threading a shared one through the recursive
/// insert/search) keeps the tree free of interior mutability.
#[derive(Default)]
pub struct FuzzyIndex {
    tree: BkTree<(u32, String)>,
}

impl FuzzyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, term_id: u32, value: String) {
        self.tree.insert((term_id, value), &dist);
    }

    /// Returns candidate term ids within [`LEVDIST_TOLERANCE`] edits of
    /// `query`, in BK-tree pop order.
    pub fn candidates(&self, query: &str) -> Vec<u32> {
        let probe = (u32::MAX, query.to_string());
        self.tree
            .search(&probe, LEVDIST_TOLERANCE, &dist)
            .into_iter()
            .map(|(id, _)| *id)
            .collect()
    }
}

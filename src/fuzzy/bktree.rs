//! BK-tree (Burkhard-Keller tree) over arbitrary items, keyed by an
//! arbitrary distance function — used here with Levenshtein distance over
//! term strings.
//!
//! Ported from `original_source/src/algo/bktree.c`. Child pointers are
//! packed by popcount rather than a full 64-entry array per node (Bagwell
//! 2001's sparse-array trick): node `bitmap` has bit `d` set iff a child at
//! edit distance `d` exists, and that child lives at
//! `children[popcount(bitmap & ((1 << d) - 1))]`. Nodes live in a flat arena
//! (`Vec<BkNode<T>>`) addressed by index rather than pointer, per `spec.md`
//! §9's "arena-allocated node pool and integer indices instead of raw
//! pointers".
//!
//! Distances above 63 collapse into slot 63 (`spec.md` §4.4: "distances
//! above 63 go into slot 63"), which sidesteps the off-by-one the original
//! C's `MIN(d, BKT_DIST_LIMIT)` (with `BKT_DIST_LIMIT == 64`) leaves latent
//! for a 0-63-bit-indexed 64-bit bitmap.

pub const DIST_LIMIT: usize = 64;

struct BkNode<T> {
    item: T,
    bitmap: u64,
    children: Vec<usize>,
}

pub struct BkTree<T> {
    nodes: Vec<BkNode<T>>,
    root: Option<usize>,
}

impl<T> Default for BkTree<T> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            root: None,
        }
    }
}

fn slot_index(bitmap: u64, d: usize) -> usize {
    let d = d.min(DIST_LIMIT - 1);
    let mask = if d == 0 { 0 } else { (1u64 << d) - 1 };
    (bitmap & mask).count_ones() as usize
}

impl<T> BkTree<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Inserts `item`, computing distances against existing nodes with `dist`.
    pub fn insert(&mut self, item: T, dist: &impl Fn(&T, &T) -> usize) {
        let Some(root) = self.root else {
            self.nodes.push(BkNode {
                item,
                bitmap: 0,
                children: Vec::new(),
            });
            self.root = Some(0);
            return;
        };

        let mut cur = root;
        loop {
            let d = dist(&self.nodes[cur].item, &item).min(DIST_LIMIT - 1);
            let bit = 1u64 << d;
            if self.nodes[cur].bitmap & bit != 0 {
                let idx = slot_index(self.nodes[cur].bitmap, d);
                cur = self.nodes[cur].children[idx];
                continue;
            }
            let new_idx = self.nodes.len();
            self.nodes.push(BkNode {
                item,
                bitmap: 0,
                children: Vec::new(),
            });
            let idx = slot_index(self.nodes[cur].bitmap, d);
            self.nodes[cur].children.insert(idx, new_idx);
            self.nodes[cur].bitmap |= bit;
            return;
        }
    }

    /// Returns references to every item within `tolerance` edit distance of
    /// `query`, in BK-tree traversal (pop) order — callers that need to
    /// replicate the original's tie-break rely on this exact order.
    pub fn search<'a>(
        &'a self,
        query: &T,
        tolerance: usize,
        dist: &impl Fn(&T, &T) -> usize,
    ) -> Vec<&'a T> {
        let mut results = Vec::new();
        let Some(root) = self.root else {
            return results;
        };

        let mut stack = vec![root];
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx];
            let d = dist(&node.item, query);
            if d <= tolerance {
                results.push(&node.item);
            }
            let min_d = d.saturating_sub(tolerance);
            let max_d = (d + tolerance).min(DIST_LIMIT - 1);
            for cand in min_d..=max_d {
                let bit = 1u64 << cand;
                if node.bitmap & bit != 0 {
                    let child_idx = slot_index(node.bitmap, cand);
                    stack.push(node.children[child_idx]);
                }
            }
        }
        results
    }
}

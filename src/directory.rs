//! In-memory mirrors of the on-disk stores: `TermDirectory` (`value → Term`,
//! `term_id → Term`) and `DocDirectory` (`doc_id → Doc`).
//!
//! Grounded on `original_source/src/index/idxterm.c` (`idxterm_insert`,
//! `idxterm_lookup`, `idxterm_fuzzysearch`) and `idxdoc.c`
//! (`idxdoc_lookup`), reshaped into owned Rust collections the way the
//! teacher's `profiles/roaring_bm25.rs` mirrors postings in a
//! `HashMap<String, RoaringBitmap>` rather than pointer-linked C structures.

use rustc_hash::FxHashMap;
use roaring::RoaringBitmap;

use crate::fuzzy::FuzzyIndex;

/// A resolved term: its id, value, the byte offset of its occurrence
/// counter within the terms file, and the set of documents it appears in.
#[derive(Debug, Clone)]
pub struct Term {
    pub id: u32,
    pub value: String,
    /// Byte offset of this term's 64-bit counter within the terms file.
    pub counter_offset: u32,
    pub doc_bitmap: RoaringBitmap,
    /// In-memory mirror of the mmap'd global occurrence counter at
    /// `counter_offset`; kept in sync by `storage::terms::TermsStore`
    /// whenever it mutates the authoritative cell, so that fuzzy lookup
    /// (`spec.md` §4.4) doesn't need mmap access of its own.
    pub total_count: u64,
}

/// A resolved document: its id, the byte offset of its block in the dtmap
/// file, its token length (with repetition), and the sorted
/// `(term_id, count)` tuples making up its block — kept in memory so the
/// ranker can binary-search term frequency without touching the mmap.
#[derive(Debug, Clone)]
pub struct Doc {
    pub id: u64,
    pub offset: u64,
    pub doc_len: u32,
    pub term_counts: Vec<(u32, u32)>,
}

impl Doc {
    /// `spec.md` §4.7: "binary search over the sorted tuple array"; returns
    /// `None` if the term does not appear in this document (the ranker
    /// treats an absent term as "tf <= 0").
    pub fn term_count(&self, term_id: u32) -> Option<u32> {
        self.term_counts
            .binary_search_by_key(&term_id, |&(t, _)| t)
            .ok()
            .map(|idx| self.term_counts[idx].1)
    }
}

#[derive(Default)]
pub struct TermDirectory {
    by_value: FxHashMap<String, u32>,
    by_id: Vec<Term>,
    fuzzy: FuzzyIndex,
}

impl TermDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Inserts a brand-new term, assigning it `id`. Caller (`TermsStore`)
    /// owns id assignment since ids must match file-append order.
    /// If `value` already exists, returns the pre-existing term's id
    /// unchanged (race with a concurrent writer that synced first).
    pub fn insert(&mut self, id: u32, value: String, counter_offset: u32, total_count: u64) -> u32 {
        if let Some(&existing) = self.by_value.get(&value) {
            return existing;
        }
        self.fuzzy.insert(id, value.clone());
        self.by_value.insert(value.clone(), id);
        debug_assert_eq!(self.by_id.len() as u32 + 1, id);
        self.by_id.push(Term {
            id,
            value,
            counter_offset,
            doc_bitmap: RoaringBitmap::new(),
            total_count,
        });
        id
    }

    pub fn lookup_by_value(&self, value: &str) -> Option<&Term> {
        self.by_value.get(value).and_then(|&id| self.lookup_by_id(id))
    }

    pub fn lookup_by_id(&self, id: u32) -> Option<&Term> {
        id.checked_sub(1)
            .and_then(|idx| self.by_id.get(idx as usize))
    }

    pub fn lookup_by_id_mut(&mut self, id: u32) -> Option<&mut Term> {
        id.checked_sub(1)
            .and_then(|idx| self.by_id.get_mut(idx as usize))
    }

    /// `spec.md` §4.4 `fuzzy_search`: searches within `LEVDIST_TOLERANCE`
    /// edits and returns the candidate with the largest global occurrence
    /// count, reproducing the original's literal (buggy-looking) tie-break
    /// documented in `DESIGN.md`: any positive-count candidate always
    /// overwrites the running best (last one wins among positives), and a
    /// zero-count candidate only overwrites a zero-count best — so once all
    /// candidates have been visited and none ever had a positive count, the
    /// last one encountered is returned (`spec.md` §9).
    pub fn fuzzy_search(&self, value: &str) -> Option<u32> {
        let candidates = self.fuzzy.candidates(value);
        let mut best: Option<u32> = None;
        let mut best_is_positive = false;
        for term_id in candidates {
            let term = match self.lookup_by_id(term_id) {
                Some(t) => t,
                None => continue,
            };
            if term.total_count > 0 {
                best = Some(term_id);
                best_is_positive = true;
            } else if !best_is_positive {
                best = Some(term_id);
            }
        }
        best
    }

    pub fn iter(&self) -> impl Iterator<Item = &Term> {
        self.by_id.iter()
    }
}

#[derive(Default)]
pub struct DocDirectory {
    docs: FxHashMap<u64, Doc>,
}

impl DocDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, doc: Doc) {
        self.docs.insert(doc.id, doc);
    }

    pub fn remove(&mut self, doc_id: u64) -> Option<Doc> {
        self.docs.remove(&doc_id)
    }

    pub fn lookup(&self, doc_id: u64) -> Option<&Doc> {
        self.docs.get(&doc_id)
    }

    pub fn contains(&self, doc_id: u64) -> bool {
        self.docs.contains_key(&doc_id)
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

//! `Index`: orchestrates the add/remove/search state transitions over one
//! named index's `TermsStore` + `DtmapStore` + in-memory directories.
//!
//! Grounded on `original_source/src/index/index.c` (`nxs_index_add`,
//! `nxs_index_remove`) and `src/query/search.c` (`nxs_index_search`) for
//! control flow; `parking_lot::Mutex` guards the in-process mutable state
//! the way the teacher's `FtsIndex` guards its profile with an `RwLock`
//! (here a plain `Mutex` since every operation mutates something, down to
//! the directories' sync position).

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::directory::{DocDirectory, TermDirectory};
use crate::document::Document;
use crate::error::{NxsError, Result};
use crate::params::{IndexParams, RankingAlgo, SearchParams};
use crate::query::{self, Expr};
use crate::ranker;
use crate::response::Response;
use crate::storage::dtmap::{DtmapStore, FULL_SYNC, PARTIAL_SYNC};
use crate::storage::terms::TermsStore;
use crate::tokenizer::{self, FilterPipeline, IdentityPipeline, ResolveFlags};

struct IndexState {
    term_dir: TermDirectory,
    doc_dir: DocDirectory,
    terms: TermsStore,
    dtmap: DtmapStore,
}

/// Header counters as of the last sync. `spec.md` §8 "Counter consistency".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexStats {
    pub doc_count: u64,
    pub token_count: u64,
}

/// One open, named index: `<base>/data/<name>/{params.db,nxsterms,nxsdtmap}`.
pub struct Index {
    dir: PathBuf,
    params: IndexParams,
    state: Mutex<IndexState>,
    pipeline: Box<dyn FilterPipeline + Send + Sync>,
}

impl Index {
    pub(crate) fn create(
        dir: PathBuf,
        params: IndexParams,
        pipeline: Box<dyn FilterPipeline + Send + Sync>,
    ) -> Result<Self> {
        std::fs::create_dir_all(&dir)?;
        params.save(&dir.join("params.db"))?;
        Self::open_dir(dir, params, pipeline)
    }

    pub(crate) fn open(
        dir: PathBuf,
        pipeline: Box<dyn FilterPipeline + Send + Sync>,
    ) -> Result<Self> {
        let params = IndexParams::load(&dir.join("params.db"))?;
        Self::open_dir(dir, params, pipeline)
    }

    fn open_dir(
        dir: PathBuf,
        params: IndexParams,
        pipeline: Box<dyn FilterPipeline + Send + Sync>,
    ) -> Result<Self> {
        let mut term_dir = TermDirectory::new();
        let terms = TermsStore::open(&dir.join("nxsterms"), &mut term_dir)?;
        let dtmap = DtmapStore::open(&dir.join("nxsdtmap"))?;
        let doc_dir = DocDirectory::new();

        let mut state = IndexState {
            term_dir,
            doc_dir,
            terms,
            dtmap,
        };
        state.dtmap.sync(&mut state.doc_dir, &mut state.term_dir, FULL_SYNC)?;

        Ok(Index {
            dir,
            params,
            state: Mutex::new(state),
            pipeline,
        })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// The header's `doc_count`/`token_count`, after syncing. Exposes the
    /// counter-consistency invariant of `spec.md` §8 for callers (and
    /// tests) without reaching into private store state.
    pub fn stats(&self) -> Result<IndexStats> {
        let mut state = self.state.lock();
        state.terms.sync(&mut state.term_dir)?;
        state
            .dtmap
            .sync(&mut state.doc_dir, &mut state.term_dir, PARTIAL_SYNC)?;
        Ok(IndexStats {
            doc_count: state.dtmap.doc_count() as u64,
            token_count: state.dtmap.token_count(),
        })
    }

    pub fn default_algo(&self) -> Result<RankingAlgo> {
        self.params.ranking_algo()
    }

    /// AddPath: tokenize -> resolve(STAGE) -> TermsStore.append -> DtmapStore.append.
    /// `spec.md` §2, §4.3 *append*.
    pub fn add(&self, doc_id: u64, text: &str) -> Result<()> {
        if doc_id == 0 {
            return Err(NxsError::invalid("doc id must be non-zero"));
        }
        if doc_id > u32::MAX as u64 {
            return Err(NxsError::invalid("doc id must fit u32 for bitmap membership"));
        }

        let mut set = tokenizer::tokenize(text, self.pipeline.as_ref())?;
        let mut state = self.state.lock();

        tokenizer::resolve(&mut set, &state.term_dir, ResolveFlags::STAGE)?;
        let staged = set.staged_pairs();
        if !staged.is_empty() {
            let ids = state.terms.append(&mut state.term_dir, &staged)?;
            set.attach_staged_resolutions(&ids);
        }

        let tuples = set.resolved_tuples();
        let doc_len = set.seen() as u32;
        let IndexState {
            term_dir,
            doc_dir,
            terms,
            dtmap,
        } = &mut *state;
        dtmap.append(terms, term_dir, doc_dir, doc_id, &tuples, doc_len)
    }

    /// Convenience wrapper over [`Index::add`] for a caller holding a
    /// [`Document`] rather than its raw id/text pair.
    pub fn add_document(&self, doc: &Document) -> Result<()> {
        self.add(doc.id, &doc.text)
    }

    /// Adds each document in turn, stopping at the first failure. Mirrors
    /// the teacher's `index_batch(docs: &[Document])` entry point, without
    /// the batch-local profile bookkeeping this core has no equivalent of.
    pub fn add_documents(&self, docs: &[Document]) -> Result<usize> {
        for doc in docs {
            self.add_document(doc)?;
        }
        Ok(docs.len())
    }

    /// RemovePath: sync, append deletion marker, roll back counters/bitmaps,
    /// invalidate the in-memory Doc. `spec.md` §4.3 *remove*.
    pub fn remove(&self, doc_id: u64) -> Result<()> {
        let mut state = self.state.lock();
        let IndexState {
            term_dir,
            doc_dir,
            terms,
            dtmap,
        } = &mut *state;
        dtmap.remove(terms, term_dir, doc_dir, doc_id)
    }

    /// SearchPath: sync both stores, resolve query tokens, evaluate the
    /// expression, rank and cap to `limit`. `spec.md` §4.6.
    pub fn search(&self, expr: &Expr, search_params: &SearchParams) -> Result<Response> {
        let mut state = self.state.lock();
        state.terms.sync(&mut state.term_dir)?;
        state
            .dtmap
            .sync(&mut state.doc_dir, &mut state.term_dir, PARTIAL_SYNC)?;

        if query::is_empty(expr) {
            return Ok(Response::empty());
        }

        let term_ids = query::leaf_term_ids(
            expr,
            &state.term_dir,
            self.pipeline.as_ref(),
            search_params.fuzzymatch,
        )?;
        if term_ids.is_empty() {
            return Ok(Response::empty());
        }

        let bitmap = query::evaluate(
            expr,
            &state.term_dir,
            self.pipeline.as_ref(),
            search_params.fuzzymatch,
        )?;

        let doc_count = state.doc_dir.len() as u64;
        let token_count = state.dtmap.token_count();

        let mut scores: FxHashMap<u64, f64> = FxHashMap::default();
        for doc_id in bitmap.iter() {
            let doc_id = doc_id as u64;
            let Some(doc) = state.doc_dir.lookup(doc_id) else {
                continue;
            };
            let mut total = 0.0;
            for &term_id in &term_ids {
                let Some(term) = state.term_dir.lookup_by_id(term_id) else {
                    continue;
                };
                if !term.doc_bitmap.contains(doc_id as u32) {
                    continue;
                }
                let s = ranker::score(search_params.algo, term, doc, doc_count, token_count);
                if s.is_finite() && s >= 0.0 {
                    total += s;
                }
            }
            scores.insert(doc_id, total);
        }

        Ok(Response::from_scores(scores, search_params.limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn new_index(dir: &Path) -> Index {
        Index::create(
            dir.to_path_buf(),
            IndexParams::default(),
            Box::new(IdentityPipeline),
        )
        .unwrap()
    }

    #[test]
    fn add_then_search_finds_matching_document() {
        let dir = tempdir().unwrap();
        let idx = new_index(dir.path());
        idx.add(1, "The quick brown fox jumped over the lazy dog").unwrap();
        idx.add(2, "Once upon a time there were three little foxes").unwrap();

        let resp = idx
            .search(&Expr::Leaf("dog".into()), &SearchParams::default())
            .unwrap();
        assert_eq!(resp.count(), 1);
        let hit = resp.iter().next().unwrap();
        assert_eq!(hit.doc_id, 1);
    }

    #[test]
    fn remove_then_search_hides_document() {
        let dir = tempdir().unwrap();
        let idx = new_index(dir.path());
        idx.add(1, "abc def ghi").unwrap();
        idx.add(2, "abc def ghi").unwrap();
        idx.add(3, "abc def ghi").unwrap();
        idx.remove(2).unwrap();

        let resp = idx
            .search(&Expr::Leaf("def".into()), &SearchParams::default())
            .unwrap();
        let mut ids: Vec<u64> = resp.iter().map(|h| h.doc_id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 3]);

        let stats = idx.stats().unwrap();
        assert_eq!(stats.doc_count, 2);
        assert_eq!(stats.token_count, 6);
    }

    #[test]
    fn readding_a_live_doc_id_fails() {
        let dir = tempdir().unwrap();
        let idx = new_index(dir.path());
        idx.add(1, "hello").unwrap();
        let err = idx.add(1, "hello again").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Exists);
    }

    #[test]
    fn add_documents_indexes_each_one() {
        let dir = tempdir().unwrap();
        let idx = new_index(dir.path());
        let docs = vec![
            Document::new(1, "cat dog rat"),
            Document::new(2, "cat cat dog"),
        ];
        let added = idx.add_documents(&docs).unwrap();
        assert_eq!(added, 2);

        let resp = idx
            .search(&Expr::Leaf("cat".into()), &SearchParams::default())
            .unwrap();
        assert_eq!(resp.count(), 2);
    }

    #[test]
    fn zero_doc_id_is_rejected() {
        let dir = tempdir().unwrap();
        let idx = new_index(dir.path());
        let err = idx.add(0, "hello").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Invalid);
    }

    #[test]
    fn reopening_index_preserves_search_results() {
        let dir = tempdir().unwrap();
        {
            let idx = new_index(dir.path());
            idx.add(1, "cat dog rat").unwrap();
            idx.add(2, "cat cat dog").unwrap();
        }
        let idx = Index::open(dir.path().to_path_buf(), Box::new(IdentityPipeline)).unwrap();
        let resp = idx
            .search(&Expr::Leaf("cat".into()), &SearchParams::default())
            .unwrap();
        assert_eq!(resp.count(), 2);
    }
}

//! `DtmapStore`: append-only on-disk list of document records, plus
//! deletion markers.
//!
//! Ported from `original_source/src/index/dtmap.c` (`idx_dtmap_add`,
//! `idx_dtmap_sync`) and the header/block shapes in
//! `original_source/src/index/storage.h` (`idxdt_hdr_t`). `remove` has no
//! surviving body in the retrieved `dtmap.c` (only declared in `index.h`
//! and exercised by `src/tests/t_index_remove.c`), so it follows
//! `spec.md` §4.3's pseudocode directly.
//!
//! Note: the magic used here is `"NXS_D"` per `spec.md` §3/§6, not the
//! `"NXS_M"` in `original_source/src/index/storage.h` — see `DESIGN.md`.

use std::path::Path;
use std::sync::atomic::Ordering;

use byteorder::{BigEndian, ByteOrder};
use log::debug;

use crate::directory::{Doc, DocDirectory, TermDirectory};
use crate::error::{NxsError, Result};
use crate::storage::bigendian::{BeU32Cell, BeU64Cell};
use crate::storage::indexmap::IndexMap;
use crate::storage::terms::TermsStore;

pub const MAGIC: &[u8; 5] = b"NXS_D";
pub const ABI_VERSION: u8 = 1;
pub const HEADER_LEN: u64 = 32;

const MAGIC_OFF: usize = 0;
const VER_OFF: usize = 5;
const DATA_LEN_OFF: usize = 8;
const TOTAL_TOKENS_OFF: usize = 16;
const DOC_COUNT_OFF: usize = 24;

/// `DTMAP_PARTIAL_SYNC` in the original: tolerate a doc block referencing a
/// term id the local terms mirror hasn't caught up to yet, stopping the
/// replay early instead of treating it as corruption.
pub const PARTIAL_SYNC: bool = true;
pub const FULL_SYNC: bool = false;

fn block_len(n: usize) -> usize {
    16 + 8 * n
}

pub struct DtmapStore {
    map: IndexMap,
    /// `dt_consumed` in `spec.md` §4.9.
    consumed: u64,
}

impl DtmapStore {
    pub fn open(path: &Path) -> Result<Self> {
        let (mut map, created) = IndexMap::open(path)?;
        if created {
            map.ensure_mapped(HEADER_LEN, true)?;
            Self::init_header(&mut map);
            map.unlock()?;
        } else {
            map.ensure_mapped(HEADER_LEN, false)?;
            Self::verify_header(&map)?;
            map.unlock()?;
        }
        Ok(DtmapStore { map, consumed: 0 })
    }

    fn init_header(map: &mut IndexMap) {
        let buf = map.as_mut_slice();
        buf[MAGIC_OFF..MAGIC_OFF + 5].copy_from_slice(MAGIC);
        buf[VER_OFF] = ABI_VERSION;
        unsafe {
            BeU64Cell::from_raw(buf.as_mut_ptr().add(DATA_LEN_OFF)).store(0, Ordering::Release);
            BeU64Cell::from_raw(buf.as_mut_ptr().add(TOTAL_TOKENS_OFF)).store(0, Ordering::Relaxed);
            BeU32Cell::from_raw(buf.as_mut_ptr().add(DOC_COUNT_OFF)).store(0, Ordering::Relaxed);
        }
    }

    fn verify_header(map: &IndexMap) -> Result<()> {
        let buf = map.as_slice();
        if &buf[MAGIC_OFF..MAGIC_OFF + 5] != MAGIC {
            return Err(NxsError::fatal("nxsdtmap: bad magic"));
        }
        if buf[VER_OFF] != ABI_VERSION {
            return Err(NxsError::fatal(format!(
                "nxsdtmap: unsupported ABI version {}",
                buf[VER_OFF]
            )));
        }
        Ok(())
    }

    fn data_len_cell(&mut self) -> BeU64Cell<'_> {
        unsafe { BeU64Cell::from_raw(self.map.as_mut_ptr().add(DATA_LEN_OFF)) }
    }

    fn total_tokens_cell(&mut self) -> BeU64Cell<'_> {
        unsafe { BeU64Cell::from_raw(self.map.as_mut_ptr().add(TOTAL_TOKENS_OFF)) }
    }

    fn doc_count_cell(&mut self) -> BeU32Cell<'_> {
        unsafe { BeU32Cell::from_raw(self.map.as_mut_ptr().add(DOC_COUNT_OFF)) }
    }

    pub fn data_len(&mut self) -> u64 {
        self.data_len_cell().load(Ordering::Acquire)
    }

    pub fn doc_count(&mut self) -> u32 {
        self.doc_count_cell().load(Ordering::Relaxed)
    }

    pub fn token_count(&mut self) -> u64 {
        self.total_tokens_cell().load(Ordering::Relaxed)
    }

    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    pub fn lock_exclusive(&self) -> Result<()> {
        self.map.lock_exclusive()
    }

    pub fn unlock(&self) -> Result<()> {
        self.map.unlock()
    }

    /// Replays unseen doc blocks into `doc_dir`/`term_dir`. `spec.md` §4.3
    /// *sync*. When `partial` is set, a block referencing an unknown term
    /// id stops the replay early rather than failing (`PARTIAL_SYNC`).
    pub fn sync(
        &mut self,
        doc_dir: &mut DocDirectory,
        term_dir: &mut TermDirectory,
        partial: bool,
    ) -> Result<()> {
        let data_len = self.data_len();
        if data_len == self.consumed {
            return Ok(());
        }
        self.map.ensure_mapped(HEADER_LEN + data_len, false)?;

        let mut cursor = self.consumed;
        while cursor < data_len {
            let abs = (HEADER_LEN + cursor) as usize;
            let buf = self.map.as_slice();
            if abs + 16 > buf.len() {
                return Err(NxsError::fatal("nxsdtmap: truncated block header"));
            }
            let doc_id = BigEndian::read_u64(&buf[abs..abs + 8]);
            let doc_len = BigEndian::read_u32(&buf[abs + 8..abs + 12]);
            let n = BigEndian::read_u32(&buf[abs + 12..abs + 16]) as usize;
            let total = block_len(n);
            if abs + total > buf.len() || cursor + total as u64 > data_len {
                return Err(NxsError::fatal("nxsdtmap: block overruns data_len"));
            }

            if doc_id == 0 {
                // Tombstoned in-place: skip, nothing to do.
                cursor += total as u64;
                continue;
            }

            if doc_len == 0 {
                // Deletion marker appended by `remove`.
                if let Some(doc) = doc_dir.remove(doc_id) {
                    for (term_id, _) in &doc.term_counts {
                        if let Some(term) = term_dir.lookup_by_id_mut(*term_id) {
                            term.doc_bitmap.remove(doc_id as u32);
                        }
                    }
                }
                cursor += total as u64;
                continue;
            }

            let mut term_counts = Vec::with_capacity(n);
            let mut resolved_all = true;
            for i in 0..n {
                let tup_off = abs + 16 + i * 8;
                let term_id = BigEndian::read_u32(&buf[tup_off..tup_off + 4]);
                let count = BigEndian::read_u32(&buf[tup_off + 4..tup_off + 8]);
                if term_dir.lookup_by_id(term_id).is_none() {
                    if partial {
                        resolved_all = false;
                        break;
                    }
                    return Err(NxsError::fatal(format!(
                        "nxsdtmap: unknown term id {term_id} during non-partial sync"
                    )));
                }
                term_counts.push((term_id, count));
            }

            if !resolved_all {
                // Stop advancing; come back once the terms mirror catches up.
                break;
            }

            for (term_id, _) in &term_counts {
                if let Some(term) = term_dir.lookup_by_id_mut(*term_id) {
                    term.doc_bitmap.insert(doc_id as u32);
                }
            }
            doc_dir.insert(Doc {
                id: doc_id,
                offset: HEADER_LEN + cursor,
                doc_len,
                term_counts,
            });

            cursor += total as u64;
        }
        self.consumed = cursor;
        debug!("nxsdtmap: synced to consumed={cursor} (data_len={data_len})");
        Ok(())
    }

    /// Appends a new doc block for `doc_id`, mutating `term_dir`'s bitmaps
    /// and `terms_store`'s occurrence counters as it goes, and updating the
    /// header's `doc_count`/`token_count`/`data_len`. `spec.md` §4.3 *append*.
    pub fn append(
        &mut self,
        terms_store: &mut TermsStore,
        term_dir: &mut TermDirectory,
        doc_dir: &mut DocDirectory,
        doc_id: u64,
        tuples: &[(u32, u32)],
        doc_len: u32,
    ) -> Result<()> {
        self.lock_exclusive()?;
        let result = self.append_locked(terms_store, term_dir, doc_dir, doc_id, tuples, doc_len);
        self.unlock()?;
        result
    }

    fn append_locked(
        &mut self,
        terms_store: &mut TermsStore,
        term_dir: &mut TermDirectory,
        doc_dir: &mut DocDirectory,
        doc_id: u64,
        tuples: &[(u32, u32)],
        doc_len: u32,
    ) -> Result<()> {
        let data_len = self.data_len();
        if self.consumed < data_len {
            terms_store.sync(term_dir)?;
            self.sync(doc_dir, term_dir, FULL_SYNC)?;
        }

        if doc_dir.contains(doc_id) {
            return Err(NxsError::Exists(format!("document {doc_id} already indexed")));
        }

        // Mutate bitmaps/counters first, tracking how far we got so a
        // mid-loop failure can be rewound.
        let mut applied = 0usize;
        for (term_id, count) in tuples {
            match term_dir.lookup_by_id_mut(*term_id) {
                Some(term) => {
                    term.doc_bitmap.insert(doc_id as u32);
                    let counter_offset = term.counter_offset;
                    term.total_count += *count as u64;
                    terms_store.incr_counter(counter_offset, *count as u64);
                    applied += 1;
                }
                None => {
                    self.rewind(term_dir, terms_store, doc_id, &tuples[..applied]);
                    return Err(NxsError::fatal(format!(
                        "dtmap append: unresolved term id {term_id}"
                    )));
                }
            }
        }

        let total = block_len(tuples.len());
        if let Err(e) = self.map.ensure_mapped(HEADER_LEN + data_len + total as u64, true) {
            self.rewind(term_dir, terms_store, doc_id, tuples);
            return Err(e);
        }

        let abs = (HEADER_LEN + data_len) as usize;
        {
            let buf = self.map.as_mut_slice();
            BigEndian::write_u64(&mut buf[abs..abs + 8], doc_id);
            BigEndian::write_u32(&mut buf[abs + 8..abs + 12], doc_len);
            BigEndian::write_u32(&mut buf[abs + 12..abs + 16], tuples.len() as u32);
            for (i, (term_id, count)) in tuples.iter().enumerate() {
                let tup_off = abs + 16 + i * 8;
                BigEndian::write_u32(&mut buf[tup_off..tup_off + 4], *term_id);
                BigEndian::write_u32(&mut buf[tup_off + 4..tup_off + 8], *count);
            }
        }

        let new_data_len = data_len + total as u64;
        self.total_tokens_cell().fetch_add(doc_len as u64, Ordering::Relaxed);
        self.doc_count_cell().fetch_add(1, Ordering::Relaxed);
        self.data_len_cell().store(new_data_len, Ordering::Release);
        self.consumed = new_data_len;
        let _ = self.map.flush_async();

        doc_dir.insert(Doc {
            id: doc_id,
            offset: HEADER_LEN + data_len,
            doc_len,
            term_counts: tuples.to_vec(),
        });
        Ok(())
    }

    fn rewind(
        &mut self,
        term_dir: &mut TermDirectory,
        terms_store: &mut TermsStore,
        doc_id: u64,
        applied: &[(u32, u32)],
    ) {
        for (term_id, count) in applied {
            if let Some(term) = term_dir.lookup_by_id_mut(*term_id) {
                term.doc_bitmap.remove(doc_id as u32);
                term.total_count = term.total_count.saturating_sub(*count as u64);
                terms_store.decr_counter(term.counter_offset, *count as u64);
            }
        }
    }

    /// Removes a live document: appends a deletion marker, decrements
    /// counters/bitmaps, tombstones the original block in place, and
    /// updates header counters. `spec.md` §4.3 *remove*.
    pub fn remove(
        &mut self,
        terms_store: &mut TermsStore,
        term_dir: &mut TermDirectory,
        doc_dir: &mut DocDirectory,
        doc_id: u64,
    ) -> Result<()> {
        self.lock_exclusive()?;
        let result = self.remove_locked(terms_store, term_dir, doc_dir, doc_id);
        self.unlock()?;
        result
    }

    fn remove_locked(
        &mut self,
        terms_store: &mut TermsStore,
        term_dir: &mut TermDirectory,
        doc_dir: &mut DocDirectory,
        doc_id: u64,
    ) -> Result<()> {
        terms_store.sync(term_dir)?;
        self.sync(doc_dir, term_dir, FULL_SYNC)?;

        let doc = doc_dir
            .lookup(doc_id)
            .cloned()
            .ok_or_else(|| NxsError::Missing(format!("document {doc_id} not found")))?;

        // Append the deletion-marker block so readers already past the
        // original offset learn about the removal on their next sync.
        let data_len = self.data_len();
        let marker_len = block_len(0);
        self.map.ensure_mapped(HEADER_LEN + data_len + marker_len as u64, true)?;
        let abs = (HEADER_LEN + data_len) as usize;
        {
            let buf = self.map.as_mut_slice();
            BigEndian::write_u64(&mut buf[abs..abs + 8], doc_id);
            BigEndian::write_u32(&mut buf[abs + 8..abs + 12], 0);
            BigEndian::write_u32(&mut buf[abs + 12..abs + 16], 0);
        }

        for (term_id, count) in &doc.term_counts {
            if let Some(term) = term_dir.lookup_by_id_mut(*term_id) {
                term.doc_bitmap.remove(doc_id as u32);
                term.total_count = term.total_count.saturating_sub(*count as u64);
                terms_store.decr_counter(term.counter_offset, *count as u64);
            }
        }

        // Tombstone the original block in place so a fresh opener skips it.
        {
            let orig_abs = doc.offset as usize;
            let buf = self.map.as_mut_slice();
            let cell = unsafe { BeU64Cell::from_raw(buf.as_mut_ptr().add(orig_abs)) };
            cell.store(0, Ordering::Release);
        }

        let new_data_len = data_len + marker_len as u64;
        self.doc_count_cell().fetch_sub(1, Ordering::Relaxed);
        self.total_tokens_cell()
            .fetch_sub(doc.doc_len as u64, Ordering::Relaxed);
        self.data_len_cell().store(new_data_len, Ordering::Release);
        self.consumed = new_data_len;
        let _ = self.map.flush_async();

        doc_dir.remove(doc_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::TermDirectory;
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, TermsStore, TermDirectory, DtmapStore, DocDirectory) {
        let dir = tempdir().unwrap();
        let mut term_dir = TermDirectory::new();
        let terms_store = TermsStore::open(&dir.path().join("nxsterms"), &mut term_dir).unwrap();
        let dtmap_store = DtmapStore::open(&dir.path().join("nxsdtmap")).unwrap();
        let doc_dir = DocDirectory::new();
        (dir, terms_store, term_dir, dtmap_store, doc_dir)
    }

    #[test]
    fn append_then_lookup_updates_counters_and_bitmaps() {
        let (_tmp, mut terms, mut term_dir, mut dtmap, mut doc_dir) = setup();
        let ids = terms
            .append(&mut term_dir, &[("abc".to_string(), 1), ("def".to_string(), 1)])
            .unwrap();
        let tuples: Vec<(u32, u32)> = ids.into_iter().map(|id| (id, 1)).collect();

        dtmap
            .append(&mut terms, &mut term_dir, &mut doc_dir, 1, &tuples, 2)
            .unwrap();

        assert_eq!(dtmap.doc_count(), 1);
        assert_eq!(dtmap.token_count(), 2);
        assert!(term_dir.lookup_by_id(tuples[0].0).unwrap().doc_bitmap.contains(1));
    }

    #[test]
    fn remove_then_sync_from_second_descriptor_hides_doc() {
        let dir = tempdir().unwrap();
        let terms_path = dir.path().join("nxsterms");
        let dtmap_path = dir.path().join("nxsdtmap");

        let mut term_dir = TermDirectory::new();
        let mut terms = TermsStore::open(&terms_path, &mut term_dir).unwrap();
        let mut dtmap = DtmapStore::open(&dtmap_path).unwrap();
        let mut doc_dir = DocDirectory::new();

        for doc_id in 1..=3u64 {
            let ids = terms
                .append(&mut term_dir, &[("abc".to_string(), 1), ("def".to_string(), 1), ("ghi".to_string(), 1)])
                .unwrap();
            let tuples: Vec<(u32, u32)> = ids.into_iter().map(|id| (id, 1)).collect();
            dtmap
                .append(&mut terms, &mut term_dir, &mut doc_dir, doc_id, &tuples, 3)
                .unwrap();
        }

        // A second independent descriptor, already synced to see doc 2.
        let mut alt_term_dir = TermDirectory::new();
        let mut alt_terms = TermsStore::open(&terms_path, &mut alt_term_dir).unwrap();
        let mut alt_dtmap = DtmapStore::open(&dtmap_path).unwrap();
        let mut alt_doc_dir = DocDirectory::new();
        alt_terms.sync(&mut alt_term_dir).unwrap();
        alt_dtmap.sync(&mut alt_doc_dir, &mut alt_term_dir, FULL_SYNC).unwrap();
        assert!(alt_doc_dir.contains(2));

        dtmap.remove(&mut terms, &mut term_dir, &mut doc_dir, 2).unwrap();
        assert!(!doc_dir.contains(2));
        assert_eq!(dtmap.doc_count(), 2);
        assert_eq!(dtmap.token_count(), 6);

        alt_dtmap.sync(&mut alt_doc_dir, &mut alt_term_dir, FULL_SYNC).unwrap();
        assert!(!alt_doc_dir.contains(2));
        assert!(alt_doc_dir.contains(1));
        assert!(alt_doc_dir.contains(3));
    }
}

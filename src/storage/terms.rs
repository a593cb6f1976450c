//! `TermsStore`: append-only on-disk list of terms plus per-term global
//! occurrence counters.
//!
//! Byte layout and state machine ported from
//! `original_source/src/index/terms.c` (`idx_terms_open`, `idx_terms_init`,
//! `idx_terms_add`, `idx_terms_sync`) and the header/block shapes in
//! `original_source/src/index/storage.h` (`idxterms_hdr_t`).

use std::path::Path;
use std::sync::atomic::Ordering;

use byteorder::{BigEndian, ByteOrder};
use log::{debug, warn};

use crate::directory::TermDirectory;
use crate::error::{NxsError, Result};
use crate::storage::bigendian::{BeU32Cell, BeU64Cell};
use crate::storage::indexmap::IndexMap;

pub const MAGIC: &[u8; 5] = b"NXS_T";
pub const ABI_VERSION: u8 = 1;
pub const HEADER_LEN: u64 = 16;

const MAGIC_OFF: usize = 0;
const VER_OFF: usize = 5;
const DATA_LEN_OFF: usize = 8;

/// Maximum encodable term value length (`spec.md` §3/§7: `LIMIT` above 65535).
pub const MAX_TERM_LEN: usize = 65_535;

fn block_prefix_len(value_len: usize) -> usize {
    2 + value_len + 1 // len (u16) + value + NUL
}

fn block_pad_len(value_len: usize) -> usize {
    let prefix = block_prefix_len(value_len);
    (8 - (prefix % 8)) % 8
}

fn block_len(value_len: usize) -> usize {
    block_prefix_len(value_len) + block_pad_len(value_len) + 8 // + counter
}

pub struct TermsStore {
    map: IndexMap,
    /// Data bytes (excluding the 16-byte header) this in-memory mirror has
    /// consumed so far — `terms_consumed` in `spec.md` §4.9.
    consumed: u64,
    /// Highest term id assigned so far — `terms_last_id`.
    last_id: u32,
}

impl TermsStore {
    /// Opens (creating if necessary) the terms file at `path`, performing
    /// an initial full sync into `dir` so the in-memory mirror starts
    /// consistent with whatever is already on disk.
    pub fn open(path: &Path, dir: &mut TermDirectory) -> Result<Self> {
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
        let mut store = TermsStore {
            map,
            consumed: 0,
            last_id: 0,
        };
        store.sync(dir)?;
        Ok(store)
    }

    fn init_header(map: &mut IndexMap) {
        let buf = map.as_mut_slice();
        buf[MAGIC_OFF..MAGIC_OFF + 5].copy_from_slice(MAGIC);
        buf[VER_OFF] = ABI_VERSION;
        let cell = unsafe { BeU32Cell::from_raw(buf.as_mut_ptr().add(DATA_LEN_OFF)) };
        cell.store(0, Ordering::Release);
    }

    fn verify_header(map: &IndexMap) -> Result<()> {
        let buf = map.as_slice();
        if &buf[MAGIC_OFF..MAGIC_OFF + 5] != MAGIC {
            return Err(NxsError::fatal("nxsterms: bad magic"));
        }
        if buf[VER_OFF] != ABI_VERSION {
            return Err(NxsError::fatal(format!(
                "nxsterms: unsupported ABI version {}",
                buf[VER_OFF]
            )));
        }
        Ok(())
    }

    fn data_len_cell(&mut self) -> BeU32Cell<'_> {
        unsafe { BeU32Cell::from_raw(self.map.as_mut_ptr().add(DATA_LEN_OFF)) }
    }

    pub fn data_len(&mut self) -> u64 {
        self.data_len_cell().load(Ordering::Acquire) as u64
    }

    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Global occurrence counter for a term at `counter_offset` (absolute
    /// file offset), as currently published in the mmap.
    pub fn counter(&mut self, counter_offset: u32) -> u64 {
        let ptr = unsafe { self.map.as_mut_ptr().add(counter_offset as usize) };
        let cell = unsafe { BeU64Cell::from_raw(ptr) };
        cell.load(Ordering::Relaxed)
    }

    pub fn incr_counter(&mut self, counter_offset: u32, delta: u64) -> u64 {
        let ptr = unsafe { self.map.as_mut_ptr().add(counter_offset as usize) };
        let cell = unsafe { BeU64Cell::from_raw(ptr) };
        cell.fetch_add(delta, Ordering::Relaxed)
    }

    pub fn decr_counter(&mut self, counter_offset: u32, delta: u64) -> u64 {
        let ptr = unsafe { self.map.as_mut_ptr().add(counter_offset as usize) };
        let cell = unsafe { BeU64Cell::from_raw(ptr) };
        cell.fetch_sub(delta, Ordering::Relaxed)
    }

    /// Extends the in-memory mirror (`dir`) to match the file's published
    /// `data_len`. `spec.md` §4.2 *sync*.
    pub fn sync(&mut self, dir: &mut TermDirectory) -> Result<()> {
        let data_len = self.data_len();
        if data_len == self.consumed {
            return Ok(());
        }
        self.map.ensure_mapped(HEADER_LEN + data_len, false)?;

        let mut cursor = self.consumed;
        while cursor < data_len {
            let abs = (HEADER_LEN + cursor) as usize;
            let buf = self.map.as_slice();
            if abs + 2 > buf.len() {
                return Err(NxsError::fatal("nxsterms: truncated block header"));
            }
            let value_len = BigEndian::read_u16(&buf[abs..abs + 2]) as usize;
            let prefix = block_prefix_len(value_len);
            let total = block_len(value_len);
            if abs + total > buf.len() || cursor + total as u64 > data_len {
                return Err(NxsError::fatal("nxsterms: block overruns data_len"));
            }
            let value_start = abs + 2;
            let value = std::str::from_utf8(&buf[value_start..value_start + value_len])
                .map_err(|_| NxsError::fatal("nxsterms: non-UTF-8 term value"))?
                .to_string();
            if buf[value_start + value_len] != 0 {
                return Err(NxsError::fatal("nxsterms: missing NUL terminator"));
            }
            let counter_off = abs + prefix + block_pad_len(value_len);
            let total_count = BigEndian::read_u64(&buf[counter_off..counter_off + 8]);

            self.last_id += 1;
            dir.insert(self.last_id, value, counter_off as u32, total_count);

            cursor += total as u64;
        }
        self.consumed = data_len;
        debug!("nxsterms: synced to data_len={data_len}, last_id={}", self.last_id);
        Ok(())
    }

    /// Appends every staged `(value, count)` pair, assigning sequential
    /// term ids and inserting into `dir`. `spec.md` §4.2 *append*.
    ///
    /// Returns the resolved term id for each input value, in input order.
    pub fn append(
        &mut self,
        dir: &mut TermDirectory,
        staged: &[(String, u32)],
    ) -> Result<Vec<u32>> {
        self.map.lock_exclusive()?;
        let result = self.append_locked(dir, staged);
        // Publish whatever was written even on a mid-loop failure; the
        // file is still well-formed because every block fully written so
        // far has already been accounted for in `cursor`/`data_len`.
        self.map.unlock()?;
        result
    }

    fn append_locked(&mut self, dir: &mut TermDirectory, staged: &[(String, u32)]) -> Result<Vec<u32>> {
        let data_len = self.data_len();
        if self.consumed < data_len {
            self.sync(dir)?;
        }

        let bound: usize = staged.iter().map(|(v, _)| block_len(v.len())).sum();
        self.map.ensure_mapped(HEADER_LEN + data_len + bound as u64, true)?;

        let mut cursor = data_len;
        let mut ids = Vec::with_capacity(staged.len());
        let append_result = (|| -> Result<()> {
            for (value, count) in staged {
                if let Some(term) = dir.lookup_by_value(value) {
                    ids.push(term.id);
                    continue;
                }
                if value.len() > MAX_TERM_LEN {
                    return Err(NxsError::limit(format!(
                        "term value too long: {} bytes",
                        value.len()
                    )));
                }
                if self.last_id == u32::MAX {
                    return Err(NxsError::limit("term id space exhausted"));
                }

                let abs = (HEADER_LEN + cursor) as usize;
                let total = block_len(value.len());
                {
                    let buf = self.map.as_mut_slice();
                    BigEndian::write_u16(&mut buf[abs..abs + 2], value.len() as u16);
                    let value_start = abs + 2;
                    buf[value_start..value_start + value.len()].copy_from_slice(value.as_bytes());
                    buf[value_start + value.len()] = 0;
                }
                let counter_off = abs + block_prefix_len(value.len()) + block_pad_len(value.len());
                {
                    let buf = self.map.as_mut_slice();
                    BigEndian::write_u64(&mut buf[counter_off..counter_off + 8], *count as u64);
                }

                self.last_id += 1;
                let id = dir.insert(self.last_id, value.clone(), counter_off as u32, *count as u64);
                ids.push(id);
                cursor += total as u64;
            }
            Ok(())
        })();

        self.consumed = cursor;
        self.data_len_cell().store(cursor as u32, Ordering::Release);
        let _ = self.map.flush_async();

        if let Err(e) = append_result {
            warn!("nxsterms: append failed mid-loop, partial data published: {e}");
            return Err(e);
        }
        Ok(ids)
    }
}

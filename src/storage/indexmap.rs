//! `IndexMap`: open/create/grow/memory-map a single backing file shared
//! across processes via an OS advisory whole-file lock.
//!
//! Ported from `original_source/src/index/idxmap.c` (`idx_db_open`,
//! `idx_db_map`, `idx_db_release`): the file-descriptor-plus-lock dance is
//! identical, just expressed with `std::fs`/`memmap2`/`fs4` instead of raw
//! `open(2)`/`mmap(2)`/`flock(2)`.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::thread;
use std::time::Duration;

use fs4::FileExt;
use memmap2::MmapMut;

use crate::error::{NxsError, Result};

/// Growth quantum for every backing file (`IDX_SIZE_STEP` in the original).
pub const SIZE_STEP: u64 = 32 * 1024;

fn round_up(len: u64, step: u64) -> u64 {
    (len + step - 1) / step * step
}

/// A memory-mapped, cross-process-locked append-only backing file.
pub struct IndexMap {
    file: File,
    mmap: Option<MmapMut>,
    mapped_len: u64,
}

impl IndexMap {
    /// Opens (or creates) `path`, following the protocol in `spec.md` §4.1.
    ///
    /// Returns the map with the appropriate lock still held: exclusive if
    /// this call created the file, shared otherwise. The caller is
    /// responsible for writing/verifying the header and then calling
    /// [`IndexMap::unlock`].
    pub fn open(path: &Path) -> Result<(Self, bool)> {
        const MAX_RETRIES: u32 = 10;

        for _ in 0..MAX_RETRIES {
            match OpenOptions::new().read(true).write(true).open(path) {
                Ok(file) => {
                    file.lock_shared()?;
                    if file.metadata()?.len() == 0 {
                        // Racing with a creator that hasn't truncated yet.
                        FileExt::unlock(&file)?;
                        drop(file);
                        thread::sleep(Duration::from_millis(5));
                        continue;
                    }
                    let map = IndexMap {
                        file,
                        mmap: None,
                        mapped_len: 0,
                    };
                    return Ok((map, false));
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    match OpenOptions::new()
                        .read(true)
                        .write(true)
                        .create_new(true)
                        .open(path)
                    {
                        Ok(file) => {
                            file.lock_exclusive()?;
                            file.set_len(SIZE_STEP)?;
                            let map = IndexMap {
                                file,
                                mmap: None,
                                mapped_len: 0,
                            };
                            return Ok((map, true));
                        }
                        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                            // Lost the create race; retry the open branch.
                            continue;
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(NxsError::Io(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("{}: gave up waiting for creator to initialize file", path.display()),
        )))
    }

    /// Ensures at least `target_len` bytes (rounded up to `SIZE_STEP`) are
    /// mapped, growing the file if `may_extend` and re-mapping as needed.
    /// Growing requires the caller to already hold the exclusive lock.
    pub fn ensure_mapped(&mut self, target_len: u64, may_extend: bool) -> Result<()> {
        let rounded = round_up(target_len, SIZE_STEP);
        if self.mapped_len >= rounded && self.mmap.is_some() {
            return Ok(());
        }

        let file_len = self.file.metadata()?.len();
        if file_len < rounded {
            if !may_extend {
                return Err(NxsError::fatal(format!(
                    "backing file too short: have {file_len}, need {rounded}"
                )));
            }
            self.file.set_len(rounded)?;
        }

        // Drop the old mapping before creating the new one.
        self.mmap = None;
        let mmap = unsafe { MmapMut::map_mut(&self.file)? };
        self.mapped_len = mmap.len() as u64;
        self.mmap = Some(mmap);
        Ok(())
    }

    pub fn as_slice(&self) -> &[u8] {
        self.mmap.as_ref().expect("not mapped").as_ref()
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.mmap.as_mut().expect("not mapped").as_mut()
    }

    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.mmap.as_mut().expect("not mapped").as_mut_ptr()
    }

    pub fn mapped_len(&self) -> u64 {
        self.mapped_len
    }

    pub fn lock_exclusive(&self) -> Result<()> {
        FileExt::lock_exclusive(&self.file)?;
        Ok(())
    }

    pub fn lock_shared(&self) -> Result<()> {
        FileExt::lock_shared(&self.file)?;
        Ok(())
    }

    pub fn unlock(&self) -> Result<()> {
        FileExt::unlock(&self.file)?;
        Ok(())
    }

    /// Asynchronous flush of dirty mmap pages, best-effort.
    pub fn flush_async(&self) -> Result<()> {
        if let Some(mmap) = &self.mmap {
            mmap.flush_async()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_then_open_grows_to_size_step() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nxsterms");

        let (mut map, created) = IndexMap::open(&path).unwrap();
        assert!(created);
        map.ensure_mapped(16, true).unwrap();
        assert_eq!(map.mapped_len(), SIZE_STEP);
        map.unlock().unwrap();

        let (mut map2, created2) = IndexMap::open(&path).unwrap();
        assert!(!created2);
        map2.ensure_mapped(16, false).unwrap();
        assert_eq!(map2.mapped_len(), SIZE_STEP);
        map2.unlock().unwrap();
    }

    #[test]
    fn round_up_matches_size_step_quanta() {
        assert_eq!(round_up(1, SIZE_STEP), SIZE_STEP);
        assert_eq!(round_up(SIZE_STEP, SIZE_STEP), SIZE_STEP);
        assert_eq!(round_up(SIZE_STEP + 1, SIZE_STEP), SIZE_STEP * 2);
    }
}

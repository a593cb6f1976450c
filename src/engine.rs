//! `Engine`: owns the base directory and the set of currently-open named
//! indexes.
//!
//! Grounded on `original_source/src/nxs.c` (`nxs_open`, `nxs_index_open`'s
//! double-open guard via a per-engine open-indexes registry, and the
//! mkdir/unlink symmetry `destroy_index` mirrors). `spec.md` §9: "carry
//! [global mutable state] as an explicit Engine context; no hidden
//! singletons" — so the open-indexes map lives here, guarded by
//! `parking_lot::Mutex`, rather than behind a process-wide static.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{NxsError, Result};
use crate::index::Index;
use crate::params::IndexParams;
use crate::tokenizer::{FilterPipeline, IdentityPipeline};

/// `NXS_BASEDIR` in `spec.md` §6: fallback for `open_base` when no path is
/// given explicitly.
pub const BASEDIR_ENV_VAR: &str = "NXS_BASEDIR";

fn validate_name(name: &str) -> Result<()> {
    if !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        Ok(())
    } else {
        Err(NxsError::invalid(format!(
            "index name {name:?} must match [A-Za-z0-9_-]+"
        )))
    }
}

pub struct Engine {
    data_dir: PathBuf,
    open: Mutex<std::collections::HashMap<String, Arc<Index>>>,
}

impl Engine {
    /// Ensures `<base_dir>/data/` exists. `spec.md` §6 `open_base`.
    pub fn open_base(base_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = base_dir.as_ref().join("data");
        std::fs::create_dir_all(&data_dir)?;
        Ok(Engine {
            data_dir,
            open: Mutex::new(std::collections::HashMap::new()),
        })
    }

    /// Falls back to `NXS_BASEDIR` when `base_dir` is `None`.
    pub fn open_base_env(base_dir: Option<&Path>) -> Result<Self> {
        match base_dir {
            Some(p) => Self::open_base(p),
            None => {
                let env = std::env::var(BASEDIR_ENV_VAR)
                    .map_err(|_| NxsError::invalid(format!("{BASEDIR_ENV_VAR} not set")))?;
                Self::open_base(env)
            }
        }
    }

    fn index_dir(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }

    /// Creates a new index using the default no-op filter pipeline. Use
    /// [`Engine::create_index_with_pipeline`] to install a real
    /// normalizer/stopwords/stemmer chain for the `filters` named in
    /// `params` (`spec.md` §4.5, §6) — the core does not implement their
    /// internals itself.
    pub fn create_index(&self, name: &str, params: IndexParams) -> Result<Arc<Index>> {
        self.create_index_with_pipeline(name, params, Box::new(IdentityPipeline))
    }

    pub fn create_index_with_pipeline(
        &self,
        name: &str,
        params: IndexParams,
        pipeline: Box<dyn FilterPipeline + Send + Sync>,
    ) -> Result<Arc<Index>> {
        validate_name(name)?;
        let mut open = self.open.lock();
        if open.contains_key(name) {
            return Err(NxsError::Exists(format!("index {name:?} already open")));
        }
        let dir = self.index_dir(name);
        if dir.exists() {
            return Err(NxsError::Exists(format!("index {name:?} already exists")));
        }
        let index = Arc::new(Index::create(dir, params, pipeline)?);
        open.insert(name.to_string(), index.clone());
        Ok(index)
    }

    /// Opens an existing index using the default no-op filter pipeline. Use
    /// [`Engine::open_index_with_pipeline`] to install the same pipeline
    /// the index was created with.
    pub fn open_index(&self, name: &str) -> Result<Arc<Index>> {
        self.open_index_with_pipeline(name, Box::new(IdentityPipeline))
    }

    /// Fails with [`NxsError::Exists`] if `name` is already open in this
    /// process, mirroring `nxs_index_open`'s double-open guard rather than
    /// handing back the existing handle.
    pub fn open_index_with_pipeline(
        &self,
        name: &str,
        pipeline: Box<dyn FilterPipeline + Send + Sync>,
    ) -> Result<Arc<Index>> {
        validate_name(name)?;
        let mut open = self.open.lock();
        if open.contains_key(name) {
            return Err(NxsError::Exists(format!("index {name:?} already open")));
        }
        let dir = self.index_dir(name);
        if !dir.exists() {
            return Err(NxsError::Missing(format!("index {name:?} not found")));
        }
        let index = Arc::new(Index::open(dir, pipeline)?);
        open.insert(name.to_string(), index.clone());
        Ok(index)
    }

    pub fn close_index(&self, name: &str) -> Result<()> {
        let mut open = self.open.lock();
        open.remove(name)
            .map(|_| ())
            .ok_or_else(|| NxsError::Missing(format!("index {name:?} not open")))
    }

    /// Removes an index's on-disk files. The index must not be open.
    pub fn destroy_index(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        let open = self.open.lock();
        if open.contains_key(name) {
            return Err(NxsError::invalid(format!(
                "index {name:?} is open; close it before destroying"
            )));
        }
        drop(open);
        let dir = self.index_dir(name);
        if !dir.exists() {
            return Err(NxsError::Missing(format!("index {name:?} not found")));
        }
        std::fs::remove_dir_all(&dir)?;
        Ok(())
    }
}

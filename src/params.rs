//! Index and search parameters.
//!
//! `params.db` is a small `serde_json`-serialized document rather than the
//! original's bespoke binary key/value format — the wire format of that
//! file is explicitly out of scope (`spec.md` §1: "parameter serialization
//! format"), only the recognized keys and their defaults (§6) are.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{NxsError, Result};

pub const DEFAULT_RESULTS_LIMIT: u64 = 1000;
pub const DEFAULT_RANKING_ALGO: &str = "BM25";
pub const DEFAULT_LANGUAGE: &str = "en";

/// Ranking algorithm selected at search time (or carried as the index's
/// default via `IndexParams::algo`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RankingAlgo {
    TfIdf,
    Bm25,
}

impl RankingAlgo {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "TF-IDF" | "TFIDF" => Some(RankingAlgo::TfIdf),
            "BM25" => Some(RankingAlgo::Bm25),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RankingAlgo::TfIdf => "TF-IDF",
            RankingAlgo::Bm25 => "BM25",
        }
    }
}

/// Persistent, per-index configuration stored at `<base>/data/<name>/params.db`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexParams {
    #[serde(default = "default_filters")]
    pub filters: Vec<String>,
    #[serde(default = "default_algo")]
    pub algo: String,
    #[serde(default = "default_lang")]
    pub lang: String,
}

fn default_filters() -> Vec<String> {
    vec![
        "normalizer".to_string(),
        "stopwords".to_string(),
        "stemmer".to_string(),
    ]
}

fn default_algo() -> String {
    DEFAULT_RANKING_ALGO.to_string()
}

fn default_lang() -> String {
    DEFAULT_LANGUAGE.to_string()
}

impl Default for IndexParams {
    fn default() -> Self {
        Self {
            filters: default_filters(),
            algo: default_algo(),
            lang: default_lang(),
        }
    }
}

impl IndexParams {
    pub fn ranking_algo(&self) -> Result<RankingAlgo> {
        RankingAlgo::parse(&self.algo)
            .ok_or_else(|| NxsError::invalid(format!("unknown algorithm: {}", self.algo)))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| NxsError::fatal(format!("corrupt params.db: {e}")))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self)
            .map_err(|e| NxsError::fatal(format!("failed to serialize params: {e}")))?;
        fs::write(path, bytes)?;
        Ok(())
    }
}

/// Search-only parameters, parsed fresh on every `search` call (never
/// persisted). Mirrors `original_source/src/query/search.c`'s
/// `get_search_params`.
#[derive(Debug, Clone)]
pub struct SearchParams {
    pub limit: u64,
    pub algo: RankingAlgo,
    pub fuzzymatch: bool,
}

impl SearchParams {
    /// `index_algo` is the index's configured default, used when the caller
    /// doesn't override `algo`.
    pub fn from_map(
        map: &serde_json::Map<String, serde_json::Value>,
        index_algo: RankingAlgo,
    ) -> Result<Self> {
        let mut sp = SearchParams {
            limit: DEFAULT_RESULTS_LIMIT,
            algo: index_algo,
            fuzzymatch: true,
        };

        if let Some(v) = map.get("limit") {
            let limit = v
                .as_u64()
                .ok_or_else(|| NxsError::invalid("limit must be an unsigned integer"))?;
            if limit == 0 || limit > u32::MAX as u64 {
                return Err(NxsError::invalid("invalid limit"));
            }
            sp.limit = limit;
        }
        if let Some(v) = map.get("algo") {
            let s = v
                .as_str()
                .ok_or_else(|| NxsError::invalid("algo must be a string"))?;
            sp.algo = RankingAlgo::parse(s)
                .ok_or_else(|| NxsError::invalid("invalid algorithm"))?;
        }
        if let Some(v) = map.get("fuzzymatch") {
            let b = v
                .as_bool()
                .ok_or_else(|| NxsError::invalid("fuzzymatch must be a bool"))?;
            sp.fuzzymatch = b;
        }
        Ok(sp)
    }
}

impl Default for SearchParams {
    fn default() -> Self {
        SearchParams {
            limit: DEFAULT_RESULTS_LIMIT,
            algo: RankingAlgo::Bm25,
            fuzzymatch: true,
        }
    }
}

//! nxsearch — an embeddable full-text search engine.
//!
//! A host process opens a base directory (`Engine::open_base`) and,
//! within it, creates or opens named indexes. Each index append-only
//! memory-maps two files — a terms table and a document-term table — and
//! layers an in-memory mirror (term/doc directories, a BK-tree fuzzy
//! index) on top for fast lookup. `add`/`remove`/`search` drive the state
//! transitions described in `SPEC_FULL.md`.

pub mod directory;
pub mod document;
pub mod engine;
pub mod error;
pub mod fuzzy;
pub mod heap;
pub mod index;
pub mod params;
pub mod query;
pub mod ranker;
pub mod response;
pub mod storage;
pub mod tokenizer;

pub use document::Document;
pub use engine::Engine;
pub use error::{ErrorKind, NxsError, Result};
pub use index::{Index, IndexStats};
pub use params::{IndexParams, RankingAlgo, SearchParams};
pub use query::Expr;
pub use response::{Hit, Response};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

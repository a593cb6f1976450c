//! Error classification shared by every public operation.
//!
//! Collapses the storage, concurrency and search layers onto the seven-way
//! classification the embedding application sees: `SUCCESS` is simply
//! `Ok(_)`, the rest map one-to-one onto [`NxsError`] variants.

use std::fmt;

/// Symbolic error code, for callers that want to branch on classification
/// rather than match the error variant directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Fatal,
    System,
    Invalid,
    Exists,
    Missing,
    Limit,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Fatal => "FATAL",
            ErrorKind::System => "SYSTEM",
            ErrorKind::Invalid => "INVALID",
            ErrorKind::Exists => "EXISTS",
            ErrorKind::Missing => "MISSING",
            ErrorKind::Limit => "LIMIT",
        };
        f.write_str(s)
    }
}

/// The one error type returned by every fallible operation in this crate.
#[derive(Debug, thiserror::Error)]
pub enum NxsError {
    /// I/O, mmap, truncate, flock failures. Attaches the underlying OS error.
    #[error("system error: {0}")]
    Io(#[from] std::io::Error),

    /// Corruption: bad magic/version, malformed block, a dtmap block
    /// referencing a term id that a non-partial sync cannot resolve.
    #[error("fatal index corruption: {0}")]
    Fatal(String),

    /// Bad caller input: invalid name, zero doc id, doc id overflowing
    /// `u32`, unknown `algo`, bad `limit`, recursion depth exceeded.
    #[error("invalid input: {0}")]
    Invalid(String),

    /// Index or document already present.
    #[error("already exists: {0}")]
    Exists(String),

    /// Index or document not present.
    #[error("not found: {0}")]
    Missing(String),

    /// Term length over 65535 bytes, term-id space exhausted, or the query
    /// nesting limit was reached.
    #[error("limit exceeded: {0}")]
    Limit(String),
}

impl NxsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NxsError::Io(_) => ErrorKind::System,
            NxsError::Fatal(_) => ErrorKind::Fatal,
            NxsError::Invalid(_) => ErrorKind::Invalid,
            NxsError::Exists(_) => ErrorKind::Exists,
            NxsError::Missing(_) => ErrorKind::Missing,
            NxsError::Limit(_) => ErrorKind::Limit,
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        NxsError::Invalid(msg.into())
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        NxsError::Fatal(msg.into())
    }

    pub fn limit(msg: impl Into<String>) -> Self {
        NxsError::Limit(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, NxsError>;

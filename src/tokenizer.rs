//! Tokenizer, `TokenSet`, and the `FilterPipeline` contract.
//!
//! Grounded on `original_source/src/core/tokenizer.h`/`tokenizer.c`
//! (UAX #29 word-boundary segmentation feeding a filter chain) and
//! `filters.h` (the `run(filter, buf) -> Action` contract). Word-boundary
//! segmentation itself is delegated to `unicode_segmentation`, since no
//! ICU binding is present in the teacher's dependency stack — see
//! `DESIGN.md`.

use rustc_hash::FxHashMap;
use unicode_segmentation::UnicodeSegmentation;

use crate::directory::TermDirectory;

/// A raw word-like segment emitted by the tokenizer, pre-filter.
#[derive(Debug, Clone)]
pub struct Token {
    pub value: String,
    pub count: u32,
    pub resolved_term: Option<u32>,
}

/// The action a `FilterPipeline` step takes on a token buffer.
pub enum FilterAction {
    /// The buffer was rewritten in place; use it as the token value.
    Mutation,
    /// Drop the token entirely.
    Discard,
    /// Abort tokenization with an error.
    Error(String),
}

/// External collaborator per `spec.md` §4.5/§9: "the core only needs the
/// `run(filter, buf) -> Action` contract; [its] internals are not
/// replicated here." `IdentityPipeline` is the only implementation the
/// core itself ships — a stand-in for whatever normalizer/stopwords/
/// stemmer chain an embedder installs.
pub trait FilterPipeline {
    fn run(&self, buf: &mut String) -> FilterAction;
}

/// No-op pipeline: every token passes through unchanged.
#[derive(Default, Clone, Copy)]
pub struct IdentityPipeline;

impl FilterPipeline for IdentityPipeline {
    fn run(&self, _buf: &mut String) -> FilterAction {
        FilterAction::Mutation
    }
}

/// Deduplicated ordered collection of token values with counts and
/// resolution state, plus a staging sublist of unresolved tokens.
/// `spec.md` §3.
#[derive(Default)]
pub struct TokenSet {
    order: Vec<Token>,
    index: FxHashMap<String, usize>,
    staged: Vec<usize>,
    /// Sum of value byte lengths across all distinct tokens.
    data_len: u64,
    /// Total occurrences including repeats.
    seen: u64,
}

impl TokenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an occurrence of `value`, creating a new token or
    /// incrementing an existing one's count.
    pub fn push(&mut self, value: &str) {
        self.seen += 1;
        if let Some(&idx) = self.index.get(value) {
            self.order[idx].count += 1;
            return;
        }
        let idx = self.order.len();
        self.data_len += value.len() as u64;
        self.index.insert(value.to_string(), idx);
        self.order.push(Token {
            value: value.to_string(),
            count: 1,
            resolved_term: None,
        });
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn seen(&self) -> u64 {
        self.seen
    }

    pub fn data_len(&self) -> u64 {
        self.data_len
    }

    pub fn staged_count(&self) -> usize {
        self.staged.len()
    }

    pub fn tokens(&self) -> &[Token] {
        &self.order
    }

    pub fn tokens_mut(&mut self) -> &mut [Token] {
        &mut self.order
    }

    /// Staged tokens as `(value, count)` pairs, in staging order — the
    /// shape `TermsStore::append` consumes.
    pub fn staged_pairs(&self) -> Vec<(String, u32)> {
        self.staged
            .iter()
            .map(|&idx| (self.order[idx].value.clone(), self.order[idx].count))
            .collect()
    }

    /// Attaches resolved term ids to staged tokens, in the same order
    /// `staged_pairs` produced them, clearing the staging list.
    pub fn attach_staged_resolutions(&mut self, ids: &[u32]) {
        debug_assert_eq!(ids.len(), self.staged.len());
        for (&idx, &id) in self.staged.iter().zip(ids.iter()) {
            self.order[idx].resolved_term = Some(id);
        }
        self.staged.clear();
    }

    /// Sorted `(term_id, count)` tuples for every resolved token — the
    /// shape `DtmapStore::append` wants. Callers must ensure resolution
    /// (typically via `resolve` with `STAGE`) ran first.
    pub fn resolved_tuples(&self) -> Vec<(u32, u32)> {
        let mut tuples: Vec<(u32, u32)> = self
            .order
            .iter()
            .filter_map(|t| t.resolved_term.map(|id| (id, t.count)))
            .collect();
        tuples.sort_unstable_by_key(|&(id, _)| id);
        tuples
    }
}

/// Flags controlling `resolve`'s behavior on an unresolved token.
/// `STAGE` and `TRIM` are mutually exclusive (`spec.md` §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveFlags(u8);

impl ResolveFlags {
    pub const NONE: ResolveFlags = ResolveFlags(0);
    pub const STAGE: ResolveFlags = ResolveFlags(0b001);
    pub const FUZZYMATCH: ResolveFlags = ResolveFlags(0b010);
    pub const TRIM: ResolveFlags = ResolveFlags(0b100);

    pub fn contains(self, other: ResolveFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for ResolveFlags {
    type Output = ResolveFlags;
    fn bitor(self, rhs: ResolveFlags) -> ResolveFlags {
        ResolveFlags(self.0 | rhs.0)
    }
}

/// Splits `text` into word-boundary segments (UAX #29), dropping segments
/// that carry no alphanumeric content (whitespace/punctuation-only
/// boundaries), and runs each surviving segment through `pipeline`.
/// `spec.md` §4.5, §8 "Round-trip tokens".
pub fn tokenize(text: &str, pipeline: &dyn FilterPipeline) -> crate::error::Result<TokenSet> {
    let mut set = TokenSet::new();
    for word in text.split_word_bounds() {
        if !word.chars().any(|c| c.is_alphanumeric()) {
            continue;
        }
        let mut buf = word.to_string();
        match pipeline.run(&mut buf) {
            FilterAction::Discard => continue,
            FilterAction::Error(msg) => return Err(crate::error::NxsError::invalid(msg)),
            FilterAction::Mutation => {
                if !buf.is_empty() {
                    set.push(&buf);
                }
            }
        }
    }
    Ok(set)
}

/// Resolves every token in `set` against `dir`, per `spec.md` §4.5.
pub fn resolve(
    set: &mut TokenSet,
    dir: &TermDirectory,
    flags: ResolveFlags,
) -> crate::error::Result<()> {
    if flags.contains(ResolveFlags::STAGE) && flags.contains(ResolveFlags::TRIM) {
        return Err(crate::error::NxsError::invalid(
            "resolve: STAGE and TRIM are mutually exclusive",
        ));
    }

    let mut stage_indices = Vec::new();
    let mut trim_indices = Vec::new();

    for (idx, token) in set.order.iter_mut().enumerate() {
        if let Some(term) = dir.lookup_by_value(&token.value) {
            token.resolved_term = Some(term.id);
            continue;
        }
        if flags.contains(ResolveFlags::FUZZYMATCH) {
            if let Some(id) = dir.fuzzy_search(&token.value) {
                token.resolved_term = Some(id);
                continue;
            }
        }
        if flags.contains(ResolveFlags::STAGE) {
            stage_indices.push(idx);
        } else if flags.contains(ResolveFlags::TRIM) {
            trim_indices.push(idx);
        }
    }

    if !stage_indices.is_empty() {
        set.staged = stage_indices;
    }

    if !trim_indices.is_empty() {
        let keep: std::collections::HashSet<usize> = (0..set.order.len())
            .filter(|i| !trim_indices.contains(i))
            .collect();
        let mut new_order = Vec::with_capacity(keep.len());
        let mut new_index = FxHashMap::default();
        for (old_idx, token) in set.order.drain(..).enumerate() {
            if !keep.contains(&old_idx) {
                continue;
            }
            let new_idx = new_order.len();
            new_index.insert(token.value.clone(), new_idx);
            new_order.push(token);
        }
        set.order = new_order;
        set.index = new_index;
    }

    Ok(())
}

//! TF-IDF and BM25 scoring functions over `(Index, Term, Doc)`.
//!
//! Formulas ported verbatim from `original_source/src/algo/ranking.c` —
//! note this is **not** the Okapi BM25 form the teacher's
//! `profiles::ensemble::Bm25Params::score` uses; see `DESIGN.md`.

use crate::directory::{Doc, Term};
use crate::params::RankingAlgo;

pub const BM25_K: f64 = 1.2;
pub const BM25_B: f64 = 0.75;

/// `spec.md` §4.7: `log(tf+1) x (log(N/df) + 1)`. Returns `NaN` if
/// `tf <= 0` (doc concurrently removed mid-score).
pub fn tfidf(term: &Term, doc: &Doc, doc_count: u64) -> f64 {
    let tf = doc.term_count(term.id).unwrap_or(0) as f64;
    if tf <= 0.0 {
        return f64::NAN;
    }
    let df = term.doc_bitmap.len() as f64;
    (tf + 1.0).ln() * ((doc_count as f64 / df).ln() + 1.0)
}

/// `spec.md` §4.7 BM25 with `k=1.2, b=0.75`. Returns `NaN` if `tf <= 0`
/// or `adl == 0`.
pub fn bm25(term: &Term, doc: &Doc, doc_count: u64, token_count: u64) -> f64 {
    let tf = doc.term_count(term.id).unwrap_or(0) as f64;
    if tf <= 0.0 {
        return f64::NAN;
    }
    if doc_count == 0 {
        return f64::NAN;
    }
    let adl = token_count as f64 / doc_count as f64;
    if adl == 0.0 {
        return f64::NAN;
    }
    let df = term.doc_bitmap.len() as f64;
    let n = doc_count as f64;
    let dl = doc.doc_len as f64;

    let tf_prime = (tf + 1.0).ln();
    let denom = tf_prime + BM25_K * (1.0 - BM25_B + BM25_B * dl / adl);
    let idf = (((n - df + 0.5) / (df + 0.5)) + 1.0).ln();
    (tf_prime / denom) * idf
}

/// Dispatches on the configured algorithm. A negative/NaN score
/// contributes nothing (`spec.md` §4.6 step 5).
pub fn score(algo: RankingAlgo, term: &Term, doc: &Doc, doc_count: u64, token_count: u64) -> f64 {
    match algo {
        RankingAlgo::TfIdf => tfidf(term, doc, doc_count),
        RankingAlgo::Bm25 => bm25(term, doc, doc_count, token_count),
    }
}

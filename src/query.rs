//! Boolean expression tree over term bitmaps.
//!
//! Ported from `original_source/src/query/expr.c` (`expr_create`,
//! `get_expr_bitmap`) — parsing itself is explicitly out of scope
//! (`spec.md` §1); this module consumes an already-built tree with token
//! strings at the leaves.

use roaring::RoaringBitmap;

use crate::directory::TermDirectory;
use crate::error::{NxsError, Result};
use crate::tokenizer::{self, FilterPipeline, ResolveFlags};

/// `NXS_QUERY_RLIMIT` in the original: maximum expression nesting depth.
pub const QUERY_RECURSION_LIMIT: u32 = 100;

/// A parsed boolean expression tree. Leaves carry a raw token string;
/// resolution against a `TermDirectory` happens once, up front, via
/// [`Expr::resolve_leaves`].
#[derive(Debug, Clone)]
pub enum Expr {
    Leaf(String),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    /// `Not(children)` means `children[0] AND NOT children[1] AND NOT ...`.
    Not(Vec<Expr>),
}

/// A leaf token after running it through the filter pipeline and
/// resolving it against the index — `term` is `None` if the value didn't
/// resolve (`spec.md` §4.6 step 2: "that is fine").
struct ResolvedLeaf {
    term_id: Option<u32>,
}

/// Walks every `Leaf` in `expr`, tokenizes+resolves its raw value, and
/// returns the resolved term id (if any) per leaf in tree order — needed
/// so `evaluate` and the ranker's per-term walk share one resolution pass.
fn resolve_leaves(
    expr: &Expr,
    dir: &TermDirectory,
    pipeline: &dyn FilterPipeline,
    fuzzymatch: bool,
    out: &mut Vec<(String, ResolvedLeaf)>,
) -> Result<()> {
    match expr {
        Expr::Leaf(value) => {
            let mut set = tokenizer::tokenize(value, pipeline)?;
            let mut flags = ResolveFlags::TRIM;
            if fuzzymatch {
                flags = flags | ResolveFlags::FUZZYMATCH;
            }
            tokenizer::resolve(&mut set, dir, flags)?;
            let term_id = set.tokens().first().and_then(|t| t.resolved_term);
            out.push((value.clone(), ResolvedLeaf { term_id }));
            Ok(())
        }
        Expr::And(children) | Expr::Or(children) | Expr::Not(children) => {
            for c in children {
                resolve_leaves(c, dir, pipeline, fuzzymatch, out)?;
            }
            Ok(())
        }
    }
}

/// Every resolved term id present anywhere in the tree, in leaf order —
/// used by `SearchPath` to drive the per-doc ranking walk.
pub fn leaf_term_ids(
    expr: &Expr,
    dir: &TermDirectory,
    pipeline: &dyn FilterPipeline,
    fuzzymatch: bool,
) -> Result<Vec<u32>> {
    let mut leaves = Vec::new();
    resolve_leaves(expr, dir, pipeline, fuzzymatch, &mut leaves)?;
    Ok(leaves
        .into_iter()
        .filter_map(|(_, leaf)| leaf.term_id)
        .collect())
}

/// Evaluates `expr` into a doc-id bitmap. `spec.md` §4.6 step 4.
pub fn evaluate(
    expr: &Expr,
    dir: &TermDirectory,
    pipeline: &dyn FilterPipeline,
    fuzzymatch: bool,
) -> Result<RoaringBitmap> {
    evaluate_depth(expr, dir, pipeline, fuzzymatch, 0)
}

fn evaluate_depth(
    expr: &Expr,
    dir: &TermDirectory,
    pipeline: &dyn FilterPipeline,
    fuzzymatch: bool,
    depth: u32,
) -> Result<RoaringBitmap> {
    if depth > QUERY_RECURSION_LIMIT {
        return Err(NxsError::limit("query expression nesting limit exceeded"));
    }

    match expr {
        Expr::Leaf(value) => {
            let mut set = tokenizer::tokenize(value, pipeline)?;
            let mut flags = ResolveFlags::TRIM;
            if fuzzymatch {
                flags = flags | ResolveFlags::FUZZYMATCH;
            }
            tokenizer::resolve(&mut set, dir, flags)?;
            match set.tokens().first().and_then(|t| t.resolved_term) {
                Some(id) => Ok(dir
                    .lookup_by_id(id)
                    .map(|t| t.doc_bitmap.clone())
                    .unwrap_or_default()),
                None => Ok(RoaringBitmap::new()),
            }
        }
        Expr::And(children) => {
            let mut iter = children.iter();
            let Some(first) = iter.next() else {
                return Ok(RoaringBitmap::new());
            };
            let mut acc = evaluate_depth(first, dir, pipeline, fuzzymatch, depth + 1)?;
            for child in iter {
                let bm = evaluate_depth(child, dir, pipeline, fuzzymatch, depth + 1)?;
                acc &= bm;
            }
            Ok(acc)
        }
        Expr::Or(children) => {
            let mut acc = RoaringBitmap::new();
            for child in children {
                let bm = evaluate_depth(child, dir, pipeline, fuzzymatch, depth + 1)?;
                acc |= bm;
            }
            Ok(acc)
        }
        Expr::Not(children) => {
            let mut iter = children.iter();
            let Some(first) = iter.next() else {
                return Ok(RoaringBitmap::new());
            };
            let mut acc = evaluate_depth(first, dir, pipeline, fuzzymatch, depth + 1)?;
            for child in iter {
                let bm = evaluate_depth(child, dir, pipeline, fuzzymatch, depth + 1)?;
                acc -= bm;
            }
            Ok(acc)
        }
    }
}

/// `true` if the tree has no leaves at all (an empty query).
pub fn is_empty(expr: &Expr) -> bool {
    match expr {
        Expr::Leaf(v) => v.trim().is_empty(),
        Expr::And(c) | Expr::Or(c) | Expr::Not(c) => c.is_empty() || c.iter().all(is_empty),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::IdentityPipeline;

    fn seed_dir() -> TermDirectory {
        let mut dir = TermDirectory::new();
        let cat = dir.insert(1, "cat".to_string(), 16, 3);
        let dog = dir.insert(2, "dog".to_string(), 24, 2);
        dir.lookup_by_id_mut(cat).unwrap().doc_bitmap.insert(1);
        dir.lookup_by_id_mut(cat).unwrap().doc_bitmap.insert(2);
        dir.lookup_by_id_mut(dog).unwrap().doc_bitmap.insert(2);
        dir
    }

    #[test]
    fn and_intersects_bitmaps() {
        let dir = seed_dir();
        let expr = Expr::And(vec![Expr::Leaf("cat".into()), Expr::Leaf("dog".into())]);
        let bm = evaluate(&expr, &dir, &IdentityPipeline, false).unwrap();
        assert_eq!(bm.iter().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn or_unions_bitmaps() {
        let dir = seed_dir();
        let expr = Expr::Or(vec![Expr::Leaf("cat".into()), Expr::Leaf("dog".into())]);
        let bm = evaluate(&expr, &dir, &IdentityPipeline, false).unwrap();
        assert_eq!(bm.iter().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn not_subtracts_remaining_children() {
        let dir = seed_dir();
        let expr = Expr::Not(vec![Expr::Leaf("cat".into()), Expr::Leaf("dog".into())]);
        let bm = evaluate(&expr, &dir, &IdentityPipeline, false).unwrap();
        assert_eq!(bm.iter().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn unresolved_leaf_yields_empty_bitmap_not_error() {
        let dir = seed_dir();
        let expr = Expr::Leaf("nonexistent".into());
        let bm = evaluate(&expr, &dir, &IdentityPipeline, false).unwrap();
        assert!(bm.is_empty());
    }

    #[test]
    fn recursion_limit_is_enforced() {
        let dir = TermDirectory::new();
        let mut expr = Expr::Leaf("x".into());
        for _ in 0..QUERY_RECURSION_LIMIT + 5 {
            expr = Expr::And(vec![expr]);
        }
        let err = evaluate(&expr, &dir, &IdentityPipeline, false).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Limit);
    }

    #[test]
    fn leaf_term_ids_collects_resolved_ids_in_order() {
        let dir = seed_dir();
        let expr = Expr::And(vec![Expr::Leaf("cat".into()), Expr::Leaf("dog".into())]);
        let ids = leaf_term_ids(&expr, &dir, &IdentityPipeline, false).unwrap();
        assert_eq!(ids, vec![1, 2]);
    }
}

//! End-to-end scenarios, ported from the worked examples in `spec.md` §8.

use nxsearch::tokenizer::{FilterAction, FilterPipeline};
use nxsearch::{Engine, Expr, IndexParams, RankingAlgo, SearchParams};
use tempfile::tempdir;

/// Strips a trailing "es" or "s" — a stand-in for the normalizer/stemmer
/// chain an embedder installs via the documented `filters` param
/// (`spec.md` §4.5/§6); the core itself ships only `IdentityPipeline`.
struct ToyStemmer;

impl FilterPipeline for ToyStemmer {
    fn run(&self, buf: &mut String) -> FilterAction {
        let lower = buf.to_ascii_lowercase();
        if let Some(stem) = lower.strip_suffix("es") {
            *buf = stem.to_string();
        } else if let Some(stem) = lower.strip_suffix('s') {
            *buf = stem.to_string();
        } else {
            *buf = lower;
        }
        FilterAction::Mutation
    }
}

fn assert_close(got: f64, want: f64, label: &str) {
    assert!(
        (got - want).abs() < 1e-3,
        "{label}: got {got}, want {want}"
    );
}

#[test]
fn scenario_1_single_match_tfidf_and_bm25() {
    let base = tempdir().unwrap();
    let engine = Engine::open_base(base.path()).unwrap();
    let idx = engine
        .create_index_with_pipeline("corpus", IndexParams::default(), Box::new(ToyStemmer))
        .unwrap();

    idx.add(1, "The quick brown fox jumped over the lazy dog").unwrap();
    idx.add(2, "Once upon a time there were three little foxes").unwrap();

    let mut params = SearchParams::default();
    params.algo = RankingAlgo::TfIdf;
    let resp = idx.search(&Expr::Leaf("dog".into()), &params).unwrap();
    assert_eq!(resp.count(), 1);
    let hit = resp.iter().next().unwrap();
    assert_eq!(hit.doc_id, 1);
    assert_close(hit.score, 1.1736, "scenario 1 TF-IDF");

    params.algo = RankingAlgo::Bm25;
    let resp = idx.search(&Expr::Leaf("dog".into()), &params).unwrap();
    let hit = resp.iter().next().unwrap();
    assert_close(hit.score, 0.2538, "scenario 1 BM25");
}

#[test]
fn scenario_2_fuzzy_stemmed_match_scores_equal() {
    let base = tempdir().unwrap();
    let engine = Engine::open_base(base.path()).unwrap();
    let idx = engine
        .create_index_with_pipeline("corpus", IndexParams::default(), Box::new(ToyStemmer))
        .unwrap();

    idx.add(1, "The quick brown fox jumped over the lazy dog").unwrap();
    idx.add(2, "Once upon a time there were three little foxes").unwrap();

    let mut params = SearchParams::default();
    params.algo = RankingAlgo::TfIdf;
    let resp = idx.search(&Expr::Leaf("fox".into()), &params).unwrap();
    assert_eq!(resp.count(), 2);
    for hit in resp.iter() {
        assert_close(hit.score, 0.6931, "scenario 2 TF-IDF");
    }

    params.algo = RankingAlgo::Bm25;
    let resp = idx.search(&Expr::Leaf("fox".into()), &params).unwrap();
    assert_eq!(resp.count(), 2);
    for hit in resp.iter() {
        assert_close(hit.score, 0.0668, "scenario 2 BM25");
    }
}

#[test]
fn scenario_3_higher_term_frequency_outranks() {
    let base = tempdir().unwrap();
    let engine = Engine::open_base(base.path()).unwrap();
    let idx = engine.create_index("corpus", IndexParams::default()).unwrap();

    idx.add(1, "cat dog rat").unwrap();
    idx.add(2, "cat cat dog").unwrap();

    for algo in [RankingAlgo::TfIdf, RankingAlgo::Bm25] {
        let mut params = SearchParams::default();
        params.algo = algo;
        let resp = idx.search(&Expr::Leaf("cat".into()), &params).unwrap();
        let hits: Vec<_> = resp.iter().collect();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].doc_id, 2, "doc 2 (tf=2) should outrank doc 1 under {algo:?}");
        assert!(hits[0].score > hits[1].score);
    }
}

#[test]
fn scenario_4_bm25_saturates_term_frequency() {
    let base = tempdir().unwrap();
    let engine = Engine::open_base(base.path()).unwrap();
    let idx = engine.create_index("corpus", IndexParams::default()).unwrap();

    let doc1 = vec!["aa"; 20].join(" ");
    let doc2 = {
        let mut v = vec!["aa"; 10];
        v.extend(vec!["bb"; 10]);
        v.join(" ")
    };
    let doc3 = {
        let mut v = vec!["aa"; 1];
        v.extend(vec!["bb"; 19]);
        v.join(" ")
    };
    idx.add(1, &doc1).unwrap();
    idx.add(2, &doc2).unwrap();
    idx.add(3, &doc3).unwrap();

    let mut params = SearchParams::default();
    params.algo = RankingAlgo::TfIdf;
    let resp = idx.search(&Expr::Leaf("aa".into()), &params).unwrap();
    let mut tfidf: std::collections::HashMap<u64, f64> =
        resp.iter().map(|h| (h.doc_id, h.score)).collect();

    params.algo = RankingAlgo::Bm25;
    let resp = idx.search(&Expr::Leaf("aa".into()), &params).unwrap();
    let bm25: std::collections::HashMap<u64, f64> =
        resp.iter().map(|h| (h.doc_id, h.score)).collect();

    let tfidf_gap = tfidf.remove(&1).unwrap() - tfidf[&2];
    let bm25_gap = bm25[&1] - bm25[&2];
    assert!(
        bm25_gap < tfidf_gap,
        "BM25 should compress the doc1/doc2 gap relative to TF-IDF: bm25_gap={bm25_gap}, tfidf_gap={tfidf_gap}"
    );
}

#[test]
fn scenario_5_bm25_orders_by_length_tfidf_does_not() {
    let base = tempdir().unwrap();
    let engine = Engine::open_base(base.path()).unwrap();
    let idx = engine.create_index("corpus", IndexParams::default()).unwrap();

    let doc1 = {
        let mut v = vec!["cats"; 3];
        v.extend(vec!["filler"; 17]);
        v.join(" ")
    };
    let doc2 = vec!["cats"; 3].join(" ");
    let doc3 = {
        let mut v = vec!["cats"; 2];
        v.push("filler");
        v.join(" ")
    };
    idx.add(1, &doc1).unwrap();
    idx.add(2, &doc2).unwrap();
    idx.add(3, &doc3).unwrap();

    let mut params = SearchParams::default();
    params.algo = RankingAlgo::Bm25;
    let resp = idx.search(&Expr::Leaf("cats".into()), &params).unwrap();
    let bm25_ids: Vec<u64> = resp.iter().map(|h| h.doc_id).collect();
    assert_eq!(bm25_ids[0], 2, "BM25 favors the shortest document with tf=3");

    params.algo = RankingAlgo::TfIdf;
    let resp = idx.search(&Expr::Leaf("cats".into()), &params).unwrap();
    let scores: std::collections::HashMap<u64, f64> =
        resp.iter().map(|h| (h.doc_id, h.score)).collect();
    assert_eq!(
        scores[&1], scores[&2],
        "TF-IDF is length-insensitive for equal tf"
    );
}

#[test]
fn bitmap_wide_query_supports_boolean_and_or_not() {
    let base = tempdir().unwrap();
    let engine = Engine::open_base(base.path()).unwrap();
    let idx = engine.create_index("corpus", IndexParams::default()).unwrap();

    idx.add(1, "alpha beta").unwrap();
    idx.add(2, "alpha gamma").unwrap();
    idx.add(3, "beta gamma").unwrap();

    let and_expr = Expr::And(vec![Expr::Leaf("alpha".into()), Expr::Leaf("beta".into())]);
    let resp = idx.search(&and_expr, &SearchParams::default()).unwrap();
    assert_eq!(resp.iter().map(|h| h.doc_id).collect::<Vec<_>>(), vec![1]);

    let or_expr = Expr::Or(vec![Expr::Leaf("alpha".into()), Expr::Leaf("beta".into())]);
    let resp = idx.search(&or_expr, &SearchParams::default()).unwrap();
    let mut ids: Vec<u64> = resp.iter().map(|h| h.doc_id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2, 3]);

    let not_expr = Expr::Not(vec![Expr::Leaf("alpha".into()), Expr::Leaf("gamma".into())]);
    let resp = idx.search(&not_expr, &SearchParams::default()).unwrap();
    assert_eq!(resp.iter().map(|h| h.doc_id).collect::<Vec<_>>(), vec![1]);
}

#[test]
fn term_ids_are_stable_across_a_fresh_reopen() {
    let base = tempdir().unwrap();
    let engine = Engine::open_base(base.path()).unwrap();
    {
        let idx = engine.create_index("corpus", IndexParams::default()).unwrap();
        idx.add(1, "alpha beta gamma").unwrap();
        engine.close_index("corpus").unwrap();
    }
    let idx = engine.open_index("corpus").unwrap();
    idx.add(2, "alpha delta").unwrap();

    let resp = idx
        .search(&Expr::Leaf("alpha".into()), &SearchParams::default())
        .unwrap();
    let mut ids: Vec<u64> = resp.iter().map(|h| h.doc_id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2]);
}

#[test]
fn bit_identical_persistence_for_the_same_append_sequence() {
    let base_a = tempdir().unwrap();
    let base_b = tempdir().unwrap();

    for base in [&base_a, &base_b] {
        let engine = Engine::open_base(base.path()).unwrap();
        let idx = engine.create_index("corpus", IndexParams::default()).unwrap();
        idx.add(1, "the quick brown fox").unwrap();
        idx.add(2, "the lazy dog").unwrap();
    }

    let terms_a = std::fs::read(base_a.path().join("data/corpus/nxsterms")).unwrap();
    let terms_b = std::fs::read(base_b.path().join("data/corpus/nxsterms")).unwrap();
    assert_eq!(terms_a, terms_b);

    let dtmap_a = std::fs::read(base_a.path().join("data/corpus/nxsdtmap")).unwrap();
    let dtmap_b = std::fs::read(base_b.path().join("data/corpus/nxsdtmap")).unwrap();
    assert_eq!(dtmap_a, dtmap_b);
}

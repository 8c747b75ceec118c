use hybrid_core::encoder::Encoder;
use hybrid_core::{
    CachePaths, Document, HybridSearch, Result, SearchConfig, SearchContext, SearchError, Tokenizer,
};
use std::sync::Arc;

/// Maps words onto concept axes so synonyms land together.
struct ConceptEncoder;

const AXES: &[&[&str]] = &[
    &["dragon", "dragons", "wyrm", "drake"],
    &["fire", "flame", "flames", "burn", "burns"],
    &["fruit", "smoothie", "recipe", "blend"],
    &["ocean", "sea", "ship", "sail"],
];

impl Encoder for ConceptEncoder {
    fn identifier(&self) -> String {
        "concept-test-v1".into()
    }

    fn dimension(&self) -> usize {
        AXES.len()
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(SearchError::EmptyInput);
        }
        let mut v = vec![0.0f32; AXES.len()];
        for word in text.to_lowercase().split(|c: char| !c.is_alphanumeric()) {
            for (axis, words) in AXES.iter().enumerate() {
                if words.contains(&word) {
                    v[axis] += 1.0;
                }
            }
        }
        Ok(v)
    }
}

fn ctx() -> SearchContext {
    SearchContext::new(Tokenizer::default(), SearchConfig::default(), Arc::new(ConceptEncoder))
}

fn corpus(doc2: &str) -> Vec<Document> {
    vec![
        Document::new(1, "The Old Wyrm", "A wyrm sleeps beneath the mountain. Its flames burn the valley."),
        Document::new(2, "Second", doc2),
        Document::new(3, "Voyage", "A ship sails the open sea."),
    ]
}

#[test]
fn rrf_keeps_lexical_match_at_or_above_semantic_only_match() {
    let docs = corpus("A dragon circles the tower.");
    let search = HybridSearch::build(&ctx(), &docs).unwrap();

    let hits = search.rrf_search("dragon", 3, 60).unwrap();
    let pos = |id| hits.iter().position(|h| h.document.id == id).unwrap();
    assert!(pos(2) <= pos(1));

    let one = &hits[pos(1)].scores;
    assert_eq!(one.bm25_rank, 0);
    assert!(one.semantic_rank > 0);
}

#[test]
fn rrf_includes_semantic_only_document_when_lexical_match_is_off_topic() {
    let docs = corpus("Dragon fruit smoothie recipe: blend the fruit.");
    let search = HybridSearch::build(&ctx(), &docs).unwrap();

    let hits = search.rrf_search("dragon", 3, 60).unwrap();
    let one = hits.iter().find(|h| h.document.id == 1).expect("semantic match is kept");
    assert_eq!(one.scores.bm25_rank, 0);
    assert_eq!(one.scores.semantic_rank, 1);
    assert!((one.scores.score - 1.0 / 61.0).abs() < 1e-12);

    let two = hits.iter().find(|h| h.document.id == 2).unwrap();
    assert_eq!(two.scores.bm25_rank, 1);
}

/// Every non-blank text maps to the same vector, so semantic ranking is pure id order.
struct FlatEncoder;

impl Encoder for FlatEncoder {
    fn identifier(&self) -> String {
        "flat-test-v1".into()
    }

    fn dimension(&self) -> usize {
        3
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(SearchError::EmptyInput);
        }
        Ok(vec![1.0; 3])
    }
}

fn flat_search() -> HybridSearch {
    let ctx = SearchContext::new(Tokenizer::default(), SearchConfig::default(), Arc::new(FlatEncoder));
    let docs = vec![
        Document::new(1, "Harbor", "Boats rest in the harbor."),
        Document::new(5, "Dragon", "The dragon wakes. A dragon flies."),
        Document::new(6, "Long Tale", "Knights ride north through rain and snow for many days until a dragon appears at last."),
    ];
    HybridSearch::build(&ctx, &docs).unwrap()
}

fn ids<S>(hits: &[hybrid_core::HybridHit<S>]) -> Vec<u32> {
    hits.iter().map(|h| h.document.id).collect()
}

#[test]
fn weighted_extremes_reduce_to_single_method_rankings() {
    for query in ["dragon", "dragon fire"] {
        let docs = corpus("A dragon circles the tower. Dragon fire lights the sky. Dragons everywhere.");
        let search = HybridSearch::build(&ctx(), &docs).unwrap();
        for n in 1..=3 {
            let lexical: Vec<u32> = search.search(query, n).unwrap().iter().map(|h| h.doc_id).collect();
            let weighted = ids(&search.weighted_search(query, 1.0, n).unwrap());
            assert_eq!(&weighted[..lexical.len()], &lexical[..], "alpha=1 query={query} n={n}");

            let semantic: Vec<u32> = search.semantic_search(query, n).unwrap().iter().map(|h| h.doc_id).collect();
            let weighted = ids(&search.weighted_search(query, 0.0, n).unwrap());
            assert_eq!(&weighted[..semantic.len()], &semantic[..], "alpha=0 query={query} n={n}");
        }
    }
}

#[test]
fn weakest_lexical_hit_is_not_displaced_by_semantic_only_tie() {
    let search = flat_search();

    let lexical: Vec<u32> = search.search("dragon", 2).unwrap().iter().map(|h| h.doc_id).collect();
    assert_eq!(lexical, vec![5, 6]);
    let weighted = search.weighted_search("dragon", 1.0, 2).unwrap();
    assert_eq!(ids(&weighted), vec![5, 6, 1]);

    let semantic: Vec<u32> = search.semantic_search("dragon", 2).unwrap().iter().map(|h| h.doc_id).collect();
    assert_eq!(semantic, vec![1, 5]);
    let weighted = search.weighted_search("dragon", 0.0, 2).unwrap();
    assert_eq!(ids(&weighted), vec![1, 5, 6]);
}

#[test]
fn fused_results_keep_the_whole_union() {
    let search = flat_search();
    let hits = search.rrf_search("dragon", 1, 60).unwrap();
    assert_eq!(ids(&hits), vec![1, 5]);
    assert_eq!((hits[1].scores.bm25_rank, hits[1].scores.semantic_rank), (1, 0));
    assert!((hits[0].scores.score - hits[1].scores.score).abs() < 1e-12);
}

#[test]
fn query_parameters_are_validated() {
    let search = HybridSearch::build(&ctx(), &corpus("A dragon.")).unwrap();
    assert!(matches!(search.search("dragon", 0), Err(SearchError::InvalidQuery(_))));
    assert!(matches!(search.weighted_search("dragon", 1.5, 3), Err(SearchError::InvalidQuery(_))));
    assert!(matches!(search.rrf_search("dragon", 3, 0), Err(SearchError::InvalidQuery(_))));
    assert!(search.rrf_search("   ", 3, 60).unwrap().is_empty());
}

#[test]
fn saved_caches_reload_and_missing_ones_fail() {
    let dir = tempfile::tempdir().unwrap();
    let cache = CachePaths::new(dir.path());
    let docs = corpus("A dragon circles the tower.");

    assert!(matches!(
        HybridSearch::load(&ctx(), &cache, &docs),
        Err(SearchError::CacheMissing { .. })
    ));

    let built = HybridSearch::build(&ctx(), &docs).unwrap();
    built.save(&cache).unwrap();
    let loaded = HybridSearch::load(&ctx(), &cache, &docs).unwrap();
    assert_eq!(
        built.rrf_search("dragon", 3, 60).unwrap(),
        loaded.rrf_search("dragon", 3, 60).unwrap()
    );
}

//! Fusion of lexical (BM25) and semantic (chunk cosine) rankings.
//!
//! Two strategies are available:
//! - **Weighted**: per-method min-max normalization, then `alpha * bm25 + (1 - alpha) * semantic`
//! - **RRF** (Reciprocal Rank Fusion): `sum(1 / (k + rank))` over the methods that returned a document
//!
//! Both are pure functions of the two ranked inputs. Equal fused scores fall back to
//! ascending document id so the output order is total.

use crate::config::CachePaths;
use crate::config::SearchConfig;
use crate::context::SearchContext;
use crate::error::{Result, SearchError};
use crate::index::{DocId, Document, InvertedIndex, LexicalHit};
use crate::persist::{self, IndexPaths};
use crate::semantic::{SemanticHit, SemanticIndex};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Instant;
use tracing::info;

/// Scores of one document under weighted fusion. `bm25`/`semantic` are normalized.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightedScore {
    pub doc_id: DocId,
    pub bm25: f64,
    pub semantic: f64,
    pub hybrid: f64,
}

/// Scores of one document under RRF. A rank of 0 means the method did not return it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RrfScore {
    pub doc_id: DocId,
    pub score: f64,
    pub bm25_rank: usize,
    pub semantic_rank: usize,
}

/// A fused result with the document attached for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HybridHit<S> {
    #[serde(flatten)]
    pub scores: S,
    pub document: Document,
}

/// Min-max rescale into `[0, 1]`. When every score is equal (including a single score)
/// each maps to `1.0`.
pub fn min_max_normalize(scores: &[f64]) -> Vec<f64> {
    let Some((min, max)) = min_max(scores) else {
        return Vec::new();
    };
    if min == max {
        return vec![1.0; scores.len()];
    }
    scores.iter().map(|s| (s - min) / (max - min)).collect()
}

fn min_max(scores: &[f64]) -> Option<(f64, f64)> {
    let mut iter = scores.iter().copied();
    let first = iter.next()?;
    Some(iter.fold((first, first), |(lo, hi), s| (lo.min(s), hi.max(s))))
}

/// Normalize one method's `(doc, raw score)` list over only the documents it returned.
pub fn normalize_scores(scores: &[(DocId, f64)]) -> HashMap<DocId, f64> {
    let raw: Vec<f64> = scores.iter().map(|&(_, s)| s).collect();
    scores.iter().map(|&(id, _)| id).zip(min_max_normalize(&raw)).collect()
}

fn by_score_then_id(a: (f64, DocId), b: (f64, DocId)) -> Ordering {
    b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal).then(a.1.cmp(&b.1))
}

/// 1-based position of each document in one method's ranked input.
fn input_ranks(scores: &[(DocId, f64)]) -> HashMap<DocId, usize> {
    let mut ranks = HashMap::with_capacity(scores.len());
    for (i, &(id, _)) in scores.iter().enumerate() {
        ranks.entry(id).or_insert(i + 1);
    }
    ranks
}

/// Weighted linear fusion. A document missing from one method contributes 0 for it.
///
/// Equal fused scores are ordered by the input rank of the method carrying more weight
/// (BM25 when `alpha >= 0.5`), then by the other method's rank, then by id. Absent ranks
/// sort last, so `alpha = 1` reproduces the BM25 order and `alpha = 0` the semantic order.
pub fn weighted_fusion(bm25: &[(DocId, f64)], semantic: &[(DocId, f64)], alpha: f64) -> Vec<WeightedScore> {
    let bm25_norm = normalize_scores(bm25);
    let semantic_norm = normalize_scores(semantic);
    let bm25_ranks = input_ranks(bm25);
    let semantic_ranks = input_ranks(semantic);

    let mut order: Vec<DocId> = Vec::with_capacity(bm25.len() + semantic.len());
    for &(id, _) in bm25.iter().chain(semantic) {
        if !order.contains(&id) {
            order.push(id);
        }
    }

    let mut fused: Vec<WeightedScore> = order
        .into_iter()
        .map(|doc_id| {
            let bm25 = bm25_norm.get(&doc_id).copied().unwrap_or(0.0);
            let semantic = semantic_norm.get(&doc_id).copied().unwrap_or(0.0);
            WeightedScore { doc_id, bm25, semantic, hybrid: alpha * bm25 + (1.0 - alpha) * semantic }
        })
        .collect();

    let (lead, other) = if alpha >= 0.5 { (&bm25_ranks, &semantic_ranks) } else { (&semantic_ranks, &bm25_ranks) };
    let rank = |ranks: &HashMap<DocId, usize>, id: DocId| ranks.get(&id).copied().unwrap_or(usize::MAX);
    fused.sort_by(|a, b| {
        b.hybrid
            .partial_cmp(&a.hybrid)
            .unwrap_or(Ordering::Equal)
            .then_with(|| rank(lead, a.doc_id).cmp(&rank(lead, b.doc_id)))
            .then_with(|| rank(other, a.doc_id).cmp(&rank(other, b.doc_id)))
            .then(a.doc_id.cmp(&b.doc_id))
    });
    fused
}

/// Reciprocal Rank Fusion over two ranked id lists (best first).
pub fn rrf_fusion(bm25: &[DocId], semantic: &[DocId], k: u32) -> Vec<RrfScore> {
    let mut ranks: Vec<RrfScore> = Vec::with_capacity(bm25.len() + semantic.len());
    let mut slot: HashMap<DocId, usize> = HashMap::new();
    let mut entry = |doc_id: DocId, ranks: &mut Vec<RrfScore>| -> usize {
        *slot.entry(doc_id).or_insert_with(|| {
            ranks.push(RrfScore { doc_id, score: 0.0, bm25_rank: 0, semantic_rank: 0 });
            ranks.len() - 1
        })
    };
    for (i, &doc_id) in bm25.iter().enumerate() {
        let at = entry(doc_id, &mut ranks);
        if ranks[at].bm25_rank == 0 {
            ranks[at].bm25_rank = i + 1;
        }
    }
    for (i, &doc_id) in semantic.iter().enumerate() {
        let at = entry(doc_id, &mut ranks);
        if ranks[at].semantic_rank == 0 {
            ranks[at].semantic_rank = i + 1;
        }
    }

    for r in ranks.iter_mut() {
        r.score = rrf_score(&[r.bm25_rank, r.semantic_rank], k);
    }
    ranks.sort_by(|a, b| by_score_then_id((a.score, a.doc_id), (b.score, b.doc_id)));
    ranks
}

/// `sum(1 / (k + rank))` over the non-zero ranks.
pub fn rrf_score(ranks: &[usize], k: u32) -> f64 {
    ranks
        .iter()
        .filter(|&&rank| rank > 0)
        .map(|&rank| 1.0 / (k as f64 + rank as f64))
        .sum()
}

/// `limit` bounds each method's ranked list; zero is rejected.
pub fn check_limit(limit: usize) -> Result<()> {
    if limit == 0 {
        return Err(SearchError::InvalidQuery("limit must be greater than 0".into()));
    }
    Ok(())
}

/// Both indexes plus the tunables needed to query them.
#[derive(Debug)]
pub struct HybridSearch {
    lexical: InvertedIndex,
    semantic: SemanticIndex,
    config: SearchConfig,
}

impl HybridSearch {
    pub fn new(ctx: &SearchContext, lexical: InvertedIndex, semantic: SemanticIndex) -> Self {
        Self { lexical, semantic, config: ctx.config().clone() }
    }

    /// Build both indexes from scratch.
    pub fn build(ctx: &SearchContext, documents: &[Document]) -> Result<Self> {
        let lexical = InvertedIndex::build(ctx.tokenizer().clone(), documents);
        let semantic = SemanticIndex::build(ctx, documents)?;
        Ok(Self::new(ctx, lexical, semantic))
    }

    pub fn save(&self, cache: &CachePaths) -> Result<()> {
        persist::save_lexical(&IndexPaths::new(cache.lexical()), &self.lexical)?;
        self.semantic.save(&IndexPaths::new(cache.semantic()))
    }

    /// Load both persisted indexes. Never rebuilds; a missing or stale cache is an error.
    pub fn load(ctx: &SearchContext, cache: &CachePaths, documents: &[Document]) -> Result<Self> {
        let lexical = persist::load_lexical(&IndexPaths::new(cache.lexical()), ctx.tokenizer().clone())?;
        let semantic = SemanticIndex::load(ctx, &IndexPaths::new(cache.semantic()), documents)?;
        Ok(Self::new(ctx, lexical, semantic))
    }

    pub fn lexical(&self) -> &InvertedIndex { &self.lexical }
    pub fn semantic(&self) -> &SemanticIndex { &self.semantic }

    pub fn document(&self, doc_id: DocId) -> Option<&Document> {
        self.lexical.document(doc_id).or_else(|| self.semantic.document(doc_id))
    }

    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<LexicalHit>> {
        check_limit(limit)?;
        Ok(self.lexical.search_with(query, limit, self.config.bm25_k1, self.config.bm25_b))
    }

    pub fn semantic_search(&self, query: &str, limit: usize) -> Result<Vec<SemanticHit>> {
        check_limit(limit)?;
        self.semantic.search_chunks(query, limit)
    }

    fn ranked_inputs(&self, query: &str, limit: usize) -> Result<(Vec<LexicalHit>, Vec<SemanticHit>)> {
        Ok((self.search(query, limit)?, self.semantic_search(query, limit)?))
    }

    fn attach<S>(&self, scores: Vec<S>, id: impl Fn(&S) -> DocId) -> Vec<HybridHit<S>> {
        scores
            .into_iter()
            .filter_map(|s| {
                let document = self.document(id(&s)).cloned();
                if document.is_none() {
                    tracing::warn!(doc_id = id(&s), "fused result has no backing document");
                }
                document.map(|document| HybridHit { scores: s, document })
            })
            .collect()
    }

    /// Weighted fusion: `alpha = 1` ranks by BM25 alone, `alpha = 0` by semantic alone.
    /// Each method contributes its top `limit`; the whole fused union is returned.
    pub fn weighted_search(&self, query: &str, alpha: f64, limit: usize) -> Result<Vec<HybridHit<WeightedScore>>> {
        if !(0.0..=1.0).contains(&alpha) {
            return Err(SearchError::InvalidQuery(format!("alpha must be within [0, 1], got {alpha}")));
        }
        let start = Instant::now();
        let (bm25, semantic) = self.ranked_inputs(query, limit)?;
        let bm25: Vec<(DocId, f64)> = bm25.iter().map(|h| (h.doc_id, h.score)).collect();
        let semantic: Vec<(DocId, f64)> = semantic.iter().map(|h| (h.doc_id, h.score)).collect();
        let hits = self.attach(weighted_fusion(&bm25, &semantic, alpha), |s| s.doc_id);
        info!(
            search_type = "weighted",
            query,
            alpha,
            results = hits.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "hybrid search completed"
        );
        Ok(hits)
    }

    pub fn rrf_search(&self, query: &str, limit: usize, k: u32) -> Result<Vec<HybridHit<RrfScore>>> {
        if k == 0 {
            return Err(SearchError::InvalidQuery("k must be greater than 0".into()));
        }
        let start = Instant::now();
        let (bm25, semantic) = self.ranked_inputs(query, limit)?;
        let bm25: Vec<DocId> = bm25.iter().map(|h| h.doc_id).collect();
        let semantic: Vec<DocId> = semantic.iter().map(|h| h.doc_id).collect();
        let hits = self.attach(rrf_fusion(&bm25, &semantic, k), |s| s.doc_id);
        info!(
            search_type = "rrf",
            query,
            k,
            results = hits.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "hybrid search completed"
        );
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn normalize_single_score_is_one() {
        assert_eq!(normalize_scores(&[(7, 5.0)]), HashMap::from([(7, 1.0)]));
    }

    #[test]
    fn normalize_spreads_to_unit_interval() {
        let n = normalize_scores(&[(1, 1.0), (2, 3.0), (3, 5.0)]);
        assert_eq!(n, HashMap::from([(1, 0.0), (2, 0.5), (3, 1.0)]));
        assert_eq!(min_max_normalize(&[2.0, 2.0, 2.0]), vec![1.0, 1.0, 1.0]);
        assert!(min_max_normalize(&[]).is_empty());
    }

    #[test]
    fn rrf_matches_reference_values() {
        let fused = rrf_fusion(&[4, 9], &[4, 8, 5], 60);
        let top = &fused[0];
        assert_eq!((top.doc_id, top.bm25_rank, top.semantic_rank), (4, 1, 1));
        assert!(close(top.score, 2.0 / 61.0));

        let only_semantic = fused.iter().find(|r| r.doc_id == 5).unwrap();
        assert_eq!(only_semantic.bm25_rank, 0);
        assert_eq!(only_semantic.semantic_rank, 3);
        assert!(close(only_semantic.score, 1.0 / 63.0));
    }

    #[test]
    fn rrf_ties_fall_back_to_ascending_id() {
        let fused = rrf_fusion(&[9], &[3], 60);
        assert_eq!(fused.iter().map(|r| r.doc_id).collect::<Vec<_>>(), vec![3, 9]);
        assert!(rrf_fusion(&[], &[], 60).is_empty());
    }

    #[test]
    fn alpha_one_is_bm25_order_and_alpha_zero_is_semantic_order() {
        let bm25 = [(1, 9.0), (2, 4.0), (3, 1.0)];
        let semantic = [(3, 0.9), (4, 0.8), (1, 0.1)];
        let ids = |alpha| weighted_fusion(&bm25, &semantic, alpha).into_iter().map(|s| s.doc_id).collect::<Vec<_>>();

        assert_eq!(ids(1.0), vec![1, 2, 3, 4]);
        assert_eq!(ids(0.0), vec![3, 4, 1, 2]);
    }

    #[test]
    fn lowest_bm25_hit_outranks_semantic_only_document_at_alpha_one() {
        // 7 normalizes to 0.0, the same fused score as the semantic-only 1
        let fused = weighted_fusion(&[(6, 2.0), (7, 1.0)], &[(1, 0.5)], 1.0);
        assert_eq!(fused.iter().map(|s| s.doc_id).collect::<Vec<_>>(), vec![6, 7, 1]);

        let fused = weighted_fusion(&[(1, 0.5)], &[(6, 0.9), (7, 0.2)], 0.0);
        assert_eq!(fused.iter().map(|s| s.doc_id).collect::<Vec<_>>(), vec![6, 7, 1]);
    }

    #[test]
    fn zero_limit_is_rejected() {
        assert!(matches!(check_limit(0), Err(SearchError::InvalidQuery(_))));
        assert!(check_limit(1).is_ok());
    }

    #[test]
    fn weighted_combines_normalized_scores() {
        let fused = weighted_fusion(&[(1, 10.0), (2, 0.0)], &[(2, 0.5)], 0.5);
        let two = fused.iter().find(|s| s.doc_id == 2).unwrap();
        assert!(close(two.bm25, 0.0));
        assert!(close(two.semantic, 1.0));
        assert!(close(two.hybrid, 0.5));
        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0].doc_id, 1);
    }
}

use crate::config::{BM25_B, BM25_K1};
use crate::error::{Result, SearchError};
use crate::tokenizer::Tokenizer;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

pub type DocId = u32;

/// A corpus record. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    pub title: String,
    pub description: String,
}

impl Document {
    pub fn new(id: DocId, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self { id, title: title.into(), description: description.into() }
    }

    /// Text that feeds the lexical index.
    pub fn indexed_text(&self) -> String {
        format!("{} {}", self.title, self.description)
    }
}

/// Term -> ids of documents containing it, in first-seen order, no duplicates.
pub type Postings = HashMap<String, Vec<DocId>>;
/// Document -> term -> occurrences.
pub type TermFrequencies = HashMap<DocId, HashMap<String, u32>>;
/// Document -> token count after normalization.
pub type DocLengths = HashMap<DocId, u32>;
/// Indexed documents keyed by id; ordered so full scans are deterministic.
pub type DocMap = BTreeMap<DocId, Document>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LexicalHit {
    pub doc_id: DocId,
    pub score: f64,
    pub document: Document,
}

/// BM25 inverted index over `title + " " + description`.
#[derive(Debug, Clone, Default)]
pub struct InvertedIndex {
    tokenizer: Tokenizer,
    pub(crate) postings: Postings,
    pub(crate) term_frequencies: TermFrequencies,
    pub(crate) doc_lengths: DocLengths,
    pub(crate) docs: DocMap,
}

impl InvertedIndex {
    pub fn new(tokenizer: Tokenizer) -> Self {
        Self { tokenizer, ..Self::default() }
    }

    pub(crate) fn from_tables(
        tokenizer: Tokenizer,
        postings: Postings,
        term_frequencies: TermFrequencies,
        doc_lengths: DocLengths,
        docs: DocMap,
    ) -> Self {
        Self { tokenizer, postings, term_frequencies, doc_lengths, docs }
    }

    /// Build a fresh index from the whole corpus. Never patches an existing one.
    pub fn build(tokenizer: Tokenizer, documents: &[Document]) -> Self {
        let start = Instant::now();
        let mut index = Self::new(tokenizer);
        for doc in documents {
            if index.docs.contains_key(&doc.id) {
                tracing::warn!(doc_id = doc.id, "duplicate document id, keeping first occurrence");
                continue;
            }
            index.add_document(doc);
        }
        tracing::info!(
            num_docs = index.docs.len(),
            num_terms = index.postings.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "lexical index built"
        );
        index
    }

    fn add_document(&mut self, doc: &Document) {
        let tokens = self.tokenizer.tokenize(&doc.indexed_text());
        let mut counts: HashMap<String, u32> = HashMap::new();
        for term in &tokens {
            *counts.entry(term.clone()).or_insert(0) += 1;
        }
        // One postings entry per distinct term, so no id is pushed twice.
        for term in counts.keys() {
            self.postings.entry(term.clone()).or_default().push(doc.id);
        }
        self.doc_lengths.insert(doc.id, tokens.len() as u32);
        self.term_frequencies.insert(doc.id, counts);
        self.docs.insert(doc.id, doc.clone());
    }

    pub fn tokenizer(&self) -> &Tokenizer { &self.tokenizer }
    pub fn num_docs(&self) -> usize { self.docs.len() }
    pub fn num_terms(&self) -> usize { self.postings.len() }
    pub fn document(&self, doc_id: DocId) -> Option<&Document> { self.docs.get(&doc_id) }
    pub fn documents(&self) -> impl Iterator<Item = &Document> { self.docs.values() }

    /// Occurrences of a single raw term in a document; 0 when either is unknown.
    pub fn get_term_frequency(&self, doc_id: DocId, term: &str) -> Result<u32> {
        Ok(match self.tokenizer.single_term(term)? {
            Some(term) => self.tf(doc_id, &term),
            None => 0,
        })
    }

    fn tf(&self, doc_id: DocId, term: &str) -> u32 {
        self.term_frequencies
            .get(&doc_id)
            .and_then(|counts| counts.get(term))
            .copied()
            .unwrap_or(0)
    }

    /// Ascending, de-duplicated ids of documents containing `term`.
    pub fn get_document_ids(&self, term: &str) -> Vec<DocId> {
        let key = match self.tokenizer.single_term(term) {
            Ok(Some(key)) => key,
            _ => return Vec::new(),
        };
        let mut ids = self.postings.get(&key).cloned().unwrap_or_default();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    fn document_frequency(&self, term: &str) -> usize {
        self.postings.get(term).map_or(0, Vec::len)
    }

    fn avg_doc_length(&self) -> f64 {
        if self.doc_lengths.is_empty() {
            return 0.0;
        }
        let total: u64 = self.doc_lengths.values().map(|&l| l as u64).sum();
        total as f64 / self.doc_lengths.len() as f64
    }

    /// `ln((N - df + 0.5) / (df + 0.5) + 1)` for a single raw term.
    pub fn bm25_idf(&self, term: &str) -> Result<f64> {
        let df = match self.tokenizer.single_term(term)? {
            Some(term) => self.document_frequency(&term),
            None => 0,
        };
        Ok(idf(self.docs.len(), df))
    }

    /// Saturated, length-normalized term frequency for a single raw term.
    pub fn bm25_tf(&self, doc_id: DocId, term: &str, k1: f64, b: f64) -> Result<f64> {
        let term = self.tokenizer.single_term(term)?.unwrap_or_default();
        self.bm25_tf_term(doc_id, &term, k1, b, self.avg_doc_length())
    }

    fn bm25_tf_term(&self, doc_id: DocId, term: &str, k1: f64, b: f64, avg_len: f64) -> Result<f64> {
        let doc_len = *self
            .doc_lengths
            .get(&doc_id)
            .ok_or(SearchError::UnknownDocument(doc_id))? as f64;
        let tf = self.tf(doc_id, term) as f64;
        let length_ratio = if avg_len > 0.0 { doc_len / avg_len } else { 0.0 };
        let denom = tf + k1 * (1.0 - b + b * length_ratio);
        if denom == 0.0 {
            return Ok(0.0);
        }
        Ok((tf * (k1 + 1.0)) / denom)
    }

    /// `bm25_idf * bm25_tf` with the default k1/b.
    pub fn bm25(&self, doc_id: DocId, term: &str) -> Result<f64> {
        Ok(self.bm25_idf(term)? * self.bm25_tf(doc_id, term, BM25_K1, BM25_B)?)
    }

    pub fn search(&self, query: &str, limit: usize) -> Vec<LexicalHit> {
        self.search_with(query, limit, BM25_K1, BM25_B)
    }

    /// Score every indexed document against the query, best first, ties by ascending id.
    /// Documents scoring zero are left out.
    pub fn search_with(&self, query: &str, limit: usize, k1: f64, b: f64) -> Vec<LexicalHit> {
        let start = Instant::now();
        let terms = self.tokenizer.tokenize(query);
        let n = self.docs.len();
        let avg_len = self.avg_doc_length();
        let idfs: Vec<(&str, f64)> = terms
            .iter()
            .map(|t| (t.as_str(), idf(n, self.document_frequency(t))))
            .collect();

        let mut scored: Vec<(DocId, f64)> = self
            .docs
            .keys()
            .map(|&doc_id| {
                let score = idfs
                    .iter()
                    .map(|&(term, idf)| {
                        idf * self.bm25_tf_term(doc_id, term, k1, b, avg_len).unwrap_or(0.0)
                    })
                    .sum();
                (doc_id, score)
            })
            .collect();
        // A document matching no query term is not a lexical hit.
        scored.retain(|&(_, score)| score > 0.0);
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then(a.0.cmp(&b.0)));
        scored.truncate(limit);

        let hits: Vec<LexicalHit> = scored
            .into_iter()
            .filter_map(|(doc_id, score)| {
                self.docs.get(&doc_id).map(|doc| LexicalHit { doc_id, score, document: doc.clone() })
            })
            .collect();
        tracing::debug!(
            query,
            results = hits.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "bm25 search completed"
        );
        hits
    }
}

fn idf(n: usize, df: usize) -> f64 {
    let (n, df) = (n as f64, df as f64);
    ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<Document> {
        vec![
            Document::new(3, "Dragon Keep", "A dragon guards the keep. The dragon sleeps."),
            Document::new(1, "Harbor", "Fishing boats return to the harbor at dawn."),
            Document::new(2, "Knights", "Knights ride out to hunt the dragon."),
        ]
    }

    #[test]
    fn postings_are_unique_and_sorted() {
        let idx = InvertedIndex::build(Tokenizer::default(), &corpus());
        assert_eq!(idx.get_document_ids("dragon"), vec![2, 3]);
        assert!(idx.get_document_ids("unicorn").is_empty());
    }

    #[test]
    fn term_frequency_counts_title_and_description() {
        let idx = InvertedIndex::build(Tokenizer::default(), &corpus());
        assert_eq!(idx.get_term_frequency(3, "dragons").unwrap(), 3);
        assert_eq!(idx.get_term_frequency(1, "dragon").unwrap(), 0);
        assert_eq!(idx.get_term_frequency(99, "dragon").unwrap(), 0);
        assert!(matches!(idx.get_term_frequency(3, "dragon keep"), Err(SearchError::InvalidQuery(_))));
    }

    #[test]
    fn idf_is_maximal_for_unseen_terms() {
        let idx = InvertedIndex::build(Tokenizer::default(), &corpus());
        let unseen = idx.bm25_idf("unicorn").unwrap();
        let seen = idx.bm25_idf("dragon").unwrap();
        assert!((unseen - (3.5f64 / 0.5 + 1.0).ln()).abs() < 1e-12);
        assert!(unseen > seen);
    }

    #[test]
    fn bm25_tf_on_unknown_document_is_an_error() {
        let idx = InvertedIndex::build(Tokenizer::default(), &corpus());
        assert!(matches!(idx.bm25_tf(42, "dragon", 1.5, 0.75), Err(SearchError::UnknownDocument(42))));
    }

    #[test]
    fn search_ranks_by_summed_bm25() {
        let idx = InvertedIndex::build(Tokenizer::default(), &corpus());
        let hits = idx.search("dragon", 3);
        assert_eq!(hits.len(), 2, "the harbor document matches no query term");
        assert_eq!(hits[0].doc_id, 3);
        assert_eq!(hits[1].doc_id, 2);
        assert_eq!(idx.search("dragon", 1).len(), 1);
        let expected = idx.bm25(3, "dragon").unwrap();
        assert!((hits[0].score - expected).abs() < 1e-12);
    }

    #[test]
    fn empty_index_scores_nothing() {
        let idx = InvertedIndex::new(Tokenizer::default());
        assert!(idx.search("dragon", 5).is_empty());
        assert!((idx.bm25_idf("dragon").unwrap() - (0.5f64 / 0.5 + 1.0).ln()).abs() < 1e-12);
    }
}

//! Chunked-embedding index: each document description is split into sentence windows,
//! every window is embedded, and a query scores a document by its best window.

use crate::chunker::SentenceChunker;
use crate::context::SearchContext;
use crate::encoder::{cosine_similarity, Encoder};
use crate::error::{Result, SearchError};
use crate::index::{DocId, Document};
use crate::persist::{self, IndexPaths, SemanticManifest, SEMANTIC_VERSION};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

const EXCERPT_CHARS: usize = 100;

/// Where an embedding came from. Position `i` describes embedding `i`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Ordinal of the source document in the corpus slice the index was built from.
    pub document_index: usize,
    pub chunk_index: usize,
    pub total_chunks: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SemanticHit {
    pub doc_id: DocId,
    pub title: String,
    pub excerpt: String,
    pub score: f64,
}

pub struct SemanticIndex {
    encoder: Arc<dyn Encoder>,
    documents: Vec<Document>,
    embeddings: Vec<Vec<f32>>,
    chunks: Vec<ChunkMetadata>,
}

impl std::fmt::Debug for SemanticIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticIndex")
            .field("encoder", &self.encoder.identifier())
            .field("documents", &self.documents.len())
            .field("chunks", &self.chunks.len())
            .finish()
    }
}

impl SemanticIndex {
    /// Chunk and embed every document with a non-blank description.
    pub fn build(ctx: &SearchContext, documents: &[Document]) -> Result<Self> {
        let start = Instant::now();
        let chunker = ctx.chunker()?;
        let (texts, chunks) = chunk_corpus(&chunker, documents);

        let encoder = Arc::clone(ctx.encoder());
        let batch_size = ctx.config().encode_batch_size.max(1);
        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(batch_size) {
            embeddings.extend(encoder.encode_batch(batch)?);
            tracing::debug!(embedded = embeddings.len(), total = texts.len(), "encoding chunks");
        }
        if embeddings.len() != chunks.len() {
            return Err(SearchError::Encoder(format!(
                "encoder returned {} vectors for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }

        tracing::info!(
            encoder = %encoder.identifier(),
            documents = documents.len(),
            chunks = chunks.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "semantic index built"
        );
        Ok(Self { encoder, documents: documents.to_vec(), embeddings, chunks })
    }

    fn manifest(&self) -> SemanticManifest {
        SemanticManifest {
            encoder: self.encoder.identifier(),
            dimension: self.encoder.dimension(),
            documents: self.documents.len(),
            fingerprint: corpus_fingerprint(&self.documents),
            chunks: self.chunks.len(),
            created_at: persist::now_rfc3339(),
            version: SEMANTIC_VERSION,
        }
    }

    pub fn save(&self, paths: &IndexPaths) -> Result<()> {
        persist::save_semantic(paths, &self.manifest(), &self.embeddings, &self.chunks)
    }

    /// Load persisted embeddings for `documents`. Fails without side effects when the cache is
    /// absent, misaligned, built from another corpus or format version, or built by another
    /// encoder.
    pub fn load(ctx: &SearchContext, paths: &IndexPaths, documents: &[Document]) -> Result<Self> {
        let (manifest, embeddings, chunks) = persist::load_semantic(paths)?;
        let encoder = Arc::clone(ctx.encoder());
        let expected = encoder.identifier();
        if manifest.encoder != expected {
            return Err(SearchError::EncoderMismatch { expected, found: manifest.encoder });
        }
        if manifest.version != SEMANTIC_VERSION {
            return Err(SearchError::CorruptCache(format!(
                "format version {}, expected {SEMANTIC_VERSION}",
                manifest.version
            )));
        }
        if manifest.documents != documents.len() || manifest.fingerprint != corpus_fingerprint(documents) {
            return Err(SearchError::CorruptCache("built from a different corpus".into()));
        }
        if embeddings.len() != chunks.len() || manifest.chunks != chunks.len() {
            return Err(SearchError::CorruptCache(format!(
                "{} embeddings for {} chunk records",
                embeddings.len(),
                chunks.len()
            )));
        }
        if manifest.dimension != encoder.dimension() {
            return Err(SearchError::CorruptCache(format!(
                "manifest dimension {} does not match encoder dimension {}",
                manifest.dimension,
                encoder.dimension()
            )));
        }
        if let Some(i) = embeddings.iter().position(|e| e.len() != manifest.dimension) {
            return Err(SearchError::CorruptCache(format!(
                "embedding {i} has {} dimensions, expected {}",
                embeddings[i].len(),
                manifest.dimension
            )));
        }
        if chunks.iter().any(|c| c.document_index >= documents.len()) {
            return Err(SearchError::CorruptCache("chunk refers to an unknown document".into()));
        }
        tracing::debug!(path = %paths.root.display(), chunks = chunks.len(), "semantic index loaded");
        Ok(Self { encoder, documents: documents.to_vec(), embeddings, chunks })
    }

    /// Reuse a valid cache, otherwise build from scratch and persist the result.
    pub fn load_or_build(ctx: &SearchContext, paths: &IndexPaths, documents: &[Document]) -> Result<Self> {
        match Self::load(ctx, paths, documents) {
            Ok(index) => Ok(index),
            Err(e) if e.is_stale_cache() => {
                tracing::warn!(reason = %e, "semantic cache unusable, rebuilding");
                let index = Self::build(ctx, documents)?;
                index.save(paths)?;
                Ok(index)
            }
            Err(e) => Err(e),
        }
    }

    pub fn num_chunks(&self) -> usize { self.chunks.len() }
    pub fn num_documents(&self) -> usize { self.documents.len() }
    pub fn encoder(&self) -> &Arc<dyn Encoder> { &self.encoder }
    pub fn chunks(&self) -> &[ChunkMetadata] { &self.chunks }

    pub fn document(&self, doc_id: DocId) -> Option<&Document> {
        self.documents.iter().find(|d| d.id == doc_id)
    }

    /// Rank documents by their best-matching chunk. Exhaustive scan; blank query → no hits.
    pub fn search_chunks(&self, query: &str, limit: usize) -> Result<Vec<SemanticHit>> {
        if query.trim().is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let start = Instant::now();
        let query_vector = self.encoder.encode(query)?;

        let mut best: HashMap<usize, f64> = HashMap::new();
        for (embedding, meta) in self.embeddings.iter().zip(&self.chunks) {
            let score = cosine_similarity(&query_vector, embedding);
            best.entry(meta.document_index)
                .and_modify(|s| *s = s.max(score))
                .or_insert(score);
        }

        let mut ranked: Vec<(&Document, f64)> = best
            .into_iter()
            .filter_map(|(i, score)| self.documents.get(i).map(|d| (d, score)))
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then(a.0.id.cmp(&b.0.id)));
        ranked.truncate(limit);

        let hits: Vec<SemanticHit> = ranked
            .into_iter()
            .map(|(doc, score)| SemanticHit {
                doc_id: doc.id,
                title: doc.title.clone(),
                excerpt: doc.description.chars().take(EXCERPT_CHARS).collect(),
                score,
            })
            .collect();
        tracing::debug!(
            query,
            results = hits.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "chunk search completed"
        );
        Ok(hits)
    }
}

fn chunk_corpus(chunker: &SentenceChunker, documents: &[Document]) -> (Vec<String>, Vec<ChunkMetadata>) {
    let mut texts = Vec::new();
    let mut chunks = Vec::new();
    for (document_index, doc) in documents.iter().enumerate() {
        if doc.description.trim().is_empty() {
            continue;
        }
        let pieces: Vec<String> = chunker.chunks(&doc.description).collect();
        let total_chunks = pieces.len();
        for (chunk_index, text) in pieces.into_iter().enumerate() {
            texts.push(text);
            chunks.push(ChunkMetadata { document_index, chunk_index, total_chunks });
        }
    }
    (texts, chunks)
}

fn corpus_fingerprint(documents: &[Document]) -> String {
    let mut hasher = Sha1::new();
    for doc in documents {
        hasher.update(doc.id.to_le_bytes());
        hasher.update((doc.description.len() as u64).to_le_bytes());
        hasher.update(doc.description.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

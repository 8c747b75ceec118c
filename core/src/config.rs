use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const BM25_K1: f64 = 1.5;
pub const BM25_B: f64 = 0.75;
pub const DEFAULT_CHUNK_SENTENCES: usize = 4;
pub const DEFAULT_CHUNK_OVERLAP: usize = 1;
pub const DEFAULT_RRF_K: u32 = 60;
pub const DEFAULT_ALPHA: f64 = 0.5;
pub const DEFAULT_LIMIT: usize = 5;
pub const DEFAULT_ENCODE_BATCH: usize = 64;

/// Tunables shared by the indexes and the fusion layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub bm25_k1: f64,
    pub bm25_b: f64,
    pub max_chunk_sentences: usize,
    pub chunk_overlap: usize,
    pub rrf_k: u32,
    pub alpha: f64,
    pub limit: usize,
    pub encode_batch_size: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            bm25_k1: BM25_K1,
            bm25_b: BM25_B,
            max_chunk_sentences: DEFAULT_CHUNK_SENTENCES,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            rrf_k: DEFAULT_RRF_K,
            alpha: DEFAULT_ALPHA,
            limit: DEFAULT_LIMIT,
            encode_batch_size: DEFAULT_ENCODE_BATCH,
        }
    }
}

/// Cache root layout: one directory per index.
#[derive(Debug, Clone)]
pub struct CachePaths {
    pub root: PathBuf,
}

impl CachePaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn lexical(&self) -> PathBuf { self.root.join("lexical") }
    pub fn semantic(&self) -> PathBuf { self.root.join("semantic") }
}

impl Default for CachePaths {
    fn default() -> Self { Self::new("./cache") }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_falls_back_to_defaults() {
        let cfg: SearchConfig = serde_json::from_str(r#"{"rrf_k": 10}"#).unwrap();
        assert_eq!(cfg.rrf_k, 10);
        assert_eq!(cfg.max_chunk_sentences, DEFAULT_CHUNK_SENTENCES);
        assert!((cfg.bm25_k1 - 1.5).abs() < f64::EPSILON);
    }
}

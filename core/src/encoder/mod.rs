//! Text → vector capability consumed by the semantic index.
//!
//! The index never trains or inspects a model; it only needs an [`Encoder`]. Vectors from
//! different encoders are not comparable, so every encoder reports an identifier that is
//! stored with persisted embeddings.

mod hashing;
#[cfg(feature = "fastembed")]
mod model;

pub use hashing::HashingEncoder;
#[cfg(feature = "fastembed")]
pub use model::FastEmbedEncoder;

use crate::error::{Result, SearchError};
use crate::tokenizer::Tokenizer;
use std::sync::Arc;

pub const DEFAULT_HASHING_DIMENSION: usize = 384;

pub trait Encoder: Send + Sync {
    /// Stable name + version of the mapping; persisted caches are keyed by it.
    fn identifier(&self) -> String;

    fn dimension(&self) -> usize;

    /// Encode one text. Blank input is `EmptyInput`.
    fn encode(&self, text: &str) -> Result<Vec<f32>>;

    /// Encode many texts; output is aligned with input order.
    fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.encode(t)).collect()
    }
}

pub(crate) fn ensure_not_blank(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(SearchError::EmptyInput);
    }
    Ok(())
}

/// Resolve an encoder by name: `hashing`, `hashing:<dim>`, or (with the `fastembed`
/// feature) a sentence-embedding model name such as `all-MiniLM-L6-v2`.
pub fn encoder_from_name(name: &str, tokenizer: &Tokenizer, batch_size: usize) -> Result<Arc<dyn Encoder>> {
    if name == "hashing" {
        return Ok(Arc::new(HashingEncoder::new(tokenizer.clone(), DEFAULT_HASHING_DIMENSION)?));
    }
    if let Some(dim) = name.strip_prefix("hashing:") {
        let dim: usize = dim
            .parse()
            .map_err(|_| SearchError::InvalidConfig(format!("bad hashing dimension {dim:?}")))?;
        return Ok(Arc::new(HashingEncoder::new(tokenizer.clone(), dim)?));
    }
    from_model_name(name, batch_size)
}

#[cfg(feature = "fastembed")]
fn from_model_name(name: &str, batch_size: usize) -> Result<Arc<dyn Encoder>> {
    Ok(Arc::new(FastEmbedEncoder::new(name, batch_size)?))
}

#[cfg(not(feature = "fastembed"))]
fn from_model_name(name: &str, _batch_size: usize) -> Result<Arc<dyn Encoder>> {
    Err(SearchError::InvalidConfig(format!(
        "unknown encoder {name:?} (model encoders require the `fastembed` feature)"
    )))
}

/// Cosine similarity; 0 when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

use super::{ensure_not_blank, Encoder};
use crate::error::{Result, SearchError};
use crate::tokenizer::Tokenizer;
use sha1::{Digest, Sha1};

/// Deterministic bag-of-terms encoder using the hashing trick.
///
/// Each stemmed term lands in one signed bucket chosen from its SHA-1 digest, so vectors
/// stay comparable across builds and toolchains. The result is L2-normalized. Texts that
/// share terms get a positive cosine, which is enough to exercise the semantic path
/// without a model download.
#[derive(Debug, Clone)]
pub struct HashingEncoder {
    tokenizer: Tokenizer,
    dimension: usize,
}

impl HashingEncoder {
    pub fn new(tokenizer: Tokenizer, dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(SearchError::InvalidConfig("encoder dimension must be positive".into()));
        }
        Ok(Self { tokenizer, dimension })
    }

    fn bucket(&self, term: &str) -> (usize, f32) {
        let digest = Sha1::digest(term.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        let hash = u64::from_le_bytes(head);
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        ((hash % self.dimension as u64) as usize, sign)
    }
}

impl Encoder for HashingEncoder {
    fn identifier(&self) -> String {
        format!("hashing-v2-{}", self.dimension)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>> {
        ensure_not_blank(text)?;
        let mut vector = vec![0.0f32; self.dimension];
        for term in self.tokenizer.tokenize(text) {
            let (bucket, sign) = self.bucket(&term);
            vector[bucket] += sign;
        }
        let magnitude: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for v in vector.iter_mut() {
                *v /= magnitude;
            }
        }
        Ok(vector)
    }
}

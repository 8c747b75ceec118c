//! Hybrid document ranking: BM25 over an inverted index, cosine similarity over chunk
//! embeddings, and weighted or reciprocal-rank fusion of the two.

pub mod chunker;
pub mod config;
pub mod context;
pub mod corpus;
pub mod encoder;
pub mod error;
pub mod hybrid;
pub mod index;
pub mod persist;
pub mod semantic;
pub mod tokenizer;

pub use config::{CachePaths, SearchConfig};
pub use context::SearchContext;
pub use error::{Result, SearchError};
pub use hybrid::{HybridHit, HybridSearch, RrfScore, WeightedScore};
pub use index::{DocId, Document, InvertedIndex, LexicalHit};
pub use semantic::{SemanticHit, SemanticIndex};
pub use tokenizer::Tokenizer;

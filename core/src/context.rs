use crate::chunker::SentenceChunker;
use crate::config::SearchConfig;
use crate::encoder::Encoder;
use crate::error::Result;
use crate::tokenizer::Tokenizer;
use std::sync::Arc;

/// Process-scoped state shared by every component: the tokenizer with its stopword set,
/// tunables, and the encoder. Immutable once constructed; clone to share.
#[derive(Clone)]
pub struct SearchContext {
    tokenizer: Tokenizer,
    config: SearchConfig,
    encoder: Arc<dyn Encoder>,
}

impl SearchContext {
    pub fn new(tokenizer: Tokenizer, config: SearchConfig, encoder: Arc<dyn Encoder>) -> Self {
        Self { tokenizer, config, encoder }
    }

    pub fn tokenizer(&self) -> &Tokenizer { &self.tokenizer }
    pub fn config(&self) -> &SearchConfig { &self.config }
    pub fn encoder(&self) -> &Arc<dyn Encoder> { &self.encoder }

    /// Chunker for the configured window, validated up front.
    pub fn chunker(&self) -> Result<SentenceChunker> {
        SentenceChunker::new(self.config.max_chunk_sentences, self.config.chunk_overlap)
    }
}

impl std::fmt::Debug for SearchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchContext")
            .field("config", &self.config)
            .field("encoder", &self.encoder.identifier())
            .finish()
    }
}

use super::{ensure_not_blank, Encoder};
use crate::error::{Result, SearchError};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tracing::info;

/// Local sentence-embedding model via fastembed. Downloads the model on first use.
pub struct FastEmbedEncoder {
    model: TextEmbedding,
    name: String,
    dimension: usize,
    batch_size: usize,
}

impl FastEmbedEncoder {
    pub fn new(name: &str, batch_size: usize) -> Result<Self> {
        let model_type = parse_model_name(name)?;
        info!(model = name, "loading embedding model");
        let model = TextEmbedding::try_new(InitOptions::new(model_type).with_show_download_progress(true))?;
        let probe = model.embed(vec!["dimension probe"], None)?;
        let dimension = probe.first().map(Vec::len).unwrap_or(0);
        info!(model = name, dimension, "embedding model loaded");
        Ok(Self { model, name: name.to_string(), dimension, batch_size: batch_size.max(1) })
    }
}

fn parse_model_name(name: &str) -> Result<EmbeddingModel> {
    match name {
        "all-MiniLM-L6-v2" | "all-minilm-l6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" | "bge-small" => Ok(EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" | "bge-base" => Ok(EmbeddingModel::BGEBaseENV15),
        "nomic-embed-text-v1.5" | "nomic-embed-text" => Ok(EmbeddingModel::NomicEmbedTextV15),
        other => Err(SearchError::InvalidConfig(format!("unknown embedding model {other:?}"))),
    }
}

impl Encoder for FastEmbedEncoder {
    fn identifier(&self) -> String {
        format!("fastembed-{}", self.name)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>> {
        ensure_not_blank(text)?;
        self.model
            .embed(vec![text], None)?
            .into_iter()
            .next()
            .ok_or_else(|| SearchError::Encoder("no embedding generated".into()))
    }

    fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            for text in batch {
                ensure_not_blank(text)?;
            }
            let batch: Vec<&str> = batch.iter().map(String::as_str).collect();
            vectors.extend(self.model.embed(batch, None)?);
        }
        Ok(vectors)
    }
}

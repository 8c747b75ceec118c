use crate::error::{Result, SearchError};
use crate::index::{DocLengths, DocMap, InvertedIndex, Postings, TermFrequencies};
use crate::semantic::ChunkMetadata;
use crate::tokenizer::Tokenizer;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, create_dir_all, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const LEXICAL_VERSION: u32 = 1;
pub const SEMANTIC_VERSION: u32 = 2;

/// Diagnostic header written beside the lexical tables.
#[derive(Debug, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_docs: u32,
    pub num_terms: u32,
    pub created_at: String,
    pub version: u32,
}

/// Identifies the encoder and shape behind a set of persisted embeddings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticManifest {
    pub encoder: String,
    pub dimension: usize,
    pub documents: usize,
    /// SHA-1 (hex) of document ids and descriptions, so a cache never outlives its corpus.
    pub fingerprint: String,
    pub chunks: usize,
    pub created_at: String,
    pub version: u32,
}

pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    fn postings(&self) -> PathBuf { self.root.join("postings.bin") }
    fn term_frequencies(&self) -> PathBuf { self.root.join("term_frequencies.bin") }
    fn doc_lengths(&self) -> PathBuf { self.root.join("doc_lengths.bin") }
    fn docs(&self) -> PathBuf { self.root.join("docs.bin") }
    fn meta(&self) -> PathBuf { self.root.join("meta.json") }
    fn embeddings(&self) -> PathBuf { self.root.join("embeddings.bin") }
    fn chunks(&self) -> PathBuf { self.root.join("chunks.bin") }
    fn manifest(&self) -> PathBuf { self.root.join("manifest.json") }

    /// Sibling directory that receives a full write before being swapped in.
    fn staging(&self) -> Self {
        Self::new(self.root.with_extension("staging"))
    }

    pub fn lexical_artifacts(&self) -> [PathBuf; 4] {
        [self.postings(), self.term_frequencies(), self.doc_lengths(), self.docs()]
    }

    pub fn semantic_artifacts(&self) -> [PathBuf; 3] {
        [self.embeddings(), self.chunks(), self.manifest()]
    }
}

pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}

fn save_bin<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut f = BufWriter::new(File::create(path)?);
    bincode::serialize_into(&mut f, value)?;
    f.flush()?;
    Ok(())
}

fn load_bin<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let f = BufReader::new(File::open(path)?);
    Ok(bincode::deserialize_from(f)?)
}

fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn require_all(artifacts: &[PathBuf]) -> Result<()> {
    match artifacts.iter().find(|p| !p.is_file()) {
        Some(missing) => Err(SearchError::CacheMissing { artifact: missing.clone() }),
        None => Ok(()),
    }
}

/// Write into the staging directory via `write`, then replace `paths.root` with it.
fn write_staged<F>(paths: &IndexPaths, write: F) -> Result<()>
where
    F: FnOnce(&IndexPaths) -> Result<()>,
{
    let staging = paths.staging();
    if staging.root.exists() {
        fs::remove_dir_all(&staging.root)?;
    }
    create_dir_all(&staging.root)?;
    write(&staging)?;
    if paths.root.exists() {
        fs::remove_dir_all(&paths.root)?;
    }
    if let Some(parent) = paths.root.parent() {
        create_dir_all(parent)?;
    }
    fs::rename(&staging.root, &paths.root)?;
    Ok(())
}

pub fn save_lexical(paths: &IndexPaths, index: &InvertedIndex) -> Result<()> {
    write_staged(paths, |stage| {
        save_bin(&stage.postings(), &index.postings)?;
        save_bin(&stage.term_frequencies(), &index.term_frequencies)?;
        save_bin(&stage.doc_lengths(), &index.doc_lengths)?;
        save_bin(&stage.docs(), &index.docs)?;
        let meta = MetaFile {
            num_docs: index.num_docs() as u32,
            num_terms: index.num_terms() as u32,
            created_at: now_rfc3339(),
            version: LEXICAL_VERSION,
        };
        save_json(&stage.meta(), &meta)
    })?;
    tracing::info!(path = %paths.root.display(), "lexical index saved");
    Ok(())
}

/// Load all four lexical tables, or fail with `CacheMissing` before reading any.
pub fn load_lexical(paths: &IndexPaths, tokenizer: Tokenizer) -> Result<InvertedIndex> {
    require_all(&paths.lexical_artifacts())?;
    let postings: Postings = load_bin(&paths.postings())?;
    let term_frequencies: TermFrequencies = load_bin(&paths.term_frequencies())?;
    let doc_lengths: DocLengths = load_bin(&paths.doc_lengths())?;
    let docs: DocMap = load_bin(&paths.docs())?;
    tracing::debug!(path = %paths.root.display(), num_docs = docs.len(), "lexical index loaded");
    Ok(InvertedIndex::from_tables(tokenizer, postings, term_frequencies, doc_lengths, docs))
}

pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    load_json(&paths.meta())
}

pub fn save_semantic(
    paths: &IndexPaths,
    manifest: &SemanticManifest,
    embeddings: &[Vec<f32>],
    chunks: &[ChunkMetadata],
) -> Result<()> {
    write_staged(paths, |stage| {
        save_bin(&stage.embeddings(), embeddings)?;
        save_bin(&stage.chunks(), chunks)?;
        save_json(&stage.manifest(), manifest)
    })?;
    tracing::info!(path = %paths.root.display(), chunks = chunks.len(), "semantic index saved");
    Ok(())
}

pub fn load_semantic(paths: &IndexPaths) -> Result<(SemanticManifest, Vec<Vec<f32>>, Vec<ChunkMetadata>)> {
    require_all(&paths.semantic_artifacts())?;
    let manifest: SemanticManifest = load_json(&paths.manifest())?;
    let embeddings: Vec<Vec<f32>> = load_bin(&paths.embeddings())?;
    let chunks: Vec<ChunkMetadata> = load_bin(&paths.chunks())?;
    Ok((manifest, embeddings, chunks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Document;
    use tempfile::tempdir;

    fn tiny_index() -> InvertedIndex {
        InvertedIndex::build(
            Tokenizer::default(),
            &[
                Document::new(1, "Rust", "Rust is a systems language."),
                Document::new(2, "Go", "Go is a garbage collected language."),
            ],
        )
    }

    #[test]
    fn lexical_tables_survive_a_reload() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::new(dir.path().join("lexical"));
        let built = tiny_index();
        save_lexical(&paths, &built).unwrap();

        let loaded = load_lexical(&paths, Tokenizer::default()).unwrap();
        assert_eq!(loaded.num_docs(), 2);
        assert_eq!(loaded.get_document_ids("language"), vec![1, 2]);
        assert_eq!(loaded.search("rust", 1)[0].doc_id, 1);
        assert_eq!(load_meta(&paths).unwrap().num_docs, 2);
        assert!(!dir.path().join("lexical.staging").exists());
    }

    #[test]
    fn any_missing_table_fails_the_whole_load() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::new(dir.path().join("lexical"));
        save_lexical(&paths, &tiny_index()).unwrap();
        fs::remove_file(dir.path().join("lexical").join("doc_lengths.bin")).unwrap();

        match load_lexical(&paths, Tokenizer::default()) {
            Err(SearchError::CacheMissing { artifact }) => {
                assert!(artifact.ends_with("doc_lengths.bin"))
            }
            other => panic!("expected CacheMissing, got {other:?}"),
        }
    }

    #[test]
    fn missing_directory_is_cache_missing() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::new(dir.path().join("nothing-here"));
        assert!(matches!(load_semantic(&paths), Err(SearchError::CacheMissing { .. })));
    }
}

use crate::error::{Result, SearchError};
use crate::index::{DocId, Document};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A record that could not become a [`Document`].
#[derive(Debug, Clone, PartialEq)]
pub struct CorpusIssue {
    pub source: String,
    /// 0-based record position within `source`.
    pub position: usize,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct Corpus {
    pub documents: Vec<Document>,
    pub issues: Vec<CorpusIssue>,
}

impl Corpus {
    fn push(&mut self, source: &str, position: usize, record: std::result::Result<Document, String>, seen: &mut HashSet<DocId>) {
        let reason = match record {
            Ok(doc) if seen.insert(doc.id) => {
                self.documents.push(doc);
                return;
            }
            Ok(doc) => format!("duplicate id {}", doc.id),
            Err(reason) => reason,
        };
        tracing::warn!(source, position, %reason, "skipping corpus record");
        self.issues.push(CorpusIssue { source: source.to_string(), position, reason });
    }
}

/// Load a corpus from a `.json`/`.jsonl` file or a directory of them.
///
/// Malformed records are reported in [`Corpus::issues`] and skipped; only unreadable
/// files or unparseable JSON documents fail the load.
pub fn load_corpus<P: AsRef<Path>>(path: P) -> Result<Corpus> {
    let path = path.as_ref();
    let mut files: Vec<PathBuf> = Vec::new();
    if path.is_dir() {
        for entry in WalkDir::new(path).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() && matches!(extension(p), Some("json" | "jsonl")) {
                files.push(p.to_path_buf());
            }
        }
    } else if path.is_file() {
        files.push(path.to_path_buf());
    } else {
        return Err(SearchError::Corpus(format!("{} does not exist", path.display())));
    }

    let mut corpus = Corpus::default();
    let mut seen = HashSet::new();
    for file in files {
        let raw = fs::read_to_string(&file)?;
        let source = file.display().to_string();
        if extension(&file) == Some("jsonl") {
            parse_jsonl(&raw, &source, &mut corpus, &mut seen);
        } else {
            parse_json(&raw, &source, &mut corpus, &mut seen)?;
        }
    }
    tracing::info!(
        documents = corpus.documents.len(),
        rejected = corpus.issues.len(),
        "corpus loaded"
    );
    Ok(corpus)
}

/// Parse one JSON corpus text: `{"movies": [...]}`, `{"documents": [...]}`, a bare array,
/// or a single record object.
pub fn parse_corpus(raw: &str, source: &str) -> Result<Corpus> {
    let mut corpus = Corpus::default();
    parse_json(raw, source, &mut corpus, &mut HashSet::new())?;
    Ok(corpus)
}

fn extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|s| s.to_str())
}

fn parse_json(raw: &str, source: &str, corpus: &mut Corpus, seen: &mut HashSet<DocId>) -> Result<()> {
    let json: Value = serde_json::from_str(raw)?;
    let records = match json {
        Value::Array(arr) => arr,
        Value::Object(mut obj) => match obj.remove("movies").or_else(|| obj.remove("documents")) {
            Some(Value::Array(arr)) => arr,
            Some(_) => return Err(SearchError::Corpus(format!("{source}: document list is not an array"))),
            None => vec![Value::Object(obj)],
        },
        _ => return Err(SearchError::Corpus(format!("{source}: expected an object or array"))),
    };
    for (position, value) in records.into_iter().enumerate() {
        let record = serde_json::from_value::<RawRecord>(value)
            .map_err(|e| format!("invalid record: {e}"))
            .and_then(RawRecord::into_document);
        corpus.push(source, position, record, seen);
    }
    Ok(())
}

fn parse_jsonl(raw: &str, source: &str, corpus: &mut Corpus, seen: &mut HashSet<DocId>) {
    for (position, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str::<RawRecord>(line)
            .map_err(|e| format!("invalid record: {e}"))
            .and_then(RawRecord::into_document);
        corpus.push(source, position, record, seen);
    }
}

/// One corpus record as written; required fields are checked in [`RawRecord::into_document`]
/// so a missing one is reported by name.
#[derive(Deserialize)]
struct RawRecord {
    id: Option<u64>,
    title: Option<String>,
    description: Option<String>,
}

impl RawRecord {
    fn into_document(self) -> std::result::Result<Document, String> {
        let id = self.id.ok_or("missing field `id`")?;
        let id = DocId::try_from(id).map_err(|_| format!("`id` is not a valid document id: {id}"))?;
        Ok(Document {
            id,
            title: self.title.ok_or("missing field `title`")?,
            description: self.description.ok_or("missing field `description`")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn malformed_records_are_reported_not_fatal() {
        let raw = r#"{"movies": [
            {"id": 1, "title": "Alien", "description": "In space."},
            {"id": 2, "description": "No title."},
            {"title": "No id", "description": "x"},
            {"id": 1, "title": "Again", "description": "dup"},
            {"id": -4, "title": "Neg", "description": "y"},
            {"id": 5000000000, "title": "Huge", "description": "z"},
            {"id": 6, "title": 7, "description": "w"}
        ]}"#;
        let corpus = parse_corpus(raw, "inline").unwrap();
        assert_eq!(corpus.documents, vec![Document::new(1, "Alien", "In space.")]);
        let reasons: Vec<&str> = corpus.issues.iter().map(|i| i.reason.as_str()).collect();
        assert_eq!(reasons[0], "missing field `title`");
        assert_eq!(reasons[1], "missing field `id`");
        assert_eq!(reasons[2], "duplicate id 1");
        assert!(reasons[3].starts_with("invalid record"));
        assert_eq!(reasons[4], "`id` is not a valid document id: 5000000000");
        assert!(reasons[5].starts_with("invalid record"));
        assert_eq!(corpus.issues[1].position, 2);
    }

    #[test]
    fn bare_arrays_and_jsonl_directories_load() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.json"), r#"[{"id": 3, "title": "T", "description": "D"}]"#).unwrap();
        fs::write(
            dir.path().join("b.jsonl"),
            "{\"id\": 4, \"title\": \"U\", \"description\": \"E\"}\n\nnot json\n",
        )
        .unwrap();
        fs::write(dir.path().join("ignored.txt"), "nope").unwrap();

        let corpus = load_corpus(dir.path()).unwrap();
        let ids: Vec<DocId> = corpus.documents.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![3, 4]);
        assert_eq!(corpus.issues.len(), 1);
        assert_eq!(corpus.issues[0].position, 2);
    }

    #[test]
    fn missing_path_is_an_error() {
        assert!(matches!(load_corpus("/definitely/not/here.json"), Err(SearchError::Corpus(_))));
    }
}

use crate::error::{Result, SearchError};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref SENTENCE_END: Regex = Regex::new(r"[.!?]\s+").expect("valid regex");
}

/// Split on terminal punctuation followed by whitespace. The punctuation stays with its
/// sentence; empty pieces are dropped.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for m in SENTENCE_END.find_iter(text) {
        // `[.!?]` is one byte, so the sentence ends right after it.
        sentences.push(&text[start..m.start() + 1]);
        start = m.end();
    }
    sentences.push(&text[start..]);
    sentences.into_iter().map(str::trim).filter(|s| !s.is_empty()).collect()
}

/// Groups sentences into overlapping windows.
#[derive(Debug, Clone, Copy)]
pub struct SentenceChunker {
    max_sentences: usize,
    overlap: usize,
}

impl SentenceChunker {
    /// Rejects `overlap >= max_sentences`, which would never advance.
    pub fn new(max_sentences: usize, overlap: usize) -> Result<Self> {
        if max_sentences == 0 {
            return Err(SearchError::InvalidConfig("max_sentences must be at least 1".into()));
        }
        if overlap >= max_sentences {
            return Err(SearchError::InvalidConfig(format!(
                "overlap ({overlap}) must be smaller than max_sentences ({max_sentences})"
            )));
        }
        Ok(Self { max_sentences, overlap })
    }

    pub fn max_sentences(&self) -> usize { self.max_sentences }
    pub fn overlap(&self) -> usize { self.overlap }

    pub fn chunks<'a>(&self, text: &'a str) -> SentenceChunks<'a> {
        // An unterminated single fragment comes back from the splitter whole, so it is
        // emitted as one chunk without further handling.
        let sentences = split_sentences(text.trim());
        SentenceChunks {
            sentences,
            max_sentences: self.max_sentences,
            step: self.max_sentences - self.overlap,
            overlap: self.overlap,
            position: 0,
            emitted: 0,
        }
    }
}

/// Single-pass iterator over chunk texts.
#[derive(Debug)]
pub struct SentenceChunks<'a> {
    sentences: Vec<&'a str>,
    max_sentences: usize,
    step: usize,
    overlap: usize,
    position: usize,
    emitted: usize,
}

impl Iterator for SentenceChunks<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.position >= self.sentences.len() {
            return None;
        }
        let end = (self.position + self.max_sentences).min(self.sentences.len());
        let window = &self.sentences[self.position..end];
        // The tail is already covered by the previous window's overlap.
        if self.emitted > 0 && window.len() <= self.overlap {
            self.position = self.sentences.len();
            return None;
        }
        self.position += self.step;
        self.emitted += 1;
        Some(window.join(" "))
    }
}

/// Convenience wrapper: validate parameters, then collect every chunk of `text`.
pub fn chunk(text: &str, max_sentences: usize, overlap: usize) -> Result<Vec<String>> {
    Ok(SentenceChunker::new(max_sentences, overlap)?.chunks(text).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_has_no_chunks() {
        assert!(chunk("", 4, 1).unwrap().is_empty());
        assert!(chunk("   \n\t", 4, 1).unwrap().is_empty());
    }

    #[test]
    fn unterminated_fragment_is_one_chunk() {
        assert_eq!(chunk("  a short tagline", 4, 1).unwrap(), vec!["a short tagline"]);
    }

    #[test]
    fn splits_keep_punctuation() {
        assert_eq!(
            split_sentences("One. Two!  Three? Four"),
            vec!["One.", "Two!", "Three?", "Four"]
        );
        assert_eq!(split_sentences("v1.2 is out."), vec!["v1.2 is out."]);
    }

    #[test]
    fn windows_overlap_and_drop_covered_tail() {
        let text = "S1. S2. S3. S4. S5.";
        assert_eq!(chunk(text, 4, 1).unwrap(), vec!["S1. S2. S3. S4.", "S4. S5."]);
        assert_eq!(chunk("S1. S2. S3. S4.", 4, 1).unwrap(), vec!["S1. S2. S3. S4."]);
        assert_eq!(
            chunk(text, 2, 0).unwrap(),
            vec!["S1. S2.", "S3. S4.", "S5."]
        );
        assert_eq!(
            chunk(text, 3, 2).unwrap(),
            vec!["S1. S2. S3.", "S2. S3. S4.", "S3. S4. S5."]
        );
    }

    #[test]
    fn overlap_must_be_smaller_than_window() {
        assert!(matches!(chunk("A. B.", 2, 2), Err(SearchError::InvalidConfig(_))));
        assert!(matches!(SentenceChunker::new(1, 3), Err(SearchError::InvalidConfig(_))));
        assert!(matches!(SentenceChunker::new(0, 0), Err(SearchError::InvalidConfig(_))));
    }

    #[test]
    fn every_chunk_has_a_sentence_and_counts_are_stable() {
        let text = "Alpha beta. Gamma delta! Epsilon? Zeta eta. Theta.";
        for max in 1..6 {
            for overlap in 0..max {
                let first = chunk(text, max, overlap).unwrap();
                assert!(!first.is_empty());
                assert!(first.iter().all(|c| !split_sentences(c).is_empty()));
                assert_eq!(first, chunk(text, max, overlap).unwrap());
            }
        }
    }
}

use crate::error::{Result, SearchError};
use lazy_static::lazy_static;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
    static ref DEFAULT_STOPWORDS: Arc<HashSet<String>> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","aren't","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","can't","cannot","could","couldn't",
            "did","didn't","do","does","doesn't","doing","don't","down","during",
            "each","few","for","from","further",
            "had","hadn't","has","hasn't","have","haven't","having","he","he'd","he'll","he's","her","here","here's","hers","herself","him","himself","his","how","how's",
            "i","i'd","i'll","i'm","i've","if","in","into","is","isn't","it","it's","its","itself",
            "let's","me","more","most","mustn't","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "same","she","she'd","she'll","she's","should","shouldn't","so","some","such",
            "than","that","that's","the","their","theirs","them","themselves","then","there","there's","these","they","they'd","they'll","they're","they've","this","those","through","to","too",
            "under","until","up","very",
            "was","wasn't","we","we'd","we'll","we're","we've","were","weren't","what","what's","when","when's","where","where's","which","while","who","who's","whom","why","why's","with","won't","would","wouldn't",
            "you","you'd","you'll","you're","you've","your","yours","yourself","yourselves"
        ];
        Arc::new(normalize_stopwords(words.iter().copied()))
    };
}

/// NFKC, lowercase, and drop every ASCII punctuation character outright
/// (so "don't" becomes "dont", not "don t").
fn normalize(text: &str) -> String {
    text.nfkc()
        .collect::<String>()
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_ascii_punctuation())
        .collect()
}

fn normalize_stopwords<'a, I: IntoIterator<Item = &'a str>>(words: I) -> HashSet<String> {
    words
        .into_iter()
        .map(normalize)
        .map(|w| w.trim().to_string())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Turns raw text into stemmed index terms. Cheap to clone; the stopword set is shared.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    stopwords: Arc<HashSet<String>>,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self { stopwords: Arc::clone(&DEFAULT_STOPWORDS) }
    }
}

impl Tokenizer {
    pub fn with_stopwords<'a, I: IntoIterator<Item = &'a str>>(words: I) -> Self {
        Self { stopwords: Arc::new(normalize_stopwords(words)) }
    }

    /// Load a flat stopword list, one word per line.
    pub fn from_stopword_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let tokenizer = Self::with_stopwords(raw.lines());
        tracing::debug!(path = %path.as_ref().display(), stopwords = tokenizer.stopwords.len(), "loaded stopwords");
        Ok(tokenizer)
    }

    pub fn is_stopword(&self, token: &str) -> bool { self.stopwords.contains(token) }

    /// Normalize, split on whitespace, drop stopwords, stem. Order is preserved.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        normalize(text)
            .split_whitespace()
            .filter(|token| !self.is_stopword(token))
            .map(|token| STEMMER.stem(token).into_owned())
            .collect()
    }

    /// Reduce input that must name exactly one term. `None` when it normalizes away entirely
    /// (e.g. a stopword).
    pub fn single_term(&self, text: &str) -> Result<Option<String>> {
        let mut tokens = self.tokenize(text);
        match tokens.len() {
            0 => Ok(None),
            1 => Ok(tokens.pop()),
            n => Err(SearchError::InvalidQuery(format!(
                "expected a single term, {text:?} yields {n}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_tokenize() {
        let t = Tokenizer::default().tokenize("Running, runner's run!");
        assert!(t.iter().any(|w| w == "run"));
    }

    #[test]
    fn punctuation_is_removed_not_replaced() {
        let t = Tokenizer::with_stopwords(std::iter::empty()).tokenize("e-mail co.op");
        assert_eq!(t, vec!["email".to_string(), "coop".to_string()]);
    }

    #[test]
    fn contractions_in_stopword_list_still_match() {
        let t = Tokenizer::default().tokenize("Don't panic");
        assert_eq!(t, vec!["panic".to_string()]);
    }

    #[test]
    fn single_term_rejects_phrases() {
        let tok = Tokenizer::default();
        assert_eq!(tok.single_term("Dragons").unwrap().as_deref(), Some("dragon"));
        assert_eq!(tok.single_term("the").unwrap(), None);
        assert!(matches!(tok.single_term("red dragon"), Err(SearchError::InvalidQuery(_))));
    }
}

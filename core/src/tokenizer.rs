use crate::config::TokenizerConfig;
use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref RE: Regex = Regex::new(r"[\p{L}\p{N}]+").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
    static ref STOPWORDS: HashSet<&'static str> = {
        // Contractions are split at the apostrophe, so their fragments are listed too.
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","cannot","could",
            "d","did","do","does","doing","down","during",
            "each","few","for","from","further",
            "had","has","have","having","he","her","here","hers","herself","him","himself","his","how",
            "i","if","in","into","is","it","its","itself",
            "ll","m","me","more","most","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "re","s","same","she","should","so","some","such",
            "t","than","that","the","their","theirs","them","themselves","then","there","these","they","this","those","through","to","too",
            "under","until","up","ve","very",
            "was","we","were","what","when","where","which","while","who","whom","why","with","would",
            "you","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
}

fn is_stopword(token: &str) -> bool { STOPWORDS.contains(token) }

/// Fold text for matching: NFKD, strip combining marks, lowercase.
pub fn fold(text: &str) -> String {
    text.nfkd().filter(|c| !is_combining_mark(*c)).collect::<String>().to_lowercase()
}

/// The single term-extraction rule shared by indexing and querying.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tokenizer {
    config: TokenizerConfig,
}

impl Tokenizer {
    pub fn new(config: TokenizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TokenizerConfig {
        &self.config
    }

    /// Tokenize text into (term, position). Positions are offsets in the raw
    /// token stream, so dropped stop words still advance them.
    pub fn tokenize(&self, text: &str) -> Vec<(String, usize)> {
        let folded = fold(text);
        let mut tokens = Vec::new();
        for (pos, mat) in RE.find_iter(&folded).enumerate() {
            let token = mat.as_str();
            if self.config.stopwords && is_stopword(token) { continue; }
            if token.chars().count() < self.config.min_token_len { continue; }
            let term = if self.config.stemming {
                STEMMER.stem(token).into_owned()
            } else {
                token.to_string()
            };
            tokens.push((term, pos));
        }
        tokens
    }

    /// Terms only, in order of appearance.
    pub fn terms(&self, text: &str) -> Vec<String> {
        self.tokenize(text).into_iter().map(|(t, _)| t).collect()
    }
}

/// Tokenize with the default configuration (stemming on, stop words kept).
pub fn tokenize(text: &str) -> Vec<(String, usize)> {
    Tokenizer::default().tokenize(text)
}

/// True when `text` has at least one alphanumeric run.
pub fn has_text(text: &str) -> bool {
    RE.is_match(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_tokenize() {
        let t = tokenize("Running, runner's run!");
        assert!(t.iter().any(|(w, _)| w == "run"));
    }

    #[test]
    fn positions_count_dropped_stopwords() {
        let tok = Tokenizer::new(TokenizerConfig { stopwords: true, ..TokenizerConfig::default() });
        let t = tok.tokenize("the squat is king");
        assert_eq!(t, vec![("squat".to_string(), 1), ("king".to_string(), 3)]);
    }

    #[test]
    fn stemming_can_be_disabled() {
        let tok = Tokenizer::new(TokenizerConfig { stemming: false, ..TokenizerConfig::default() });
        assert_eq!(tok.terms("Squats Lunges"), vec!["squats", "lunges"]);
    }

    #[test]
    fn digits_are_terms() {
        let tok = Tokenizer::new(TokenizerConfig { stemming: false, ..TokenizerConfig::default() });
        assert_eq!(tok.terms("5x5 program, 3 sets"), vec!["5x5", "program", "3", "sets"]);
    }

    #[test]
    fn min_token_len_filters_short_tokens() {
        let tok = Tokenizer::new(TokenizerConfig { min_token_len: 3, ..TokenizerConfig::default() });
        assert_eq!(tok.terms("5k run ab day"), vec!["run", "day"]);
    }

    #[test]
    fn default_keeps_direction_words() {
        let tok = Tokenizer::new(TokenizerConfig { stemming: false, ..TokenizerConfig::default() });
        assert_eq!(tok.terms("pull up, step over"), vec!["pull", "up", "step", "over"]);
    }

    #[test]
    fn has_text_rejects_punctuation() {
        assert!(!has_text("  -- !! "));
        assert!(has_text("ok"));
    }
}

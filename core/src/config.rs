//! Engine configuration.
//!
//! Every field has a default so a partial TOML file (or none at all) is valid.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub tokenizer: TokenizerConfig,
    #[serde(default)]
    pub normalizer: NormalizerConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct TokenizerConfig {
    /// Snowball English stemming
    #[serde(default = "default_true")]
    pub stemming: bool,
    /// Drop English stop words. Off by default: words like "up" or "over"
    /// carry meaning in exercise names.
    #[serde(default)]
    pub stopwords: bool,
    /// Tokens shorter than this (in chars) are dropped
    #[serde(default = "default_min_token_len")]
    pub min_token_len: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NormalizerConfig {
    #[serde(default = "default_max_title_chars")]
    pub max_title_chars: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    #[serde(default = "default_k")]
    pub default_k: usize,
    #[serde(default = "default_max_k")]
    pub max_k: usize,
    #[serde(default = "default_max_query_chars")]
    pub max_query_chars: usize,
    /// ln(1 + N/df) instead of ln(N/df)
    #[serde(default = "default_true")]
    pub smoothed_idf: bool,
    /// Bonus weight for adjacent query terms found adjacent in the body
    #[serde(default = "default_phrase_boost")]
    pub phrase_boost: f32,
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,
    /// Wrap matched words in `<em>` tags
    #[serde(default = "default_true")]
    pub highlight: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_min_token_len() -> usize {
    1
}

fn default_max_title_chars() -> usize {
    200
}

fn default_k() -> usize {
    10
}

fn default_max_k() -> usize {
    100
}

fn default_max_query_chars() -> usize {
    512
}

fn default_phrase_boost() -> f32 {
    0.5
}

fn default_snippet_chars() -> usize {
    200
}

fn default_cache_capacity() -> usize {
    256
}

fn default_cache_ttl() -> u64 {
    300
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            stemming: default_true(),
            stopwords: false,
            min_token_len: default_min_token_len(),
        }
    }
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            max_title_chars: default_max_title_chars(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_k: default_k(),
            max_k: default_max_k(),
            max_query_chars: default_max_query_chars(),
            smoothed_idf: default_true(),
            phrase_boost: default_phrase_boost(),
            snippet_chars: default_snippet_chars(),
            highlight: default_true(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            capacity: default_cache_capacity(),
            ttl_secs: default_cache_ttl(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: EngineConfig =
            toml::from_str(s).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Load from `path` when given, otherwise fall back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_toml_file(p),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.search.default_k == 0 || self.search.max_k == 0 {
            return Err(Error::Config("search.default_k and search.max_k must be >= 1".into()));
        }
        if self.search.default_k > self.search.max_k {
            return Err(Error::Config(format!(
                "search.default_k ({}) exceeds search.max_k ({})",
                self.search.default_k, self.search.max_k
            )));
        }
        // Written this way so NaN is rejected too.
        if !(self.search.phrase_boost >= 0.0) {
            return Err(Error::Config("search.phrase_boost must not be negative".into()));
        }
        Ok(())
    }
}

//! Query engine: TF-IDF ranking over the inverted index.
//!
//! Read-only with respect to the index. A query holds the store's read guard
//! for its whole evaluation, so it always sees one consistent state.

use crate::cache::{CacheKey, QueryCache};
use crate::config::{CacheConfig, SearchConfig};
use crate::document::normalize_tag;
use crate::error::{Error, Result};
use crate::index::{IndexStore, InvertedIndex, Posting, StoredDocument};
use crate::tokenizer::Tokenizer;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use time::OffsetDateTime;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    /// Every tag listed must be present on a result.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), tags: Vec::new() }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub title: String,
    pub snippet: String,
    pub score: f32,
    pub source_uri: String,
    pub tags: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    /// Matching documents before truncation to top_k.
    pub total_hits: usize,
    pub hits: Vec<SearchHit>,
}

pub struct SearchEngine {
    store: Arc<IndexStore>,
    tokenizer: Tokenizer,
    config: SearchConfig,
    cache: Option<QueryCache>,
}

/// A query term with its frequency in the query text.
struct QueryTerm {
    term: String,
    qtf: u32,
}

impl SearchEngine {
    pub fn new(store: Arc<IndexStore>, tokenizer: Tokenizer, config: SearchConfig, cache: &CacheConfig) -> Self {
        let cache = cache.enabled.then(|| QueryCache::new(cache));
        Self { store, tokenizer, config, cache }
    }

    pub fn store(&self) -> &Arc<IndexStore> {
        &self.store
    }

    pub fn default_k(&self) -> usize {
        self.config.default_k
    }

    pub fn search(&self, query: &Query, top_k: usize) -> Result<SearchResults> {
        self.search_with(query, top_k, false)
    }

    /// `force_refresh` skips the cache and replaces any cached entry.
    pub fn search_with(&self, query: &Query, top_k: usize, force_refresh: bool) -> Result<SearchResults> {
        if top_k < 1 {
            return Err(Error::InvalidQuery("top_k must be at least 1".into()));
        }
        if query.text.chars().count() > self.config.max_query_chars {
            return Err(Error::InvalidQuery(format!(
                "query exceeds {} characters",
                self.config.max_query_chars
            )));
        }
        let tokens = self.tokenizer.tokenize(&query.text);
        if tokens.is_empty() {
            return Err(Error::InvalidQuery("query has no searchable terms".into()));
        }
        let top_k = top_k.min(self.config.max_k);

        let mut tags: Vec<String> = query.tags.iter().filter_map(|t| normalize_tag(t)).collect();
        tags.sort();
        tags.dedup();

        // Snippet highlighting depends on the exact query words, so the key does too.
        let key = CacheKey { text: query.text.trim().to_string(), tags: tags.clone(), top_k };

        let index = self.store.read();
        // Writers bump the generation under the write lock, so it is stable here.
        let generation = self.store.generation();

        if let Some(cache) = &self.cache {
            if force_refresh {
                cache.invalidate(&key);
            } else if let Some(hit) = cache.get(&key, generation) {
                tracing::debug!(query = %query.text, "query cache hit");
                return Ok(hit);
            }
        }

        let started = std::time::Instant::now();
        let results = self.evaluate(&index, query, &tokens, &tags, top_k);
        drop(index);
        tracing::debug!(
            query = %query.text,
            total_hits = results.total_hits,
            returned = results.hits.len(),
            took_us = started.elapsed().as_micros() as u64,
            "search evaluated"
        );

        if let Some(cache) = &self.cache {
            cache.put(key, generation, results.clone());
        }
        Ok(results)
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
            tracing::info!("query cache cleared");
        }
    }

    fn evaluate(
        &self,
        index: &InvertedIndex,
        query: &Query,
        tokens: &[(String, usize)],
        tags: &[String],
        top_k: usize,
    ) -> SearchResults {
        let terms = query_terms(tokens);
        let n = index.num_docs() as f32;

        let mut idf: HashMap<&str, f32> = HashMap::new();
        let mut scores: HashMap<&str, f32> = HashMap::new();
        for qt in &terms {
            let postings = index.postings(&qt.term);
            if postings.is_empty() {
                continue;
            }
            let w = self.idf(n, postings.len() as f32);
            idf.insert(qt.term.as_str(), w);
            let q_weight = 1.0 + (qt.qtf as f32).ln();
            for p in postings {
                let tf = 1.0 + (p.term_frequency as f32).ln();
                *scores.entry(p.doc_id.as_str()).or_insert(0.0) += q_weight * tf * w;
            }
        }

        if self.config.phrase_boost > 0.0 {
            for pair in tokens.windows(2) {
                let (a, pa) = (&pair[0].0, pair[0].1);
                let (b, pb) = (&pair[1].0, pair[1].1);
                if a == b {
                    continue;
                }
                let (Some(&wa), Some(&wb)) = (idf.get(a.as_str()), idf.get(b.as_str())) else { continue };
                let bonus = self.config.phrase_boost * wa.min(wb);
                let offset = (pb - pa) as u32;
                for doc_id in adjacent_docs(index.postings(a), index.postings(b), offset) {
                    if let Some(s) = scores.get_mut(doc_id) {
                        *s += bonus;
                    }
                }
            }
        }

        let mut ranked: Vec<(&StoredDocument, f32)> = scores
            .into_iter()
            .filter_map(|(id, score)| index.docs.get(id).map(|d| (d, score)))
            .filter(|(d, _)| tags.iter().all(|t| d.document.tags.contains(t)))
            .collect();
        ranked.sort_by(|(da, sa), (db, sb)| {
            sb.total_cmp(sa)
                .then_with(|| da.document.created_at.cmp(&db.document.created_at))
                .then_with(|| da.document.id.cmp(&db.document.id))
        });

        let total_hits = ranked.len();
        let matcher = word_matcher(&query.text);
        let hits = ranked
            .into_iter()
            .take(top_k)
            .map(|(stored, score)| {
                let doc = &stored.document;
                SearchHit {
                    id: doc.id.clone(),
                    title: doc.title.clone(),
                    snippet: self.snippet(&doc.body, matcher.as_ref()),
                    score,
                    source_uri: doc.source_uri.clone(),
                    tags: doc.tags.iter().cloned().collect(),
                    created_at: doc.created_at,
                }
            })
            .collect();

        SearchResults { total_hits, hits }
    }

    fn idf(&self, n: f32, df: f32) -> f32 {
        if self.config.smoothed_idf {
            (1.0 + n / df).ln()
        } else {
            (n / df).ln()
        }
    }

    /// Window of `snippet_chars` around the first query word in `body`.
    fn snippet(&self, body: &str, matcher: Option<&Regex>) -> String {
        let width = self.config.snippet_chars;
        let first = matcher.and_then(|re| re.find(body)).map(|m| m.start()).unwrap_or(0);
        let lead = width / 4;

        let start = body[..first].char_indices().rev().nth(lead.saturating_sub(1)).map(|(i, _)| i);
        let start = if first == 0 { 0 } else { start.unwrap_or(0) };
        let end = body[start..].char_indices().nth(width).map(|(i, _)| start + i).unwrap_or(body.len());
        let window = &body[start..end];

        match (matcher, self.config.highlight) {
            (Some(re), true) => re.replace_all(window, "<em>$0</em>").into_owned(),
            _ => window.to_string(),
        }
    }
}

/// Distinct query terms in order of first appearance.
fn query_terms(tokens: &[(String, usize)]) -> Vec<QueryTerm> {
    let mut order: Vec<&str> = Vec::new();
    let mut counts: BTreeMap<&str, u32> = BTreeMap::new();
    for (term, _) in tokens {
        let c = counts.entry(term.as_str()).or_insert(0);
        if *c == 0 {
            order.push(term.as_str());
        }
        *c += 1;
    }
    order.into_iter().map(|t| QueryTerm { term: t.to_string(), qtf: counts[t] }).collect()
}

/// Doc ids where some position of `a` is followed by `b` exactly `offset` tokens later.
fn adjacent_docs<'a>(a: &'a [Posting], b: &'a [Posting], offset: u32) -> Vec<&'a str> {
    let mut out = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].doc_id.cmp(&b[j].doc_id) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                let hit = a[i].positions.iter().any(|p| b[j].positions.binary_search(&(p + offset)).is_ok());
                if hit {
                    out.push(a[i].doc_id.as_str());
                }
                i += 1;
                j += 1;
            }
        }
    }
    out
}

/// Case-insensitive prefix matcher for the raw words of a query.
fn word_matcher(text: &str) -> Option<Regex> {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(regex::escape)
        .collect();
    if words.is_empty() {
        return None;
    }
    RegexBuilder::new(&format!(r"\b(?:{})", words.join("|")))
        .case_insensitive(true)
        .build()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn posting(doc: &str, positions: &[u32]) -> Posting {
        Posting { doc_id: doc.into(), term_frequency: positions.len() as u32, positions: positions.to_vec() }
    }

    #[test]
    fn adjacent_docs_checks_relative_offset() {
        let a = vec![posting("d1", &[0, 7]), posting("d2", &[4]), posting("d3", &[1])];
        let b = vec![posting("d1", &[8]), posting("d2", &[9]), posting("d4", &[2])];
        assert_eq!(adjacent_docs(&a, &b, 1), vec!["d1"]);
        assert_eq!(adjacent_docs(&a, &b, 5), vec!["d2"]);
    }

    #[test]
    fn query_terms_keep_first_order_and_counts() {
        let tokens = vec![("row".to_string(), 0), ("squat".to_string(), 1), ("row".to_string(), 2)];
        let terms = query_terms(&tokens);
        assert_eq!(terms.len(), 2);
        assert_eq!((terms[0].term.as_str(), terms[0].qtf), ("row", 2));
        assert_eq!((terms[1].term.as_str(), terms[1].qtf), ("squat", 1));
    }

    #[test]
    fn word_matcher_is_case_insensitive_prefix() {
        let re = word_matcher("Squat (goblet)").unwrap();
        assert!(re.is_match("GOBLET squats"));
        assert!(!re.is_match("no match here"));
        assert!(word_matcher("!!").is_none());
    }
}

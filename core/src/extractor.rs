//! Content extraction: turns [`RawContent`] into a canonical [`Document`].
//!
//! Each payload kind has its own pure extraction function. The shared tail
//! (id derivation, URI validation, tag canonicalization) lives in
//! [`Normalizer::normalize`].

use crate::config::NormalizerConfig;
use crate::document::{normalize_tag, Document, Payload, RawContent};
use crate::error::{Error, Result};
use crate::tokenizer::has_text;
use lazy_static::lazy_static;
use scraper::{Html, Node, Selector};
use sha1::{Digest, Sha1};
use std::collections::BTreeSet;
use time::OffsetDateTime;
use url::Url;

/// Elements whose text never belongs to the main content.
const BOILERPLATE: &[&str] = &[
    "script", "style", "noscript", "template", "nav", "header", "footer", "aside", "form", "iframe", "svg",
    "head",
];

lazy_static! {
    static ref SEL_TITLE: Selector = Selector::parse("title").expect("valid selector");
    static ref SEL_H1: Selector = Selector::parse("h1").expect("valid selector");
    static ref SEL_KEYWORDS: Selector = Selector::parse(r#"meta[name="keywords"]"#).expect("valid selector");
}

/// Text pulled out of a payload before the shared normalization tail.
#[derive(Debug, Default)]
struct Extracted {
    title: Option<String>,
    body: String,
    tags: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    config: NormalizerConfig,
}

impl Normalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    pub fn normalize(&self, raw: RawContent) -> Result<Document> {
        let source_uri = validate_source_uri(&raw.source_uri)?;

        let extracted = match &raw.payload {
            Payload::Html { html } => extract_html(html),
            Payload::PlainText { title, text } => extract_plain_text(title.as_deref(), text),
            Payload::FeedEntry { title, summary, content, categories, .. } => {
                extract_feed_entry(title, summary.as_deref(), content.as_deref(), categories)
            }
        };

        if !has_text(&extracted.body) {
            return Err(Error::Normalization(format!(
                "no extractable text in {} content from {}",
                raw.kind(),
                source_uri
            )));
        }

        let title = extracted
            .title
            .map(|t| collapse_whitespace(&t))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| fallback_title(&extracted.body));
        let title = truncate_chars(&title, self.config.max_title_chars);

        let id = match raw.id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            Some(_) => return Err(Error::Normalization("explicit id is blank".into())),
            None => derive_id(&source_uri),
        };

        let tags: BTreeSet<String> =
            raw.tags.iter().chain(extracted.tags.iter()).filter_map(|t| normalize_tag(t)).collect();

        Ok(Document {
            id,
            title,
            body: extracted.body,
            tags,
            source_uri,
            created_at: raw.created_at.unwrap_or_else(OffsetDateTime::now_utc),
        })
    }
}

/// Stable id for a source: lowercase hex SHA-1 of the normalized URI.
pub fn derive_id(source_uri: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(source_uri.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn validate_source_uri(uri: &str) -> Result<String> {
    let trimmed = uri.trim();
    if trimmed.is_empty() {
        return Err(Error::Normalization("source_uri is empty".into()));
    }
    let mut parsed = Url::parse(trimmed)
        .map_err(|e| Error::Normalization(format!("malformed source_uri {trimmed:?}: {e}")))?;
    if parsed.cannot_be_a_base() && parsed.scheme() != "urn" {
        return Err(Error::Normalization(format!("source_uri {trimmed:?} is not a locator")));
    }
    parsed.set_fragment(None);
    Ok(parsed.to_string())
}

fn extract_html(html: &str) -> Extracted {
    let doc = Html::parse_document(html);

    let title = doc
        .select(&SEL_TITLE)
        .next()
        .map(|n| n.text().collect::<String>())
        .filter(|t| has_text(t))
        .or_else(|| doc.select(&SEL_H1).next().map(|n| n.text().collect::<String>()));

    let tags = doc
        .select(&SEL_KEYWORDS)
        .filter_map(|m| m.value().attr("content"))
        .flat_map(|c| c.split(',').map(str::to_string).collect::<Vec<_>>())
        .collect();

    Extracted { title, body: visible_text(&doc), tags }
}

/// Text of every node outside boilerplate elements, whitespace collapsed.
fn visible_text(doc: &Html) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for node in doc.root_element().descendants() {
        let text = match node.value() {
            Node::Text(text) => &**text,
            _ => continue,
        };
        let skipped = node.ancestors().any(|a| {
            a.value().as_element().map_or(false, |e| BOILERPLATE.contains(&e.name()))
        });
        if !skipped {
            parts.push(text);
        }
    }
    collapse_whitespace(&parts.join(" "))
}

fn extract_plain_text(title: Option<&str>, text: &str) -> Extracted {
    Extracted { title: title.map(str::to_string), body: collapse_whitespace(text), tags: Vec::new() }
}

fn extract_feed_entry(
    title: &str,
    summary: Option<&str>,
    content: Option<&str>,
    categories: &[String],
) -> Extracted {
    let from_content = content
        .map(|c| visible_text(&Html::parse_fragment(c)))
        .filter(|b| has_text(b));
    let body = from_content.unwrap_or_else(|| {
        summary.map(|s| visible_text(&Html::parse_fragment(s))).unwrap_or_default()
    });
    Extracted { title: Some(title.to_string()), body, tags: categories.to_vec() }
}

pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn fallback_title(body: &str) -> String {
    truncate_chars(body, 80)
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].trim_end().to_string(),
        None => s.to_string(),
    }
}

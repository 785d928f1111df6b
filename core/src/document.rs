use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use time::OffsetDateTime;

/// A normalized, immutable record as held by the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    /// Plain text with whitespace collapsed; original case kept for display.
    pub body: String,
    pub tags: BTreeSet<String>,
    pub source_uri: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Unprocessed input as handed over by a publisher or the crawler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawContent {
    pub source_uri: String,
    /// Explicit id; when absent one is derived from `source_uri`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(flatten)]
    pub payload: Payload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    Html {
        html: String,
    },
    PlainText {
        #[serde(default)]
        title: Option<String>,
        text: String,
    },
    FeedEntry {
        title: String,
        #[serde(default)]
        summary: Option<String>,
        /// Full entry content, usually HTML.
        #[serde(default)]
        content: Option<String>,
        #[serde(default)]
        categories: Vec<String>,
        #[serde(default)]
        author: Option<String>,
    },
}

impl RawContent {
    pub fn html(source_uri: impl Into<String>, html: impl Into<String>) -> Self {
        Self::with_payload(source_uri, Payload::Html { html: html.into() })
    }

    pub fn plain_text(source_uri: impl Into<String>, title: Option<String>, text: impl Into<String>) -> Self {
        Self::with_payload(source_uri, Payload::PlainText { title, text: text.into() })
    }

    pub fn with_payload(source_uri: impl Into<String>, payload: Payload) -> Self {
        Self { source_uri: source_uri.into(), id: None, tags: Vec::new(), created_at: None, payload }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_created_at(mut self, at: OffsetDateTime) -> Self {
        self.created_at = Some(at);
        self
    }

    pub fn kind(&self) -> &'static str {
        match self.payload {
            Payload::Html { .. } => "html",
            Payload::PlainText { .. } => "plain_text",
            Payload::FeedEntry { .. } => "feed_entry",
        }
    }
}

/// Canonical tag form: trimmed and lower-cased. Empty tags are dropped.
pub fn normalize_tag(tag: &str) -> Option<String> {
    let t = tag.trim().to_lowercase();
    if t.is_empty() { None } else { Some(t) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_content_uses_kind_tag() {
        let v = json!({
            "kind": "plain_text",
            "source_uri": "https://example.com/squat",
            "text": "Squats build leg strength",
            "tags": ["legs"]
        });
        let raw: RawContent = serde_json::from_value(v).unwrap();
        assert_eq!(raw.kind(), "plain_text");
        assert_eq!(raw.tags, vec!["legs"]);
        assert!(raw.id.is_none());
    }

    #[test]
    fn feed_entry_optional_fields_default() {
        let v = json!({
            "kind": "feed_entry",
            "source_uri": "https://example.com/feed/1",
            "title": "Deadlift basics",
            "created_at": "2024-03-01T08:00:00Z"
        });
        let raw: RawContent = serde_json::from_value(v).unwrap();
        match raw.payload {
            Payload::FeedEntry { summary, content, categories, .. } => {
                assert!(summary.is_none());
                assert!(content.is_none());
                assert!(categories.is_empty());
            }
            other => panic!("unexpected payload {other:?}"),
        }
        assert!(raw.created_at.is_some());
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let v = json!({ "kind": "pdf", "source_uri": "https://example.com/a" });
        assert!(serde_json::from_value::<RawContent>(v).is_err());
    }

    #[test]
    fn tags_are_canonicalized() {
        assert_eq!(normalize_tag("  Legs "), Some("legs".to_string()));
        assert_eq!(normalize_tag("   "), None);
    }
}

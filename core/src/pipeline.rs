//! Ingestion pipeline: Normalizer → tokenization → Index Store.

use crate::document::{normalize_tag, Document, RawContent};
use crate::error::{Error, Result};
use crate::extractor::Normalizer;
use crate::index::{IndexStore, IndexedDocument, Posting};
use crate::tokenizer::{has_text, Tokenizer};
use std::collections::BTreeMap;
use std::sync::Arc;

pub struct Pipeline {
    store: Arc<IndexStore>,
    normalizer: Normalizer,
    tokenizer: Tokenizer,
}

impl Pipeline {
    pub fn new(store: Arc<IndexStore>, normalizer: Normalizer, tokenizer: Tokenizer) -> Self {
        Self { store, normalizer, tokenizer }
    }

    pub fn store(&self) -> &Arc<IndexStore> {
        &self.store
    }

    /// Normalize and index raw content, returning the document id.
    pub fn ingest_raw(&self, raw: RawContent) -> Result<String> {
        let doc = self.normalizer.normalize(raw)?;
        let id = doc.id.clone();
        self.ingest(doc)?;
        Ok(id)
    }

    /// Index a document, replacing any previous version with the same id.
    /// Nothing is written unless the document is valid.
    pub fn ingest(&self, doc: Document) -> Result<()> {
        let indexed = self.prepare(doc)?;
        let id = indexed.document.id.clone();
        let terms = indexed.postings.len();
        self.store.apply(indexed);
        tracing::info!(id = %id, terms, "document indexed");
        Ok(())
    }

    /// Ingest each item independently; one failure does not stop the rest.
    pub fn ingest_batch<I>(&self, raws: I) -> Vec<Result<String>>
    where
        I: IntoIterator<Item = RawContent>,
    {
        raws.into_iter()
            .map(|raw| {
                let uri = raw.source_uri.clone();
                self.ingest_raw(raw).map_err(|e| {
                    tracing::warn!(source_uri = %uri, error = %e, "ingest failed");
                    e
                })
            })
            .collect()
    }

    /// Drop a document. Unknown ids are a no-op.
    pub fn remove(&self, id: &str) {
        if self.store.unindex(id) {
            tracing::info!(id = %id, "document removed");
        } else {
            tracing::debug!(id = %id, "remove of unknown id ignored");
        }
    }

    /// Validate and tokenize outside the lock.
    fn prepare(&self, mut doc: Document) -> Result<IndexedDocument> {
        if doc.id.trim().is_empty() {
            return Err(Error::InvalidDocument("document id is empty".into()));
        }
        if !has_text(&doc.body) {
            return Err(Error::InvalidDocument(format!("document {} has no searchable text in its body", doc.id)));
        }

        doc.tags = doc.tags.iter().filter_map(|t| normalize_tag(t)).collect();

        let tokens = self.tokenizer.tokenize(&doc.body);
        if tokens.is_empty() {
            return Err(Error::InvalidDocument(format!("document {} has no indexable terms", doc.id)));
        }
        let token_count = tokens.len() as u32;
        let mut by_term: BTreeMap<String, Vec<u32>> = BTreeMap::new();
        for (term, pos) in tokens {
            by_term.entry(term).or_default().push(pos as u32);
        }

        let postings = by_term
            .into_iter()
            .map(|(term, positions)| {
                let posting = Posting {
                    doc_id: doc.id.clone(),
                    term_frequency: positions.len() as u32,
                    positions,
                };
                (term, posting)
            })
            .collect();

        Ok(IndexedDocument { document: doc, postings, token_count })
    }
}

//! Inverted index plus forward document store.
//!
//! [`InvertedIndex`] is the plain data structure; [`IndexStore`] owns one
//! behind a single writer lock and is the only way to mutate it.

use crate::config::TokenizerConfig;
use crate::document::Document;
use crate::error::{Error, Result};
use crate::persist::{self, IndexPaths};
use parking_lot::{RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub doc_id: String,
    pub term_frequency: u32,
    /// Token offsets of the term within the body, ascending.
    pub positions: Vec<u32>,
}

/// Forward entry: the document plus what is needed to unindex it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub document: Document,
    /// Distinct terms this document contributed postings for.
    pub terms: Vec<String>,
    pub token_count: u32,
}

/// A document already split into postings, ready to be applied under the lock.
#[derive(Debug, Clone)]
pub struct IndexedDocument {
    pub document: Document,
    pub postings: Vec<(String, Posting)>,
    pub token_count: u32,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvertedIndex {
    pub docs: HashMap<String, StoredDocument>,
    /// Posting lists sorted by doc_id; never empty.
    pub postings: HashMap<String, Vec<Posting>>,
}

impl InvertedIndex {
    pub fn new() -> Self { Self::default() }

    pub fn num_docs(&self) -> usize { self.docs.len() }

    pub fn num_terms(&self) -> usize { self.postings.len() }

    pub fn document(&self, id: &str) -> Option<&Document> {
        self.docs.get(id).map(|s| &s.document)
    }

    pub fn postings(&self, term: &str) -> &[Posting] {
        self.postings.get(term).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn doc_frequency(&self, term: &str) -> usize {
        self.postings(term).len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.docs.contains_key(id)
    }

    /// Delete-before-insert: any previous entry for the id is fully unindexed first.
    pub(crate) fn insert(&mut self, indexed: IndexedDocument) {
        let id = indexed.document.id.clone();
        self.unindex(&id);

        let mut terms = Vec::with_capacity(indexed.postings.len());
        for (term, posting) in indexed.postings {
            let list = self.postings.entry(term.clone()).or_default();
            match list.binary_search_by(|p| p.doc_id.as_str().cmp(&posting.doc_id)) {
                Ok(i) => list[i] = posting,
                Err(i) => list.insert(i, posting),
            }
            terms.push(term);
        }

        self.docs.insert(
            id,
            StoredDocument { document: indexed.document, terms, token_count: indexed.token_count },
        );
    }

    /// Returns false when the id was not indexed.
    pub(crate) fn unindex(&mut self, id: &str) -> bool {
        let stored = match self.docs.remove(id) {
            Some(s) => s,
            None => return false,
        };
        for term in &stored.terms {
            let now_empty = match self.postings.get_mut(term) {
                Some(list) => {
                    if let Ok(i) = list.binary_search_by(|p| p.doc_id.as_str().cmp(id)) {
                        list.remove(i);
                    }
                    list.is_empty()
                }
                None => false,
            };
            if now_empty {
                self.postings.remove(term);
            }
        }
        true
    }

    /// Every posting references a live document and every list is sorted and non-empty.
    pub fn is_consistent(&self) -> bool {
        self.postings.values().all(|list| {
            !list.is_empty()
                && list.windows(2).all(|w| w[0].doc_id < w[1].doc_id)
                && list.iter().all(|p| p.term_frequency >= 1 && self.docs.contains_key(&p.doc_id))
        })
    }
}

/// Owner of the index. Reads share a lock; ingest and remove are serialized.
#[derive(Debug)]
pub struct IndexStore {
    inner: RwLock<InvertedIndex>,
    generation: AtomicU64,
    paths: Option<IndexPaths>,
    /// Settings the stored terms were produced with; written into each snapshot.
    tokenizer: TokenizerConfig,
}

impl IndexStore {
    /// A store with no backing directory; `flush` is a no-op.
    pub fn in_memory() -> Self {
        Self {
            inner: RwLock::new(InvertedIndex::new()),
            generation: AtomicU64::new(0),
            paths: None,
            tokenizer: TokenizerConfig::default(),
        }
    }

    /// Open the snapshot in `dir`, or start empty if there is none yet.
    /// A snapshot built with different tokenizer settings is a `Storage` error.
    pub fn open<P: AsRef<Path>>(dir: P, tokenizer: TokenizerConfig) -> Result<Self> {
        let paths = IndexPaths::new(dir);
        let index = if persist::snapshot_exists(&paths) {
            let index = persist::load_snapshot(&paths, &tokenizer)?;
            tracing::info!(root = %paths.root.display(), num_docs = index.num_docs(), num_terms = index.num_terms(), "opened index");
            index
        } else {
            tracing::info!(root = %paths.root.display(), "no snapshot found, starting empty index");
            InvertedIndex::new()
        };
        Ok(Self { inner: RwLock::new(index), generation: AtomicU64::new(0), paths: Some(paths), tokenizer })
    }

    pub fn root(&self) -> Option<&PathBuf> {
        self.paths.as_ref().map(|p| &p.root)
    }

    /// Write a snapshot of the current state. Holds the read lock while encoding.
    pub fn flush(&self) -> Result<()> {
        let Some(paths) = &self.paths else { return Ok(()) };
        let index = self.inner.read();
        persist::save_snapshot(paths, &index, &self.tokenizer)?;
        tracing::info!(root = %paths.root.display(), num_docs = index.num_docs(), "index flushed");
        Ok(())
    }

    pub fn close(self) -> Result<()> {
        self.flush()
    }

    /// Point-in-time read view; hold it for the span of one query.
    pub fn read(&self) -> RwLockReadGuard<'_, InvertedIndex> {
        self.inner.read()
    }

    pub fn get(&self, id: &str) -> Result<Document> {
        self.inner.read().document(id).cloned().ok_or_else(|| Error::NotFound(id.to_string()))
    }

    pub fn postings(&self, term: &str) -> Vec<Posting> {
        self.inner.read().postings(term).to_vec()
    }

    pub fn all_ids(&self) -> BTreeSet<String> {
        self.inner.read().docs.keys().cloned().collect()
    }

    pub fn len(&self) -> usize { self.inner.read().num_docs() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    pub fn num_terms(&self) -> usize { self.inner.read().num_terms() }

    /// Bumped by every mutation; lets readers detect a changed index.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub(crate) fn apply(&self, indexed: IndexedDocument) {
        let mut index = self.inner.write();
        index.insert(indexed);
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn unindex(&self, id: &str) -> bool {
        let mut index = self.inner.write();
        let removed = index.unindex(id);
        if removed {
            self.generation.fetch_add(1, Ordering::AcqRel);
        }
        removed
    }
}

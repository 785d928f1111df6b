//! Facade wiring one store to its pipeline and query engine.

use crate::config::EngineConfig;
use crate::document::{Document, RawContent};
use crate::error::Result;
use crate::extractor::Normalizer;
use crate::index::IndexStore;
use crate::pipeline::Pipeline;
use crate::search::{Query, SearchEngine, SearchResults};
use crate::tokenizer::Tokenizer;
use std::path::Path;
use std::sync::Arc;

pub struct Engine {
    store: Arc<IndexStore>,
    pipeline: Pipeline,
    search: SearchEngine,
}

impl Engine {
    pub fn in_memory(config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_store(Arc::new(IndexStore::in_memory()), config))
    }

    /// Open (or create) the index persisted under `dir`. The tokenizer settings
    /// must match the ones the index was built with.
    pub fn open<P: AsRef<Path>>(dir: P, config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_store(Arc::new(IndexStore::open(dir, config.tokenizer)?), config))
    }

    fn with_store(store: Arc<IndexStore>, config: &EngineConfig) -> Self {
        let tokenizer = Tokenizer::new(config.tokenizer);
        let pipeline = Pipeline::new(store.clone(), Normalizer::new(config.normalizer.clone()), tokenizer);
        let search = SearchEngine::new(store.clone(), tokenizer, config.search.clone(), &config.cache);
        Self { store, pipeline, search }
    }

    pub fn store(&self) -> &Arc<IndexStore> {
        &self.store
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn search_engine(&self) -> &SearchEngine {
        &self.search
    }

    pub fn ingest(&self, raw: RawContent) -> Result<String> {
        self.pipeline.ingest_raw(raw)
    }

    pub fn ingest_document(&self, doc: Document) -> Result<()> {
        self.pipeline.ingest(doc)
    }

    pub fn remove(&self, id: &str) {
        self.pipeline.remove(id)
    }

    pub fn get(&self, id: &str) -> Result<Document> {
        self.store.get(id)
    }

    pub fn search(&self, text: &str, tags: &[&str], top_k: usize) -> Result<SearchResults> {
        let query = Query::new(text).with_tags(tags.iter().copied());
        self.search.search(&query, top_k)
    }

    pub fn search_query(&self, query: &Query, top_k: usize, force_refresh: bool) -> Result<SearchResults> {
        self.search.search_with(query, top_k, force_refresh)
    }

    pub fn clear_cache(&self) {
        self.search.clear_cache()
    }

    pub fn flush(&self) -> Result<()> {
        self.store.flush()
    }

    /// Flush and release the store. Other `Arc` holders keep an unflushed view.
    pub fn close(self) -> Result<()> {
        let Engine { store, pipeline, search } = self;
        drop(pipeline);
        drop(search);
        match Arc::try_unwrap(store) {
            Ok(store) => store.close(),
            Err(shared) => shared.flush(),
        }
    }
}

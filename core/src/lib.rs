//! Content extraction and search core for fitness articles, exercise
//! descriptions and training plans.
//!
//! Raw content flows through [`extractor::Normalizer`] into a [`Document`],
//! the [`pipeline::Pipeline`] indexes it into an [`index::IndexStore`], and
//! [`search::SearchEngine`] answers ranked queries against that store.

pub mod cache;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod index;
pub mod persist;
pub mod pipeline;
pub mod search;
pub mod tokenizer;

pub use config::EngineConfig;
pub use document::{Document, Payload, RawContent};
pub use engine::Engine;
pub use error::{Error, Result};
pub use index::{IndexStore, Posting};
pub use search::{Query, SearchHit, SearchResults};

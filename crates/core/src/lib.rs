//! # deepfin Core
//!
//! Domain types, traits, and error definitions for the deepfin deep-search
//! engine. This crate has **zero framework dependencies** — it defines the
//! domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (language model, search provider, page
//! crawler, thread store, stream registry) is defined as a trait here.
//! Implementations live in their respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with scripted mock implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod action;
pub mod crawl;
pub mod error;
pub mod message;
pub mod model;
pub mod search;
pub mod state;
pub mod store;

// Re-export key types at crate root for ergonomics
pub use action::{favicon_url, null_sink, Action, Annotation, AnnotationSink, Source};
pub use crawl::{BulkCrawlResult, CrawlProvider, CrawledPage};
pub use error::{Error, ModelError, Result, SearchError, StoreError};
pub use message::{Message, Role};
pub use model::{LanguageModel, ObjectRequest, TextRequest, TokenChunk};
pub use search::{SearchHit, SearchProvider, SearchResponse};
pub use state::{ResearchState, ResultSummary, SearchHistoryEntry, FAILURE_SUMMARY};
pub use store::{StreamRecord, StreamIds, StreamRegistry, Thread, ThreadStore, UpsertThread};

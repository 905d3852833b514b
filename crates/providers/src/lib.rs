//! External provider adapters for deepfin.
//!
//! All adapters implement the corresponding `deepfin_core` traits:
//! `SearchProvider` (Serper), `CrawlProvider` (bulk HTTP crawler), and
//! `LanguageModel` (OpenRouter-compatible chat-completions endpoint).

pub mod crawler;
pub mod openrouter;
pub mod serper;

pub use crawler::BulkCrawler;
pub use openrouter::OpenRouterModel;
pub use serper::SerperSearch;

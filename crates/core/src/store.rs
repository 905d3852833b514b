//! Persistence trait seams — thread store and resumable stream registry.
//!
//! The core calls these only at loop boundaries (start/finish), never
//! mid-loop. Durable backends live outside the core; the store crate ships
//! in-memory implementations for tests and single-process deployments.

use crate::error::StoreError;
use crate::message::Message;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A conversation thread owned by one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters for an upsert. Messages replace the stored set wholesale.
#[derive(Debug, Clone)]
pub struct UpsertThread {
    pub user_id: String,
    pub thread_id: String,
    /// Updates the title when provided; a new thread without one gets
    /// "Untitled Thread".
    pub title: Option<String>,
    pub messages: Vec<Message>,
}

/// Thread persistence boundary.
#[async_trait]
pub trait ThreadStore: Send + Sync {
    /// Create or replace a thread's messages.
    ///
    /// Upserting a thread id that exists under a different user is an
    /// ownership violation.
    async fn upsert_thread(&self, upsert: UpsertThread) -> std::result::Result<(), StoreError>;

    /// Fetch one thread scoped to its owner.
    async fn get_thread(
        &self,
        user_id: &str,
        thread_id: &str,
    ) -> std::result::Result<Option<Thread>, StoreError>;

    /// List a user's threads, most recently updated first.
    async fn get_threads(&self, user_id: &str) -> std::result::Result<Vec<Thread>, StoreError>;
}

/// One row per loop invocation that produces a response for a thread.
/// Never updated, only inserted; read by recency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamRecord {
    pub stream_id: String,
    pub thread_id: String,
    pub created_at: DateTime<Utc>,
}

/// The stream ids recorded for one thread, newest first.
#[derive(Debug, Clone, Default)]
pub struct StreamIds {
    pub stream_ids: Vec<String>,
    pub most_recent_stream_id: Option<String>,
}

/// Resumable stream registry boundary.
#[async_trait]
pub trait StreamRegistry: Send + Sync {
    /// Record a new in-flight stream before execution starts.
    async fn append_stream_id(
        &self,
        thread_id: &str,
        stream_id: &str,
    ) -> std::result::Result<(), StoreError>;

    /// Ask which streams exist for a thread and which one is newest.
    async fn get_stream_ids(
        &self,
        thread_id: &str,
    ) -> std::result::Result<StreamIds, StoreError>;
}

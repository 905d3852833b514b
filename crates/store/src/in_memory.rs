//! In-memory backends — useful for testing and single-process sessions.

use async_trait::async_trait;
use chrono::Utc;
use deepfin_core::error::StoreError;
use deepfin_core::store::{
    StreamIds, StreamRecord, StreamRegistry, Thread, ThreadStore, UpsertThread,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread store backed by a map. Upsert semantics match the durable
/// collaborator: messages replace wholesale, ownership is enforced, title
/// updates when provided.
#[derive(Clone, Default)]
pub struct InMemoryThreadStore {
    threads: Arc<RwLock<HashMap<String, Thread>>>,
}

impl InMemoryThreadStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ThreadStore for InMemoryThreadStore {
    async fn upsert_thread(&self, upsert: UpsertThread) -> Result<(), StoreError> {
        let mut threads = self.threads.write().await;
        let now = Utc::now();

        match threads.get_mut(&upsert.thread_id) {
            Some(existing) => {
                if existing.user_id != upsert.user_id {
                    return Err(StoreError::OwnershipViolation {
                        thread_id: upsert.thread_id,
                    });
                }
                existing.messages = upsert.messages;
                if let Some(title) = upsert.title {
                    existing.title = title;
                }
                existing.updated_at = now;
            }
            None => {
                threads.insert(
                    upsert.thread_id.clone(),
                    Thread {
                        id: upsert.thread_id,
                        user_id: upsert.user_id,
                        title: upsert.title.unwrap_or_else(|| "Untitled Thread".into()),
                        messages: upsert.messages,
                        created_at: now,
                        updated_at: now,
                    },
                );
            }
        }

        Ok(())
    }

    async fn get_thread(
        &self,
        user_id: &str,
        thread_id: &str,
    ) -> Result<Option<Thread>, StoreError> {
        let threads = self.threads.read().await;
        Ok(threads
            .get(thread_id)
            .filter(|t| t.user_id == user_id)
            .cloned())
    }

    async fn get_threads(&self, user_id: &str) -> Result<Vec<Thread>, StoreError> {
        let threads = self.threads.read().await;
        let mut result: Vec<Thread> = threads
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(result)
    }
}

/// An insert-only stream registry backed by a Vec, read by recency.
#[derive(Clone, Default)]
pub struct InMemoryStreamRegistry {
    records: Arc<RwLock<Vec<StreamRecord>>>,
}

impl InMemoryStreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StreamRegistry for InMemoryStreamRegistry {
    async fn append_stream_id(&self, thread_id: &str, stream_id: &str) -> Result<(), StoreError> {
        self.records.write().await.push(StreamRecord {
            stream_id: stream_id.into(),
            thread_id: thread_id.into(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn get_stream_ids(&self, thread_id: &str) -> Result<StreamIds, StoreError> {
        let records = self.records.read().await;
        // Records append in insertion order; reverse iteration yields
        // newest-first even when timestamps collide.
        let stream_ids: Vec<String> = records
            .iter()
            .rev()
            .filter(|r| r.thread_id == thread_id)
            .map(|r| r.stream_id.clone())
            .collect();
        let most_recent_stream_id = stream_ids.first().cloned();
        Ok(StreamIds {
            stream_ids,
            most_recent_stream_id,
        })
    }
}

//! In-process registry of live answer streams.
//!
//! Each in-flight answer fans out through a broadcast channel keyed by stream
//! id. A late subscriber receives the events produced after it attaches; the
//! completed-answer replay path lives in the facade, not here.

use deepfin_core::Message;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

/// One event on a live answer stream.
#[derive(Debug, Clone)]
pub enum AnswerEvent {
    /// A token delta.
    Token(String),
    /// The stream completed; carries the full assistant message.
    Done(Message),
}

/// Shared map of live streams. Cloning shares the underlying map.
#[derive(Clone, Default)]
pub struct StreamHub {
    inner: Arc<Mutex<HashMap<String, broadcast::Sender<AnswerEvent>>>>,
}

impl StreamHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new live stream and return its sender.
    pub fn open(&self, stream_id: &str) -> broadcast::Sender<AnswerEvent> {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        self.lock().insert(stream_id.to_string(), tx.clone());
        tx
    }

    /// Attach to a live stream, if one exists.
    pub fn subscribe(&self, stream_id: &str) -> Option<broadcast::Receiver<AnswerEvent>> {
        self.lock().get(stream_id).map(|tx| tx.subscribe())
    }

    /// Deregister a finished stream.
    pub fn close(&self, stream_id: &str) {
        self.lock().remove(stream_id);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, broadcast::Sender<AnswerEvent>>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

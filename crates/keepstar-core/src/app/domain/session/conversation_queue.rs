use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::state_store::StateStore;
use crate::app::domain::conversation::ConversationMessage;
use crate::app::domain::types::SessionId;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConversationQueueError {
    #[error("Conversation queue is full")]
    Full,

    #[error("Conversation queue is closed")]
    Closed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConversationQueueStats {
    pub enqueued: u64,
    pub applied: u64,
    pub failed: u64,
    pub dropped: u64,
}

#[derive(Default)]
struct Counters {
    enqueued: AtomicU64,
    applied: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

struct ConversationWrite {
    session_id: SessionId,
    messages: Vec<ConversationMessage>,
}

/// Bounded background writer for conversation bookkeeping.
///
/// Appends are applied in FIFO order by a single worker. Failures are counted
/// and logged, never returned to the enqueuer.
pub struct ConversationQueue {
    sender: Mutex<Option<mpsc::Sender<ConversationWrite>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl ConversationQueue {
    /// Spawn the worker. Must be called inside a tokio runtime.
    pub fn spawn(store: Arc<dyn StateStore>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<ConversationWrite>(capacity.max(1));
        let counters = Arc::new(Counters::default());

        let worker_counters = counters.clone();
        let worker = tokio::spawn(async move {
            while let Some(write) = rx.recv().await {
                match store
                    .append_conversation(&write.session_id, write.messages)
                    .await
                {
                    Ok(()) => {
                        worker_counters.applied.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(e) => {
                        worker_counters.failed.fetch_add(1, Ordering::SeqCst);
                        warn!(session_id = %write.session_id, error = %e, "Failed to append conversation");
                    }
                }
            }
            debug!("Conversation queue worker stopped");
        });

        Self {
            sender: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            counters,
        }
    }

    /// Queue an append without waiting.
    pub fn enqueue(
        &self,
        session_id: &SessionId,
        messages: Vec<ConversationMessage>,
    ) -> Result<(), ConversationQueueError> {
        let sender = self
            .sender
            .lock()
            .ok()
            .and_then(|s| s.as_ref().cloned());
        let Some(sender) = sender else {
            self.counters.dropped.fetch_add(1, Ordering::SeqCst);
            return Err(ConversationQueueError::Closed);
        };

        let write = ConversationWrite {
            session_id: session_id.clone(),
            messages,
        };
        match sender.try_send(write) {
            Ok(()) => {
                self.counters.enqueued.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(w)) => {
                self.counters.dropped.fetch_add(1, Ordering::SeqCst);
                warn!(session_id = %w.session_id, "Conversation queue full, dropping append");
                Err(ConversationQueueError::Full)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::SeqCst);
                Err(ConversationQueueError::Closed)
            }
        }
    }

    pub fn stats(&self) -> ConversationQueueStats {
        ConversationQueueStats {
            enqueued: self.counters.enqueued.load(Ordering::SeqCst),
            applied: self.counters.applied.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
            dropped: self.counters.dropped.load(Ordering::SeqCst),
        }
    }

    /// Close the queue and wait for everything already queued to be applied.
    pub async fn shutdown(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
        let worker = self.worker.lock().ok().and_then(|mut w| w.take());
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!(error = %e, "Conversation queue worker panicked");
            }
        }
    }
}

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

use super::state_store::StateStoreError;
use crate::app::domain::types::SessionId;

/// Per-session async mutexes for multi-write sequences (navigation, rollback).
///
/// Single zone writes are already atomic in the store. This table serializes
/// the read-then-write-twice sequences on top of it. Sessions never contend.
#[derive(Default)]
pub struct SessionLocks {
    locks: Mutex<HashMap<SessionId, Arc<tokio::sync::Mutex<()>>>>,
}

pub type SessionGuard = OwnedMutexGuard<()>;

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, session_id: &SessionId) -> Result<SessionGuard, StateStoreError> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .map_err(|_| StateStoreError::lock_poisoned("session locks"))?;
            // Entries nobody holds or waits on can go.
            locks.retain(|id, l| id == session_id || Arc::strong_count(l) > 1);
            locks
                .entry(session_id.clone())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        Ok(lock.lock_owned().await)
    }

    pub fn len(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_session_is_exclusive() {
        let locks = Arc::new(SessionLocks::new());
        let session_id = SessionId::from("s");

        let guard = locks.acquire(&session_id).await.unwrap();
        let contender = {
            let locks = locks.clone();
            let session_id = session_id.clone();
            tokio::spawn(async move { locks.acquire(&session_id).await.map(|_| ()) })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn different_sessions_do_not_block() {
        let locks = SessionLocks::new();
        let _a = locks.acquire(&SessionId::from("a")).await.unwrap();
        let _b = tokio::time::timeout(
            Duration::from_millis(100),
            locks.acquire(&SessionId::from("b")),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn idle_entries_are_pruned() {
        let locks = SessionLocks::new();
        drop(locks.acquire(&SessionId::from("a")).await.unwrap());
        drop(locks.acquire(&SessionId::from("b")).await.unwrap());
        assert_eq!(locks.len(), 1);
    }
}

use std::future::Future;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::app::error::{StateError, StateResult};

/// Per-call deadline and cancellation.
///
/// Futures raced by [`CallContext::run`] are dropped on expiry. Store adapters
/// are written so that dropping mid-write leaves nothing half committed.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    pub deadline: Option<Instant>,
    pub cancel: CancellationToken,
}

impl CallContext {
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Fail if the call is already cancelled or past its deadline.
    pub fn check(&self, operation: &str) -> StateResult<()> {
        if self.cancel.is_cancelled() {
            return Err(StateError::Cancelled {
                operation: operation.to_string(),
            });
        }
        if self.deadline.is_some_and(|d| d <= Instant::now()) {
            return Err(StateError::DeadlineExceeded {
                operation: operation.to_string(),
            });
        }
        Ok(())
    }

    /// Gate `fut` on the context, then drive it to the end.
    ///
    /// For operations made of several store writes that must not be split.
    pub async fn run_to_completion<T, F>(&self, operation: &str, fut: F) -> StateResult<T>
    where
        F: Future<Output = StateResult<T>>,
    {
        self.check(operation)?;
        fut.await
    }

    pub async fn run<T, F>(&self, operation: &str, fut: F) -> StateResult<T>
    where
        F: Future<Output = StateResult<T>>,
    {
        if self.cancel.is_cancelled() {
            return Err(StateError::Cancelled {
                operation: operation.to_string(),
            });
        }

        let deadline = async {
            match self.deadline {
                Some(d) => tokio::time::sleep_until(d.into()).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(StateError::Cancelled {
                operation: operation.to_string(),
            }),
            () = deadline => Err(StateError::DeadlineExceeded {
                operation: operation.to_string(),
            }),
            result = fut => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn elapsed_deadline_fails_fast() {
        let ctx = CallContext::background().with_deadline(Instant::now());
        let result = ctx
            .run("slow", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(StateError::DeadlineExceeded { .. })));
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        let ctx = CallContext::background();
        ctx.cancel.cancel();
        let result = ctx.run("anything", async { Ok(1) }).await;
        assert!(matches!(result, Err(StateError::Cancelled { .. })));
    }

    #[tokio::test]
    async fn run_to_completion_is_not_split_by_late_cancel() {
        let ctx = CallContext::background();
        let mut writes = Vec::new();
        let result = ctx
            .run_to_completion("navigate", async {
                writes.push("view");
                ctx.cancel.cancel();
                tokio::task::yield_now().await;
                writes.push("template");
                Ok(2)
            })
            .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(writes, vec!["view", "template"]);
    }

    #[tokio::test]
    async fn run_splits_on_late_cancel() {
        let ctx = CallContext::background();
        let mut writes = Vec::new();
        let result = ctx
            .run("navigate", async {
                writes.push("view");
                ctx.cancel.cancel();
                tokio::task::yield_now().await;
                writes.push("template");
                Ok(2)
            })
            .await;
        assert!(matches!(result, Err(StateError::Cancelled { .. })));
        assert_eq!(writes, vec!["view"]);
    }

    #[tokio::test]
    async fn run_to_completion_checks_deadline_up_front() {
        let ctx = CallContext::background().with_deadline(Instant::now());
        let result = ctx.run_to_completion("navigate", async { Ok(()) }).await;
        assert!(matches!(result, Err(StateError::DeadlineExceeded { .. })));
        assert!(CallContext::background().check("navigate").is_ok());
    }

    #[tokio::test]
    async fn no_deadline_runs_to_completion() {
        let ctx = CallContext::background();
        assert_eq!(ctx.run("fast", async { Ok(7) }).await.unwrap(), 7);
        assert!(ctx.remaining().is_none());
    }
}

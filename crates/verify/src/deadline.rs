//! Deadlines and cancellation for collaborator calls.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use verity_core::{AppError, AppResult};

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Cancellation flag shared between a caller and one in-flight query.
///
/// Cloning yields a handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    state: Arc<CancelState>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::SeqCst);
        self.state.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel` has been called.
    pub async fn cancelled(&self) {
        let notified = self.state.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }

    /// Fail fast with `Cancelled` if the token has fired.
    pub fn check(&self) -> AppResult<()> {
        if self.is_cancelled() {
            Err(AppError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Await `fut` unless the token fires first. The abandoned call is dropped.
pub async fn cancellable<T, F>(cancel: &CancelToken, fut: F) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    cancel.check()?;
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AppError::Cancelled),
        result = fut => result,
    }
}

/// Await a collaborator call under a deadline and the cancellation token.
///
/// Exceeding the deadline yields `CollaboratorTimeout` for `service`.
pub async fn call_with_deadline<T, F>(
    service: &'static str,
    timeout: Duration,
    cancel: &CancelToken,
    fut: F,
) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    let bounded = async move {
        match tokio::time::timeout(timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(service, ?timeout, "Collaborator call timed out");
                Err(AppError::CollaboratorTimeout { service, timeout })
            }
        }
    };
    cancellable(cancel, bounded).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fast_call_passes_through() {
        let cancel = CancelToken::new();
        let value = call_with_deadline("reasoning", Duration::from_secs(1), &cancel, async {
            Ok::<_, AppError>(7)
        })
        .await
        .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_slow_call_times_out() {
        let cancel = CancelToken::new();
        let err = call_with_deadline("web search", Duration::from_millis(20), &cancel, async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, AppError>(())
        })
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            AppError::CollaboratorTimeout {
                service: "web search",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_cancel_interrupts_in_flight_call() {
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = call_with_deadline("reasoning", Duration::from_secs(5), &cancel, async {
            std::future::pending::<AppResult<()>>().await
        })
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Cancelled));
    }

    #[tokio::test]
    async fn test_cancelled_token_skips_call() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut called = false;
        let result = cancellable(&cancel, async {
            called = true;
            Ok::<_, AppError>(())
        })
        .await;
        assert!(matches!(result, Err(AppError::Cancelled)));
        assert!(!called);
    }
}

//! Retry and timeout shaping for remote backends

use crate::config::StorageConfig;
use crate::error::{SchemaRegistryError, SchemaRegistryResult};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Retry policy applied to remote primitive calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts for retryable errors
    pub retries: u32,

    /// Delay between attempts
    pub delay: Duration,

    /// Per-attempt deadline (None = unbounded)
    pub timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&StorageConfig::default())
    }
}

impl From<&StorageConfig> for RetryPolicy {
    fn from(config: &StorageConfig) -> Self {
        Self {
            retries: config.retry_count,
            delay: config.retry_delay(),
            timeout: (config.timeout_ms > 0).then(|| config.timeout()),
        }
    }
}

impl RetryPolicy {
    /// Same deadline, no retries
    pub fn single_attempt(&self) -> Self {
        Self {
            retries: 0,
            ..*self
        }
    }

    /// Run `attempt` until it succeeds, fails permanently or retries run out
    pub async fn run<T, F, Fut>(
        &self,
        operation: &str,
        cancel: &CancellationToken,
        mut attempt: F,
    ) -> SchemaRegistryResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = SchemaRegistryResult<T>>,
    {
        let mut tries = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(SchemaRegistryError::cancelled(operation));
            }

            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(SchemaRegistryError::cancelled(operation)),
                outcome = self.bounded(operation, attempt()) => outcome,
            };

            match outcome {
                Err(e) if e.is_retryable() && tries < self.retries => {
                    tries += 1;
                    warn!(
                        operation = operation,
                        attempt = tries,
                        error = %e,
                        "Retrying storage operation"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(SchemaRegistryError::cancelled(operation)),
                        _ = tokio::time::sleep(self.delay) => {}
                    }
                }
                other => return other,
            }
        }
    }

    async fn bounded<T, Fut>(&self, operation: &str, fut: Fut) -> SchemaRegistryResult<T>
    where
        Fut: Future<Output = SchemaRegistryResult<T>>,
    {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, fut).await.unwrap_or_else(|_| {
                Err(SchemaRegistryError::timeout(&format!(
                    "{} exceeded {:?}",
                    operation, limit
                )))
            }),
            None => fut.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(retries: u32) -> RetryPolicy {
        RetryPolicy {
            retries,
            delay: Duration::from_millis(1),
            timeout: Some(Duration::from_millis(200)),
        }
    }

    #[tokio::test]
    async fn test_retries_retryable_errors() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let cancel = CancellationToken::new();

        let result = policy(2)
            .run("get", &cancel, move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(SchemaRegistryError::network("reset"))
                } else {
                    Ok(7)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let cancel = CancellationToken::new();

        let result: SchemaRegistryResult<()> = policy(5)
            .run("get", &cancel, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SchemaRegistryError::SchemaNotFound("x".to_string()))
            })
            .await;

        assert!(result.unwrap_err().is_not_found());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_attempt_timeout() {
        let cancel = CancellationToken::new();
        let policy = RetryPolicy {
            retries: 0,
            delay: Duration::ZERO,
            timeout: Some(Duration::from_millis(10)),
        };

        let result: SchemaRegistryResult<()> = policy
            .run("get", &cancel, || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(SchemaRegistryError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = policy(3).run("get", &cancel, || async { Ok(1) }).await;
        assert!(result.unwrap_err().is_cancelled());
    }
}

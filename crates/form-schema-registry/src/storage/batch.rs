//! Bounded fan-out for batch operations
//!
//! Sub-operations run concurrently up to a worker bound. The first error
//! cancels a child token shared by the siblings and is returned; work
//! that already committed is not rolled back.

use crate::error::{SchemaRegistryError, SchemaRegistryResult};
use futures::stream::{self, StreamExt};
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Default worker bound
pub const DEFAULT_BATCH_CONCURRENCY: usize = 8;

/// Run `op` for every id, collecting the `Some` results
pub async fn fan_out<T, F, Fut>(
    operation: &str,
    ids: Vec<String>,
    concurrency: usize,
    cancel: &CancellationToken,
    op: F,
) -> SchemaRegistryResult<Vec<(String, T)>>
where
    F: Fn(String, CancellationToken) -> Fut,
    Fut: Future<Output = SchemaRegistryResult<Option<T>>>,
{
    if cancel.is_cancelled() {
        return Err(SchemaRegistryError::cancelled(operation));
    }

    let siblings = cancel.child_token();
    let mut results = Vec::with_capacity(ids.len());

    let mut pending = stream::iter(ids)
        .map(|id| {
            let token = siblings.clone();
            let work = op(id.clone(), token.clone());
            async move {
                if token.is_cancelled() {
                    return Err(SchemaRegistryError::cancelled(operation));
                }
                tokio::select! {
                    _ = token.cancelled() => Err(SchemaRegistryError::cancelled(operation)),
                    outcome = work => outcome.map(|value| (id, value)),
                }
            }
        })
        .buffer_unordered(concurrency.max(1));

    while let Some(outcome) = pending.next().await {
        match outcome {
            Ok((id, Some(value))) => results.push((id, value)),
            Ok((_, None)) => {}
            Err(e) => {
                siblings.cancel();
                return Err(e);
            }
        }
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("id{}", i)).collect()
    }

    #[tokio::test]
    async fn test_collects_present_values() {
        let cancel = CancellationToken::new();
        let mut results = fan_out("get_batch", ids(10), 3, &cancel, |id, _| async move {
            let n: usize = id[2..].parse().unwrap_or_default();
            Ok((n % 2 == 0).then_some(n))
        })
        .await
        .unwrap();

        results.sort();
        assert_eq!(results.len(), 5);
        assert_eq!(results[0], ("id0".to_string(), 0));
    }

    #[tokio::test]
    async fn test_first_error_cancels_siblings() {
        let cancel = CancellationToken::new();
        let finished = AtomicUsize::new(0);

        let result: SchemaRegistryResult<Vec<(String, ())>> =
            fan_out("set_batch", ids(8), 8, &cancel, |id, token| {
                let finished = &finished;
                async move {
                    if id == "id3" {
                        return Err(SchemaRegistryError::storage("disk full"));
                    }
                    tokio::select! {
                        _ = token.cancelled() => {}
                        _ = tokio::time::sleep(Duration::from_secs(10)) => {
                            finished.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                    Ok(None)
                }
            })
            .await;

        assert!(matches!(result, Err(SchemaRegistryError::Storage { .. })));
        assert_eq!(finished.load(Ordering::SeqCst), 0);
        // the caller's token is untouched
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_parent_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result: SchemaRegistryResult<Vec<(String, ())>> =
            fan_out("get_batch", ids(2), 2, &cancel, |_, _| async { Ok(None) }).await;
        assert!(result.unwrap_err().is_cancelled());
    }
}

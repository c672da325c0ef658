//! Single-retry policy for calls to remote services.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::Result;

/// Run `call`, retrying it once if the first failure is transient.
///
/// Definitive rejections (bad credentials, oversize input, malformed
/// responses) and non-service errors are returned immediately.
pub async fn with_single_retry<T, F, Fut>(
    operation: &str,
    backoff: Duration,
    mut call: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match call().await {
        Ok(value) => Ok(value),
        Err(err) if err.service_kind().is_some_and(|kind| kind.is_transient()) => {
            warn!(
                operation,
                error = %err,
                backoff_ms = backoff.as_millis() as u64,
                "transient failure, retrying once"
            );
            tokio::time::sleep(backoff).await;
            call().await
        }
        Err(err) => Err(err),
    }
}

use crate::config::RetryPolicy;
use crate::error::ServiceError;
use std::future::Future;
use tracing::warn;

/// Runs `operation`, retrying transient failures with exponential backoff.
///
/// Non-transient errors (rejections, rate limits, empty results) return at once.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation_name: &'static str,
    mut operation: F,
) -> Result<T, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let mut retry = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && retry < policy.max_retries => {
                let delay = policy.delay_for(retry);
                warn!(
                    operation = operation_name,
                    attempt = retry + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient upstream failure; retrying"
                );
                tokio::time::sleep(delay).await;
                retry += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

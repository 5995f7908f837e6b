use std::cmp::min;

use tokio::time::sleep;
use tokio::time::timeout;
use tracing::error;
use tracing::warn;

use crate::BackoffPolicy;
use crate::Error;
use crate::Result;

/// Runs `task` until it succeeds, each attempt bounded by `policy.timeout_ms`.
///
/// The delay starts at `base_delay_ms` and doubles up to `max_delay_ms`.
/// `max_retries == 0` retries forever; callers that need to stop early race
/// the returned future against their shutdown signal.
pub(crate) async fn task_with_timeout_and_exponential_backoff<F, T, P>(
    task: F,
    policy: BackoffPolicy,
) -> Result<P>
where
    F: Fn() -> T,
    T: std::future::Future<Output = Result<P>>,
{
    let mut retries = 0;
    let mut delay = policy.base_delay();
    loop {
        match timeout(policy.timeout(), task()).await {
            Ok(Ok(r)) => {
                return Ok(r);
            }
            Ok(Err(error)) => {
                warn!("failed with error: {:?}", &error);
            }
            Err(error) => {
                warn!("task_with_timeout_and_exponential_backoff timeout: {:?}", &error);
            }
        };

        retries += 1;
        if policy.max_retries != 0 && retries >= policy.max_retries {
            warn!("Task failed after {} retries", retries);
            return Err(Error::RetryTaskFailed(format!(
                "Task failed after {retries} retries"
            )));
        }

        sleep(delay).await;
        delay = min(delay * 2, policy.max_delay());
    }
}

/// Spawns a named background task whose error is logged, never returned
pub(crate) fn spawn_task<F, Fut>(
    name: &str,
    task_fn: F,
    handles: Option<&mut Vec<tokio::task::JoinHandle<()>>>,
) where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Result<()>> + Send + 'static,
{
    let name = name.to_string();
    let handle = tokio::spawn(async move {
        if let Err(e) = task_fn().await {
            error!("spawned task: {name} stopped or encountered an error: {:?}", e);
        }
    });

    if let Some(h) = handles {
        h.push(handle);
    }
}

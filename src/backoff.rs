use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;

pub use backoff::ExponentialBackoff;

use crate::error::{Error, Result};

/// The schedule used for the operator boot loop and the framework's own
/// error loop: the default curve, capped at five minutes of total
/// retrying. Per-call retries use `ExponentialBackoff::default()`, whose
/// budget is fifteen minutes.
pub fn error_loop_policy() -> ExponentialBackoff {
    ExponentialBackoff {
        max_elapsed_time: Some(Duration::from_secs(5 * 60)),
        ..ExponentialBackoff::default()
    }
}

/// Runs `operation` until it succeeds or the policy's retry budget is
/// spent, notifying about every intermediate failure. Each call starts
/// from a fresh schedule. Permanent errors are surfaced immediately
/// without retrying.
pub async fn retry_notify<T, F, Fut, N>(
    policy: &ExponentialBackoff,
    mut operation: F,
    mut notify: N,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    N: FnMut(&Error, Duration),
{
    // The policy object carries schedule state (current interval, start
    // time); reset the clone so long-lived policies don't start spent.
    let mut schedule = policy.clone();
    schedule.reset();

    backoff::future::retry_notify(
        schedule,
        || {
            let attempt = operation();
            async move {
                attempt.await.map_err(|err| {
                    if err.is_permanent() {
                        backoff::Error::permanent(err)
                    } else {
                        backoff::Error::transient(err)
                    }
                })
            }
        },
        |err: Error, interval| notify(&err, interval),
    )
    .await
}

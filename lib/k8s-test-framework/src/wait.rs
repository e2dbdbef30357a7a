//! Wait for a condition on the cluster to hold.

use std::{backtrace::Backtrace, future::Future, time::Duration};

use chrono::Utc;
use tokio::time::{sleep, Instant};
use tracing::error;

use crate::{error::TimeoutSnafu, Result};

/// How long and how often a condition is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Total time allowed for the condition to hold.
    pub timeout: Duration,
    /// Sleep between two evaluations.
    pub interval: Duration,
}

impl PollSettings {
    /// Poll once per second until `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            interval: Duration::from_secs(1),
        }
    }
}

/// Repeatedly evaluate `condition` until it returns `true` or `poll.timeout`
/// elapses.
///
/// The deadline is checked before every evaluation, so a zero timeout fails
/// without evaluating. An error returned by `condition` aborts the wait
/// immediately. On timeout the caller's stack trace is logged and carried in
/// [`crate::Error::Timeout`].
pub async fn until<F, Fut>(description: &str, poll: PollSettings, mut condition: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let started_at = Utc::now();
    let deadline = Instant::now() + poll.timeout;

    loop {
        if Instant::now() >= deadline {
            let stack_trace = Backtrace::force_capture().to_string();
            error!(message = "Await timed out.", %description, timeout_secs = poll.timeout.as_secs_f64());
            error!("Full stack trace of caller:\n{stack_trace}");
            return TimeoutSnafu {
                description,
                timeout: poll.timeout,
                started_at,
                stack_trace,
            }
            .fail();
        }

        if condition().await? {
            return Ok(());
        }

        sleep(poll.interval).await;
    }
}

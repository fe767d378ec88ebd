//! Bounded polling used by every DOM assertion.
//!
//! A condition is re-evaluated every `poll_interval` until it is satisfied or
//! `timeout` elapses. Probe errors are treated as "not yet" because the DOM is
//! usually mid-render when they happen; the last observation is carried into
//! the timeout message so a failing assertion says what it actually saw.

use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;

use crate::error::{E2eError, E2eResult};

/// Default timeout for DOM assertions (4 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(4);

/// Timeout for slow UI areas such as the file list and the viewer mask.
pub const LONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Default poll interval (100ms).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitConfig {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl WaitConfig {
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new(timeout, DEFAULT_POLL_INTERVAL)
    }

    pub fn from_millis(timeout_ms: Option<u64>) -> Self {
        timeout_ms
            .map(|ms| Self::with_timeout(Duration::from_millis(ms)))
            .unwrap_or_default()
    }
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT, DEFAULT_POLL_INTERVAL)
    }
}

/// Outcome of one probe of a condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Probe<T> {
    /// The condition holds, with the value that satisfied it.
    Ready(T),
    /// Not satisfied yet; the string describes what was observed.
    Pending(String),
}

/// Polls `probe` until it reports `Ready` or the timeout expires.
pub async fn poll_until<T, F, Fut>(probe: F, config: WaitConfig, description: &str) -> E2eResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = E2eResult<Probe<T>>>,
{
    let start = Instant::now();
    let mut last_observed = String::from("nothing observed");

    loop {
        match probe().await {
            Ok(Probe::Ready(value)) => return Ok(value),
            Ok(Probe::Pending(observed)) => last_observed = observed,
            Err(e) => last_observed = e.to_string(),
        }

        if start.elapsed() >= config.timeout {
            return Err(E2eError::Timeout {
                condition: format!("{description} (last observed: {last_observed})"),
                timeout: config.timeout,
            });
        }

        sleep(config.poll_interval).await;
    }
}

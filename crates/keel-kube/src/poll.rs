//! Readiness poller

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::error::Result;

/// Interval and timeout of a readiness wait
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollConfig {
    #[serde(with = "duration_secs", rename = "intervalSeconds")]
    pub interval: Duration,
    #[serde(with = "duration_secs", rename = "timeoutSeconds")]
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            timeout: Duration::from_secs(5 * 60),
        }
    }
}

impl PollConfig {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

/// Call `predicate` until it returns `true` or `timeout` has elapsed.
///
/// The first check happens immediately. Returns `Ok(false)` on timeout; an
/// error from the predicate ends the wait and is returned as is.
pub async fn poll_until_ready<F, Fut>(
    interval: Duration,
    timeout: Duration,
    mut predicate: F,
) -> Result<bool>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let deadline = Instant::now() + timeout;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        if predicate().await? {
            debug!(attempt, "condition met");
            return Ok(true);
        }

        let now = Instant::now();
        if now >= deadline {
            debug!(attempt, ?timeout, "condition not met before timeout");
            return Ok(false);
        }

        tokio::time::sleep(interval.min(deadline - now)).await;
    }
}

/// Same as [`poll_until_ready`] with the interval and timeout from `config`
pub async fn poll_with<F, Fut>(config: &PollConfig, predicate: F) -> Result<bool>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    poll_until_ready(config.interval, config.timeout, predicate).await
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

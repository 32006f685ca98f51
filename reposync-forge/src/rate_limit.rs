//! Token-bucket gate for outbound source API calls.
//!
//! Capacity `B` and refill period are derived from a requests-per-hour quota
//! the same way the source API advertises it: one token every `3600 s / Q`,
//! bursting up to `Q`. Refill is continuous; waiting parks on a timer and
//! never spins.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::Quota;
use tokio_util::sync::CancellationToken;

use crate::error::ForgeError;

type GovernorRateLimiter = governor::RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

const HOUR: Duration = Duration::from_secs(3600);

/// Cloning shares the bucket.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<GovernorRateLimiter>,
    period: Duration,
    burst: NonZeroU32,
}

impl RateLimiter {
    /// Bucket for a quota of `requests_per_hour` (treated as 1 if zero).
    pub fn per_hour(requests_per_hour: u32) -> Self {
        let quota = requests_per_hour.max(1);
        Self::new(HOUR / quota, quota)
    }

    /// Bucket refilling one token every `period`, holding at most `burst`.
    pub fn new(period: Duration, burst: u32) -> Self {
        let burst = NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN);
        let period = period.max(Duration::from_nanos(1));
        let quota = Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
            .allow_burst(burst);
        Self {
            inner: Arc::new(governor::RateLimiter::direct(quota)),
            period,
            burst,
        }
    }

    /// Wait for one token.
    ///
    /// Fails with [`ForgeError::RateLimitExceeded`] if `cancel` fires before a
    /// token becomes available.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), ForgeError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ForgeError::RateLimitExceeded),
            _ = self.inner.until_ready() => Ok(()),
        }
    }

    /// Time between refilled tokens.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Bucket capacity.
    pub fn burst(&self) -> u32 {
        self.burst.get()
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("period", &self.period)
            .field("burst", &self.burst)
            .finish()
    }
}

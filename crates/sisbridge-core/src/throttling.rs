use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Client-side request quota shared by every upstream call.
///
/// The upstream rate-limits aggressively and answers 429 once exceeded, which
/// is terminal for the retry executor. Waiting here keeps us under its quota.
#[derive(Clone)]
pub struct RequestThrottle {
    limiter: Arc<DirectRateLimiter>,
    quota_window: Duration,
    quota_limit: u32,
}

impl std::fmt::Debug for RequestThrottle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestThrottle")
            .field("quota_window", &self.quota_window)
            .field("quota_limit", &self.quota_limit)
            .finish_non_exhaustive()
    }
}

impl RequestThrottle {
    pub fn new(quota_window: Duration, quota_limit: u32) -> Self {
        let quota = quota_from_window(quota_window, quota_limit);
        Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
            quota_window,
            quota_limit: quota_limit.max(1),
        }
    }

    /// Takes one cell of budget without waiting; `false` when exhausted.
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }

    /// Waits until a cell of budget is available.
    pub async fn acquire(&self) {
        if self.try_acquire() {
            return;
        }
        tracing::debug!(
            quota_limit = self.quota_limit,
            window_ms = self.quota_window.as_millis() as u64,
            "upstream quota exhausted; waiting for budget"
        );
        self.limiter.until_ready().await;
    }
}

fn quota_from_window(quota_window: Duration, quota_limit: u32) -> Quota {
    let burst = NonZeroU32::new(quota_limit).unwrap_or(NonZeroU32::MIN);

    let seconds_per_cell = (quota_window.as_secs_f64() / f64::from(burst.get())).max(0.001);
    let period = Duration::from_secs_f64(seconds_per_cell);

    Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(burst))
        .allow_burst(burst)
}

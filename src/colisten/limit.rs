use std::num::NonZeroU32;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};

/// Token bucket for one action class.
pub struct ActionLimiter {
    inner: DefaultDirectRateLimiter,
}

impl ActionLimiter {
    pub fn per_minute(rate: u32) -> ActionLimiter {
        let rate = NonZeroU32::new(rate.max(1)).expect("rate is clamped to >= 1");
        ActionLimiter {
            inner: RateLimiter::direct(Quota::per_minute(rate)),
        }
    }

    /// Non-blocking probe; a denial is reported back to the initiator.
    pub fn allow(&self) -> bool {
        self.inner.check().is_ok()
    }

    /// Blocks until a token is available. Used for search only, so queries
    /// slow down under load instead of failing.
    pub async fn wait(&self) {
        self.inner.until_ready().await;
    }
}

/// Per-room limiter set. Persisted rooms skip the search limiter entirely and
/// get looser order/like budgets.
pub struct HouseLimits {
    pub search: Option<ActionLimiter>,
    pub order: ActionLimiter,
    pub like: ActionLimiter,
}

impl HouseLimits {
    pub fn new(ultimate: bool) -> HouseLimits {
        if ultimate {
            HouseLimits {
                search: None,
                order: ActionLimiter::per_minute(30),
                like: ActionLimiter::per_minute(30),
            }
        } else {
            HouseLimits {
                search: Some(ActionLimiter::per_minute(10)),
                order: ActionLimiter::per_minute(5),
                like: ActionLimiter::per_minute(5),
            }
        }
    }
}

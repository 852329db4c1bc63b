//! Clock injected into the query cache and the app store.
//!
//! With the `mock-time` feature the clock only moves when a test (or the dev
//! console) moves it, which makes cache expiry and notification timestamps
//! deterministic.

use jiff::{SignedDuration, Timestamp};
#[cfg(feature = "mock-time")]
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Clone)]
pub struct TimeSource {
    #[cfg(feature = "mock-time")]
    frozen_at: Arc<Mutex<Timestamp>>,
}

impl TimeSource {
    #[allow(clippy::new_without_default)]
    #[cfg(not(feature = "mock-time"))]
    pub fn new() -> Self {
        Self {}
    }

    #[cfg(feature = "mock-time")]
    pub fn new(start: Timestamp) -> Self {
        Self {
            frozen_at: Arc::new(Mutex::new(start)),
        }
    }

    pub fn now(&self) -> Timestamp {
        #[cfg(feature = "mock-time")]
        {
            *self.frozen_at.lock().unwrap_or_else(PoisonError::into_inner)
        }
        #[cfg(not(feature = "mock-time"))]
        {
            Timestamp::now()
        }
    }

    /// How long ago `stamp` was according to this clock. Negative when the
    /// stamp lies in the future.
    pub fn age_of(&self, stamp: Timestamp) -> SignedDuration {
        self.now().duration_since(stamp)
    }

    #[cfg(feature = "mock-time")]
    pub fn advance(&self, by: SignedDuration) {
        *self.frozen_at.lock().unwrap_or_else(PoisonError::into_inner) += by;
    }

    #[cfg(feature = "mock-time")]
    pub fn set(&self, to: Timestamp) {
        *self.frozen_at.lock().unwrap_or_else(PoisonError::into_inner) = to;
    }
}

//! Fixed-window request limiting.
//!
//! A window opens at the first request for a key and lasts `period`. Every
//! call increments the key's counter atomically; the request is allowed while
//! the post-increment count is within `requests`. A denied request still
//! counts. When the window elapses the next request opens a new one with
//! count 1.
//!
//! Counters live behind [`WindowStore`]:
//!
//! - [`LocalWindowStore`]: a `DashMap` in this process
//! - [`RedisWindowStore`]: one Redis key per window, shared by every replica

mod local;
mod redis;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use self::local::LocalWindowStore;
pub use self::redis::RedisWindowStore;

/// `requests` per `period_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limit {
    pub requests: u32,
    pub period_secs: u64,
}

impl Limit {
    pub const fn new(requests: u32, period_secs: u64) -> Self {
        Self {
            requests,
            period_secs,
        }
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed {
        limit: u32,
        remaining: u32,
        reset_after: Duration,
    },
    Denied {
        limit: u32,
        retry_after: Duration,
    },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// The counter store could not be reached or did not answer.
    #[error("rate limit store unavailable: {0}")]
    BackendUnavailable(String),
}

/// Counter state right after an increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    /// Requests seen in the current window, this one included.
    pub count: u64,
    /// Time until the window closes.
    pub resets_in: Duration,
}

/// Atomic increment-and-read of a fixed window counter.
///
/// Implementations must make the increment and the window (re)initialization
/// a single atomic step per key.
#[async_trait]
pub trait WindowStore: Send + Sync {
    async fn increment(&self, key: &str, period: Duration) -> Result<WindowCount, RateLimitError>;

    fn name(&self) -> &'static str;

    /// Whether `increment` can return [`RateLimitError`]. A store that can
    /// fail needs an explicit `on_backend_error` policy.
    fn can_fail(&self) -> bool {
        true
    }
}

/// Decides allow/deny per identity and limiter.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn WindowStore>,
    key_prefix: String,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn WindowStore>, key_prefix: impl Into<String>) -> Self {
        Self {
            store,
            key_prefix: key_prefix.into(),
        }
    }

    pub fn backend(&self) -> &'static str {
        self.store.name()
    }

    fn key(&self, limiter: &str, identity: &str) -> String {
        format!("{}{limiter}:{identity}", self.key_prefix)
    }

    /// Counts one request from `identity` against `limit`.
    ///
    /// # Errors
    ///
    /// [`RateLimitError::BackendUnavailable`] when the counter store fails.
    /// Whether that admits the request is the caller's policy.
    pub async fn allow(
        &self,
        identity: &str,
        limiter: &str,
        limit: Limit,
    ) -> Result<Decision, RateLimitError> {
        let window = self
            .store
            .increment(&self.key(limiter, identity), limit.period())
            .await?;

        let requests = u64::from(limit.requests);
        if window.count <= requests {
            Ok(Decision::Allowed {
                limit: limit.requests,
                remaining: (requests - window.count) as u32,
                reset_after: window.resets_in,
            })
        } else {
            tracing::debug!(identity, limiter, count = window.count, "rate limit exceeded");
            Ok(Decision::Denied {
                limit: limit.requests,
                retry_after: window.resets_in,
            })
        }
    }
}

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::Pool;
use redis::Script;

use super::{RateLimitError, WindowCount, WindowStore};

/// INCR opens the window with count 1; the expiry is set by the request that
/// opened it. A key that somehow lost its expiry gets a fresh one so it can
/// never block an identity forever.
static INCREMENT_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
local ttl = redis.call('PTTL', KEYS[1])
if ttl < 0 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
    ttl = tonumber(ARGV[1])
end
return {count, ttl}
",
    )
});

/// Counters in Redis, shared by every replica.
///
/// The whole increment runs as one Lua script, which Redis executes
/// atomically, so no client-side locking is involved.
#[derive(Clone)]
pub struct RedisWindowStore {
    pool: Pool,
}

impl RedisWindowStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WindowStore for RedisWindowStore {
    async fn increment(&self, key: &str, period: Duration) -> Result<WindowCount, RateLimitError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| RateLimitError::BackendUnavailable(e.to_string()))?;

        let period_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX).max(1);
        let (count, ttl_ms): (i64, i64) = INCREMENT_SCRIPT
            .key(key)
            .arg(period_ms)
            .invoke_async(&mut *conn)
            .await
            .map_err(|e| RateLimitError::BackendUnavailable(e.to_string()))?;

        Ok(WindowCount {
            count: count.max(0) as u64,
            resets_in: Duration::from_millis(ttl_ms.max(0) as u64),
        })
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

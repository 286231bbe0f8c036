//! Key-value cache with a process-local and a shared Redis mode.

use dashmap::DashMap;
use deadpool_redis::Pool;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// The cache store could not be reached.
///
/// Callers decide the recovery; for reads the answer is always to fall through
/// to the store of record.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache connection failed: {0}")]
    Connection(String),

    #[error("cache command failed: {0}")]
    Command(String),
}

/// A cached entry with TTL support.
#[derive(Clone, Debug)]
pub struct CachedEntry {
    pub data: Arc<Vec<u8>>,
    pub cached_at: Instant,
    pub ttl: Duration,
}

impl CachedEntry {
    pub fn new(data: Vec<u8>, ttl: Duration) -> Self {
        Self {
            data: Arc::new(data),
            cached_at: Instant::now(),
            ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.cached_at.elapsed() >= self.ttl
    }
}

/// Cache backend.
///
/// ## Cache Modes
///
/// - **Local**: one process, entries in a `DashMap`, TTL enforced on read
/// - **Redis**: shared by every replica, TTL enforced by Redis (`SET .. EX`)
///
/// Redis mode keeps no local tier, so every replica sees the same entry.
#[derive(Clone)]
pub enum CacheBackend {
    Local(Arc<DashMap<String, CachedEntry>>),
    Redis(Pool),
}

impl CacheBackend {
    pub fn new_local() -> Self {
        CacheBackend::Local(Arc::new(DashMap::new()))
    }

    pub fn new_redis(redis_pool: Pool) -> Self {
        CacheBackend::Redis(redis_pool)
    }

    /// Gets a value. `Ok(None)` is a miss (absent or expired).
    pub async fn get(&self, key: &str) -> Result<Option<Arc<Vec<u8>>>, CacheError> {
        match self {
            CacheBackend::Local(map) => {
                let hit = map.get(key).map(|entry| entry.clone());
                match hit {
                    Some(entry) if !entry.is_expired() => Ok(Some(entry.data)),
                    Some(_) => {
                        map.remove_if(key, |_, entry| entry.is_expired());
                        Ok(None)
                    }
                    None => Ok(None),
                }
            }
            CacheBackend::Redis(pool) => {
                let mut conn = pool
                    .get()
                    .await
                    .map_err(|e| CacheError::Connection(e.to_string()))?;
                let data = conn
                    .get::<_, Option<Vec<u8>>>(key)
                    .await
                    .map_err(|e| CacheError::Command(e.to_string()))?;
                Ok(data.map(Arc::new))
            }
        }
    }

    /// Sets a value with TTL. Redis rounds the TTL up to whole seconds.
    pub async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        match self {
            CacheBackend::Local(map) => {
                map.insert(key.to_string(), CachedEntry::new(value, ttl));
                Ok(())
            }
            CacheBackend::Redis(pool) => {
                let ttl_secs = ttl.as_secs_f64().ceil().max(1.0) as u64;
                let mut conn = pool
                    .get()
                    .await
                    .map_err(|e| CacheError::Connection(e.to_string()))?;
                conn.set_ex::<_, _, ()>(key, value, ttl_secs)
                    .await
                    .map_err(|e| CacheError::Command(e.to_string()))?;
                tracing::debug!(key = %key, ttl_secs, "cache set");
                Ok(())
            }
        }
    }

    /// Drops expired local entries. A no-op in Redis mode.
    pub fn purge_expired(&self) -> usize {
        match self {
            CacheBackend::Local(map) => {
                let before = map.len();
                map.retain(|_, entry| !entry.is_expired());
                before.saturating_sub(map.len())
            }
            CacheBackend::Redis(_) => 0,
        }
    }

    /// Check if Redis is reachable (always true in local mode).
    pub async fn is_available(&self) -> bool {
        match self {
            CacheBackend::Local(_) => true,
            CacheBackend::Redis(pool) => match pool.get().await {
                Ok(mut conn) => {
                    let pong: redis::RedisResult<String> =
                        redis::cmd("PING").query_async(&mut *conn).await;
                    pong.is_ok()
                }
                Err(_) => false,
            },
        }
    }

    pub fn mode(&self) -> &'static str {
        match self {
            CacheBackend::Local(_) => "local",
            CacheBackend::Redis(_) => "redis",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_local_set_get() {
        let cache = CacheBackend::new_local();
        cache
            .set("k", b"value".to_vec(), Duration::from_secs(30))
            .await
            .unwrap();

        let hit = cache.get("k").await.unwrap().unwrap();
        assert_eq!(hit.as_slice(), b"value");
        assert!(cache.get("other").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_entry_expires() {
        let cache = CacheBackend::new_local();
        cache
            .set("k", b"value".to_vec(), Duration::from_secs(30))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(cache.get("k").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get("k").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let cache = CacheBackend::new_local();
        cache.set("short", vec![1], Duration::from_secs(1)).await.unwrap();
        cache.set("long", vec![2], Duration::from_secs(60)).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.get("long").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_local_mode_reports_available() {
        let cache = CacheBackend::new_local();
        assert_eq!(cache.mode(), "local");
        assert!(cache.is_available().await);
    }
}

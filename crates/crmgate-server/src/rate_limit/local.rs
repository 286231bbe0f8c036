use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use super::{RateLimitError, WindowCount, WindowStore};

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u64,
    started: Instant,
}

/// Counters held in this process.
///
/// The entry guard holds the shard lock for the whole read-increment-write, so
/// concurrent requests for one key serialize. Counters reset on restart and
/// are not shared between replicas.
#[derive(Debug, Default)]
pub struct LocalWindowStore {
    windows: DashMap<String, Window>,
}

impl LocalWindowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops windows idle for longer than `max_period`.
    pub fn purge_idle(&self, max_period: Duration) -> usize {
        let before = self.windows.len();
        self.windows
            .retain(|_, window| window.started.elapsed() < max_period);
        before.saturating_sub(self.windows.len())
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

#[async_trait]
impl WindowStore for LocalWindowStore {
    async fn increment(&self, key: &str, period: Duration) -> Result<WindowCount, RateLimitError> {
        let now = Instant::now();
        let mut window = self.windows.entry(key.to_string()).or_insert(Window {
            count: 0,
            started: now,
        });

        let mut elapsed = now.saturating_duration_since(window.started);
        if elapsed >= period {
            *window = Window {
                count: 0,
                started: now,
            };
            elapsed = Duration::ZERO;
        }
        window.count += 1;

        Ok(WindowCount {
            count: window.count,
            resets_in: period - elapsed,
        })
    }

    fn name(&self) -> &'static str {
        "local"
    }

    fn can_fail(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_first_request_opens_window() {
        let store = LocalWindowStore::new();
        let period = Duration::from_secs(60);

        let first = store.increment("k", period).await.unwrap();
        assert_eq!(first.count, 1);
        assert_eq!(first.resets_in, period);

        tokio::time::advance(Duration::from_secs(20)).await;
        let second = store.increment("k", period).await.unwrap();
        assert_eq!(second.count, 2);
        assert_eq!(second.resets_in, Duration::from_secs(40));
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_window_restarts_at_one() {
        let store = LocalWindowStore::new();
        let period = Duration::from_secs(60);
        store.increment("k", period).await.unwrap();
        store.increment("k", period).await.unwrap();

        tokio::time::advance(period).await;
        assert_eq!(store.increment("k", period).await.unwrap().count, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_are_not_lost() {
        let store = Arc::new(LocalWindowStore::new());
        let period = Duration::from_secs(3600);

        let tasks: Vec<_> = (0..64)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.increment("hot", period).await.unwrap() })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(store.increment("hot", period).await.unwrap().count, 65);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_idle() {
        let store = LocalWindowStore::new();
        store.increment("old", Duration::from_secs(60)).await.unwrap();
        tokio::time::advance(Duration::from_secs(120)).await;
        store.increment("new", Duration::from_secs(60)).await.unwrap();

        assert_eq!(store.purge_idle(Duration::from_secs(60)), 1);
        assert_eq!(store.len(), 1);
    }
}

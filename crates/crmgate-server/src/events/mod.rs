//! Domain event emission.
//!
//! Write handlers hand a [`DomainEvent`] to the [`EventEmitter`] after the
//! store of record commits. The emitter publishes it on its own task and never
//! reports back: delivery is at-most-once and a failed publish is only logged.
//!
//! The number of publications in flight is bounded. When the bound is reached
//! new events are dropped (and logged) instead of queued, so a slow broker
//! cannot pile up unbounded background work. Every outcome, drops included,
//! is counted in `events_published_total`.

mod redis;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use crmgate_core::DomainEvent;
use futures_util::FutureExt;
use tokio::sync::Semaphore;

use crate::metrics::{self, PublishOutcome};

pub use self::redis::{RedisStreamPublisher, stream_for};

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("broker connection failed: {0}")]
    Connection(String),

    #[error("broker rejected event: {0}")]
    Rejected(String),

    #[error("event could not be encoded: {0}")]
    Encoding(String),
}

/// Sends one event to the broker. Implementations must not retry.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &DomainEvent) -> Result<(), PublishError>;

    fn name(&self) -> &'static str;
}

/// Logs events instead of sending them. Used when no broker is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPublisher;

#[async_trait]
impl EventPublisher for LogPublisher {
    async fn publish(&self, event: &DomainEvent) -> Result<(), PublishError> {
        tracing::info!(
            event_type = %event.event_type,
            event_key = %event.partition_key,
            payload_bytes = event.payload.len(),
            "domain event"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Bounded fire-and-forget dispatcher for domain events.
pub struct EventEmitter {
    publisher: Arc<dyn EventPublisher>,
    permits: Arc<Semaphore>,
    capacity: u32,
    timeout: Duration,
}

impl EventEmitter {
    /// `capacity` bounds concurrent publications; `timeout` bounds each one.
    pub fn new(publisher: Arc<dyn EventPublisher>, capacity: usize, timeout: Duration) -> Self {
        let capacity = u32::try_from(capacity.max(1)).unwrap_or(u32::MAX >> 3);
        Self {
            publisher,
            permits: Arc::new(Semaphore::new(capacity as usize)),
            capacity,
            timeout,
        }
    }

    pub fn publisher_name(&self) -> &'static str {
        self.publisher.name()
    }

    /// Publications currently running.
    pub fn in_flight(&self) -> usize {
        (self.capacity as usize).saturating_sub(self.permits.available_permits())
    }

    /// Schedules `event` for publication and returns immediately.
    ///
    /// Returns `false` when the event was dropped because `capacity`
    /// publications are already running. The spawned task is detached from
    /// the caller: it finishes (or times out) even if the request that
    /// produced the event has completed or was cancelled.
    pub fn emit(&self, event: DomainEvent) -> bool {
        let Ok(permit) = self.permits.clone().try_acquire_owned() else {
            metrics::record_publish(self.publisher.name(), PublishOutcome::Dropped);
            tracing::warn!(
                event_type = %event.event_type,
                event_key = %event.partition_key,
                capacity = self.capacity,
                "event emitter saturated, dropping event"
            );
            return false;
        };

        let publisher = self.publisher.clone();
        let timeout = self.timeout;
        tokio::spawn(async move {
            let _permit = permit;
            let publish = AssertUnwindSafe(publisher.publish(&event)).catch_unwind();
            let outcome = match tokio::time::timeout(timeout, publish).await {
                Ok(Ok(Ok(()))) => {
                    tracing::debug!(
                        event_type = %event.event_type,
                        event_key = %event.partition_key,
                        publisher = publisher.name(),
                        "event published"
                    );
                    PublishOutcome::Ok
                }
                Ok(Ok(Err(e))) => {
                    tracing::warn!(
                        event_type = %event.event_type,
                        event_key = %event.partition_key,
                        publisher = publisher.name(),
                        error = %e,
                        "event publish failed"
                    );
                    PublishOutcome::Failed
                }
                Ok(Err(panic)) => {
                    let msg = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    tracing::error!(
                        event_type = %event.event_type,
                        event_key = %event.partition_key,
                        publisher = publisher.name(),
                        panic = %msg,
                        "event publisher panicked"
                    );
                    PublishOutcome::Panicked
                }
                Err(_) => {
                    tracing::warn!(
                        event_type = %event.event_type,
                        event_key = %event.partition_key,
                        publisher = publisher.name(),
                        timeout_ms = timeout.as_millis() as u64,
                        "event publish timed out"
                    );
                    PublishOutcome::Timeout
                }
            };
            metrics::record_publish(publisher.name(), outcome);
        });
        true
    }

    /// Waits until every in-flight publication has finished, up to `deadline`.
    ///
    /// Returns `true` when the emitter is idle.
    pub async fn drain(&self, deadline: Duration) -> bool {
        let in_flight = self.in_flight();
        if in_flight == 0 {
            return true;
        }
        tracing::info!(in_flight, "waiting for in-flight events");
        match tokio::time::timeout(deadline, self.permits.acquire_many(self.capacity)).await {
            Ok(Ok(_all)) => true,
            _ => {
                tracing::warn!(
                    in_flight = self.in_flight(),
                    "shutdown deadline reached with events still in flight"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crmgate_core::{DomainEventType, NewCustomer};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn event(id: i64) -> DomainEvent {
        let customer = NewCustomer {
            name: "Ali".into(),
            email: "ali@example.com".into(),
            phone: "5551234567".into(),
        }
        .into_customer(id);
        DomainEvent::customer_created(&customer).unwrap()
    }

    #[derive(Default)]
    struct Recording {
        published: AtomicUsize,
    }

    #[async_trait]
    impl EventPublisher for Recording {
        async fn publish(&self, event: &DomainEvent) -> Result<(), PublishError> {
            assert_eq!(event.event_type, DomainEventType::CustomerCreated);
            self.published.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    /// Blocks every publish until a permit is released for it.
    struct Gated {
        release: Semaphore,
    }

    impl Gated {
        fn new() -> Self {
            Self {
                release: Semaphore::new(0),
            }
        }
    }

    #[async_trait]
    impl EventPublisher for Gated {
        async fn publish(&self, _event: &DomainEvent) -> Result<(), PublishError> {
            self.release.acquire().await.unwrap().forget();
            Ok(())
        }

        fn name(&self) -> &'static str {
            "gated"
        }
    }

    struct Panicking;

    #[async_trait]
    impl EventPublisher for Panicking {
        async fn publish(&self, _event: &DomainEvent) -> Result<(), PublishError> {
            panic!("broker client bug");
        }

        fn name(&self) -> &'static str {
            "panicking"
        }
    }

    #[tokio::test]
    async fn test_emit_publishes_in_background() {
        let publisher = Arc::new(Recording::default());
        let emitter = EventEmitter::new(publisher.clone(), 4, Duration::from_secs(2));

        assert!(emitter.emit(event(1)));
        assert!(emitter.drain(Duration::from_secs(1)).await);
        assert_eq!(publisher.published.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_saturated_emitter_drops_events() {
        let publisher = Arc::new(Gated::new());
        let emitter = EventEmitter::new(publisher.clone(), 2, Duration::from_secs(60));

        assert!(emitter.emit(event(1)));
        assert!(emitter.emit(event(2)));
        assert!(!emitter.emit(event(3)));
        assert_eq!(emitter.in_flight(), 2);

        publisher.release.add_permits(2);
        assert!(emitter.drain(Duration::from_secs(1)).await);
        assert_eq!(emitter.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_timeout_releases_slot() {
        let emitter = EventEmitter::new(Arc::new(Gated::new()), 1, Duration::from_secs(2));

        assert!(emitter.emit(event(1)));
        assert!(!emitter.drain(Duration::from_millis(500)).await);
        assert!(emitter.drain(Duration::from_secs(5)).await);
        assert!(emitter.emit(event(2)));
    }

    #[tokio::test]
    async fn test_publisher_panic_is_contained() {
        let emitter = EventEmitter::new(Arc::new(Panicking), 1, Duration::from_secs(2));

        assert!(emitter.emit(event(1)));
        assert!(emitter.drain(Duration::from_secs(1)).await);
        assert!(emitter.emit(event(2)));
    }

    #[tokio::test]
    async fn test_log_publisher_accepts_everything() {
        assert!(LogPublisher.publish(&event(1)).await.is_ok());
        assert_eq!(LogPublisher.name(), "log");
    }
}

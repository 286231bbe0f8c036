//! Redis Streams publisher.
//!
//! Each event is one `XADD` entry with fields `key`, `type`, `payload` and
//! `ts`. With more than one partition, events are spread over
//! `{stream}:{n}` by a stable hash of the partition key, so every event about
//! one entity lands on the same stream in emission order.

use async_trait::async_trait;
use crmgate_core::DomainEvent;
use deadpool_redis::{Pool, redis::AsyncCommands};
use redis::streams::StreamMaxlen;
use time::format_description::well_known::Rfc3339;

use super::{EventPublisher, PublishError};

pub struct RedisStreamPublisher {
    pool: Pool,
    stream: String,
    partitions: u32,
    max_len: usize,
}

impl RedisStreamPublisher {
    pub fn new(pool: Pool, stream: impl Into<String>, partitions: u32, max_len: usize) -> Self {
        Self {
            pool,
            stream: stream.into(),
            partitions: partitions.max(1),
            max_len,
        }
    }
}

#[async_trait]
impl EventPublisher for RedisStreamPublisher {
    async fn publish(&self, event: &DomainEvent) -> Result<(), PublishError> {
        let ts = event
            .timestamp
            .format(&Rfc3339)
            .map_err(|e| PublishError::Encoding(e.to_string()))?;
        let stream = stream_for(&self.stream, self.partitions, &event.partition_key);

        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| PublishError::Connection(e.to_string()))?;

        let fields: [(&str, &[u8]); 4] = [
            ("key", event.partition_key.as_bytes()),
            ("type", event.event_type.as_str().as_bytes()),
            ("payload", event.payload.as_slice()),
            ("ts", ts.as_bytes()),
        ];
        let id: String = conn
            .xadd_maxlen(&stream, StreamMaxlen::Approx(self.max_len), "*", &fields)
            .await
            .map_err(|e| PublishError::Rejected(e.to_string()))?;

        tracing::debug!(stream = %stream, entry_id = %id, event_key = %event.partition_key, "event appended");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis-stream"
    }
}

/// Stream an event with `partition_key` is written to.
pub fn stream_for(stream: &str, partitions: u32, partition_key: &str) -> String {
    if partitions <= 1 {
        return stream.to_string();
    }
    format!("{stream}:{}", fnv1a(partition_key.as_bytes()) % partitions)
}

/// 32-bit FNV-1a.
fn fnv1a(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in bytes {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

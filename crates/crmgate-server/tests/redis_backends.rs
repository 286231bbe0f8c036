//! Shared backends against a real Redis.
//!
//! Run with `cargo test -- --ignored` on a host with Docker.

use std::sync::Arc;
use std::time::Duration;

use crmgate_core::{Customer, DomainEvent};
use crmgate_server::cache::{CacheBackend, create_redis_pool};
use crmgate_server::config::RedisConfig;
use crmgate_server::events::{EventPublisher, RedisStreamPublisher};
use crmgate_server::rate_limit::{Decision, Limit, RateLimiter, RedisWindowStore};
use redis::AsyncCommands;
use redis::streams::StreamRangeReply;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::redis::Redis;

async fn start_redis() -> (ContainerAsync<Redis>, deadpool_redis::Pool) {
    let container = Redis::default().start().await.expect("start redis container");
    let host_port = container.get_host_port_ipv4(6379).await.expect("get port");
    let config = RedisConfig {
        enabled: true,
        url: format!("redis://127.0.0.1:{host_port}"),
        ..RedisConfig::default()
    };
    let pool = create_redis_pool(&config)
        .await
        .expect("create pool")
        .expect("redis enabled");
    (container, pool)
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_cache_entries_are_shared_and_expire() {
    let (_container, pool) = start_redis().await;
    let writer = CacheBackend::new_redis(pool.clone());
    let reader = CacheBackend::new_redis(pool);

    assert!(writer.is_available().await);
    writer
        .set("crmgate:cache:k", b"page".to_vec(), Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(
        reader.get("crmgate:cache:k").await.unwrap(),
        Some(Arc::new(b"page".to_vec()))
    );

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(reader.get("crmgate:cache:k").await.unwrap(), None);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_counters_are_shared_between_instances() {
    let (_container, pool) = start_redis().await;
    let first = RateLimiter::new(Arc::new(RedisWindowStore::new(pool.clone())), "crmgate:ratelimit:");
    let second = RateLimiter::new(Arc::new(RedisWindowStore::new(pool)), "crmgate:ratelimit:");
    let limit = Limit::new(5, 60);

    for n in 0..5 {
        let limiter = if n % 2 == 0 { &first } else { &second };
        let decision = limiter.allow("10.0.0.1", "writes", limit).await.unwrap();
        assert!(decision.is_allowed(), "request {n}");
    }

    match second.allow("10.0.0.1", "writes", limit).await.unwrap() {
        Decision::Denied { retry_after, .. } => {
            assert!(retry_after > Duration::ZERO && retry_after <= Duration::from_secs(60));
        }
        other => panic!("expected denied, got {other:?}"),
    }
    assert!(first.allow("10.0.0.2", "writes", limit).await.unwrap().is_allowed());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_events_are_appended_to_stream() {
    let (_container, pool) = start_redis().await;
    let publisher = RedisStreamPublisher::new(pool.clone(), "crm-events", 1, 1000);

    let customer = Customer {
        id: 7,
        name: "Ali Veli".into(),
        email: "ali@example.com".into(),
        phone: "5551234567".into(),
    };
    let event = DomainEvent::customer_created(&customer).unwrap();
    publisher.publish(&event).await.unwrap();

    let mut conn = pool.get().await.unwrap();
    let reply: StreamRangeReply = conn.xrange_all("crm-events").await.unwrap();
    assert_eq!(reply.ids.len(), 1);
    let entry = &reply.ids[0];
    assert_eq!(entry.get::<String>("type").as_deref(), Some("customer.created"));
    assert_eq!(entry.get::<String>("key").as_deref(), Some("customer-7"));

    let payload: Vec<u8> = entry.get("payload").unwrap();
    let decoded: Customer = serde_json::from_slice(&payload).unwrap();
    assert_eq!(decoded, customer);
}

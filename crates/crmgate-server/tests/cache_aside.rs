//! Cached list reads: hits skip the store, entries expire after the TTL, and
//! writes do not purge them.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use crmgate_server::ServerBuilder;
use crmgate_server::cache::{CacheBackend, create_redis_pool};
use crmgate_server::config::RedisConfig;
use crmgate_storage::InMemoryStore;
use serde_json::{Value, json};
use tower::ServiceExt;

const CLIENT: &str = "10.1.0.1";

async fn setup() -> (Router, String, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    let server = common::build(common::config(), store.clone(), None).await;
    let token = common::token(&server);
    (server.app(), token, store)
}

async fn create(app: &Router, token: &str, n: u32) {
    let res = app
        .clone()
        .oneshot(common::post_json(
            "/api/customers",
            CLIENT,
            Some(token),
            json!({ "name": format!("Customer {n}"), "email": format!("c{n}@example.com"), "phone": "5551234567" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
}

async fn list(app: &Router, token: &str, query: &str) -> Value {
    let res = app
        .clone()
        .oneshot(common::get(&format!("/api/customers{query}"), CLIENT, Some(token)))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    common::json_body(res).await
}

#[tokio::test(start_paused = true)]
async fn test_repeated_read_is_served_from_cache() {
    let (app, token, store) = setup().await;
    create(&app, &token, 1).await;

    let first = list(&app, &token, "").await;
    let reads = store.read_count();
    assert!(reads > 0);

    // Explicit defaults are the same request.
    let second = list(&app, &token, "?page=1&pageSize=10").await;
    assert_eq!(first, second);
    assert_eq!(store.read_count(), reads);
}

#[tokio::test(start_paused = true)]
async fn test_entry_expires_after_ttl() {
    let (app, token, store) = setup().await;
    create(&app, &token, 1).await;

    let before = list(&app, &token, "").await;
    assert_eq!(before["total"], 1);

    // Writes do not purge cached pages.
    create(&app, &token, 2).await;
    let stale = list(&app, &token, "").await;
    assert_eq!(stale["total"], 1);
    let reads = store.read_count();

    tokio::time::advance(Duration::from_secs(31)).await;

    let fresh = list(&app, &token, "").await;
    assert_eq!(fresh["total"], 2);
    assert!(store.read_count() > reads);
}

#[tokio::test(start_paused = true)]
async fn test_total_is_independent_of_page() {
    let (app, token, _store) = setup().await;
    for n in 1..=3 {
        create(&app, &token, n).await;
    }

    let page1 = list(&app, &token, "?page=1&pageSize=2").await;
    assert_eq!(page1["items"].as_array().unwrap().len(), 2);
    assert_eq!(page1["total"], 3);

    let page2 = list(&app, &token, "?page=2&pageSize=2").await;
    assert_eq!(page2["items"].as_array().unwrap().len(), 1);
    assert_eq!(page2["total"], 3);

    // Newest first.
    assert_eq!(page1["items"][0]["name"], "Customer 3");
    assert_eq!(page2["items"][0]["name"], "Customer 1");
}

#[tokio::test(start_paused = true)]
async fn test_out_of_range_paging_is_normalized() {
    let (app, token, _store) = setup().await;
    create(&app, &token, 1).await;

    let page = list(&app, &token, "?page=-4&pageSize=1000").await;
    assert_eq!(page["page"], 1);
    assert_eq!(page["pageSize"], 100);

    let page = list(&app, &token, "?page=abc&pageSize=0").await;
    assert_eq!(page["page"], 1);
    assert_eq!(page["pageSize"], 10);
}

#[tokio::test(start_paused = true)]
async fn test_store_outage_is_an_error_not_an_empty_page() {
    let (app, token, store) = setup().await;
    store.set_available(false);

    let res = app
        .oneshot(common::get("/api/customers", CLIENT, Some(&token)))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = common::json_body(res).await;
    assert_eq!(body["error"], "internal server error");
}

#[tokio::test]
async fn test_unreachable_cache_falls_through_to_store() {
    // Nothing listens on port 1; the pool is created without connecting.
    let redis = RedisConfig {
        enabled: true,
        url: "redis://127.0.0.1:1".to_string(),
        timeout_ms: 200,
        ..RedisConfig::default()
    };
    let pool = create_redis_pool(&redis)
        .await
        .unwrap()
        .expect("redis enabled");

    let store = Arc::new(InMemoryStore::new());
    let server = ServerBuilder::new()
        .with_config(common::config())
        .with_store(store.clone())
        .with_cache(CacheBackend::new_redis(pool))
        .build()
        .await
        .unwrap();
    let token = common::token(&server);
    let app = server.app();
    assert!(!server.state().cache.is_available().await);

    create(&app, &token, 1).await;

    let first = list(&app, &token, "").await;
    assert_eq!(first["total"], 1);
    let reads = store.read_count();
    assert!(reads > 0);

    // Neither the failed read nor the failed write-back is cached anywhere.
    let second = list(&app, &token, "").await;
    assert_eq!(second, first);
    assert!(store.read_count() > reads);
}

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, header};
use crmgate_core::DomainEvent;
use crmgate_server::config::StorageBackend;
use crmgate_server::events::{EventPublisher, PublishError};
use crmgate_server::{AppConfig, CrmgateServer, ServerBuilder};
use crmgate_storage::InMemoryStore;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};

pub const SECRET: &str = "integration-secret-0123456789abcdef";

pub fn config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.storage.backend = StorageBackend::Memory;
    cfg.auth.secret = SECRET.into();
    cfg
}

pub async fn build(
    cfg: AppConfig,
    store: Arc<InMemoryStore>,
    publisher: Option<Arc<dyn EventPublisher>>,
) -> CrmgateServer {
    let mut builder = ServerBuilder::new().with_config(cfg).with_store(store);
    if let Some(publisher) = publisher {
        builder = builder.with_publisher(publisher);
    }
    builder.build().await.unwrap()
}

/// Serves `app` on an ephemeral port with peer addresses available.
pub async fn spawn(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    addr
}

pub fn token(server: &CrmgateServer) -> String {
    server
        .state()
        .signer
        .as_ref()
        .unwrap()
        .issue("1", "agent@example.com")
        .unwrap()
}

/// A correctly signed token that expired an hour ago.
pub fn expired_token() -> String {
    let exp = time::OffsetDateTime::now_utc().unix_timestamp() - 3600;
    encode(
        &Header::default(),
        &json!({ "sub": "1", "exp": exp }),
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

pub fn get(uri: &str, client: &str, token: Option<&str>) -> Request<Body> {
    let mut req = Request::get(uri).header("x-forwarded-for", client);
    if let Some(token) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    req.body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, client: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut req = Request::post(uri)
        .header("x-forwarded-for", client)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    req.body(Body::from(body.to_string())).unwrap()
}

pub async fn json_body(res: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Keeps every published event.
#[derive(Default)]
pub struct Collecting {
    pub events: Mutex<Vec<DomainEvent>>,
}

#[async_trait]
impl EventPublisher for Collecting {
    async fn publish(&self, event: &DomainEvent) -> Result<(), PublishError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "collecting"
    }
}

/// Every publish fails as if the broker were down.
pub struct Unreachable;

#[async_trait]
impl EventPublisher for Unreachable {
    async fn publish(&self, _event: &DomainEvent) -> Result<(), PublishError> {
        Err(PublishError::Connection("connection refused".into()))
    }

    fn name(&self) -> &'static str {
        "unreachable"
    }
}

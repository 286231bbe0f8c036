//! # crmgate-server
//!
//! The HTTP request pipeline in front of the CRM store of record. Every
//! request passes the same stages in order: rate limiting by client identity,
//! bearer token verification, then the handler. Reads go through a
//! cache-aside layer; committed writes emit domain events to the broker
//! without waiting for delivery.

pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod handlers;
pub mod identity;
pub mod metrics;
pub mod middleware;
pub mod observability;
pub mod pipeline;
pub mod query;
pub mod rate_limit;
pub mod records;
pub mod server;

pub use cache::{CacheBackend, CachedEntry};
pub use config::{AppConfig, CacheConfig, EventsConfig, RateLimitConfig, RedisConfig, ServerConfig};
pub use error::ApiError;
pub use events::{EventEmitter, EventPublisher, LogPublisher, PublishError};
pub use metrics::{init_metrics, render_metrics};
pub use observability::init_tracing;
pub use rate_limit::{Decision, Limit, RateLimiter, WindowStore};
pub use server::{AppState, CrmgateServer, ServerBuilder, build_app};

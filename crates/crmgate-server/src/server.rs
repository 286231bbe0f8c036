use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use crmgate_auth::{TokenSigner, TokenVerifier};
use crmgate_db_postgres::PostgresStore;
use crmgate_storage::{DynRecordStore, InMemoryStore};
use tokio::task::JoinHandle;

use crate::cache::{self, CacheBackend};
use crate::config::{AppConfig, RateLimitBackend, StorageBackend};
use crate::events::{EventEmitter, EventPublisher, LogPublisher, RedisStreamPublisher};
use crate::handlers;
use crate::metrics;
use crate::pipeline;
use crate::query::QueryService;
use crate::rate_limit::{LocalWindowStore, RateLimiter, RedisWindowStore, WindowStore};
use crate::records::RecordService;

const PURGE_INTERVAL: Duration = Duration::from_secs(30);

/// Shared state handed to every middleware and handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: DynRecordStore,
    pub cache: CacheBackend,
    pub queries: Arc<QueryService>,
    pub records: Arc<RecordService>,
    pub rate_limiter: Arc<RateLimiter>,
    pub verifier: Arc<dyn TokenVerifier>,
    /// Present when this server issues its own tokens.
    pub signer: Option<Arc<TokenSigner>>,
    pub emitter: Arc<EventEmitter>,
}

/// The routed application with the full request pipeline applied.
pub fn build_app(state: AppState) -> Router {
    pipeline::apply(handlers::routes(state.signer.is_some()), state)
}

pub struct CrmgateServer {
    addr: SocketAddr,
    app: Router,
    state: AppState,
    postgres: Option<Arc<PostgresStore>>,
    background: Vec<JoinHandle<()>>,
}

/// Assembles the server from config. Each `with_*` override replaces the
/// component that would otherwise be built from config.
pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
    store: Option<DynRecordStore>,
    publisher: Option<Arc<dyn EventPublisher>>,
    window_store: Option<Arc<dyn WindowStore>>,
    cache: Option<CacheBackend>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
            store: None,
            publisher: None,
            window_store: None,
            cache: None,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    pub fn with_store(mut self, store: DynRecordStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn with_window_store(mut self, store: Arc<dyn WindowStore>) -> Self {
        self.window_store = Some(store);
        self
    }

    pub fn with_cache(mut self, cache: CacheBackend) -> Self {
        self.cache = Some(cache);
        self
    }

    pub async fn build(self) -> anyhow::Result<CrmgateServer> {
        let config = self.config;
        config.validate().map_err(anyhow::Error::msg)?;

        let mut postgres = None;
        let store: DynRecordStore = match self.store {
            Some(store) => store,
            None => match config.storage.backend {
                StorageBackend::Postgres => {
                    let pg = Arc::new(PostgresStore::new(&config.storage.postgres).await?);
                    tracing::info!("Postgres store of record ready");
                    postgres = Some(pg.clone());
                    pg
                }
                StorageBackend::Memory => {
                    tracing::warn!("Using the in-memory store; records are lost on restart");
                    Arc::new(InMemoryStore::new())
                }
            },
        };

        metrics::init_metrics();

        let redis_pool = cache::create_redis_pool(&config.redis).await?;

        let cache = self
            .cache
            .unwrap_or_else(|| cache::create_cache_backend(redis_pool.as_ref()));

        let mut local_windows = None;
        let window_store: Arc<dyn WindowStore> = match (self.window_store, &redis_pool) {
            (Some(store), _) => store,
            (None, Some(pool)) if config.rate_limit.backend == RateLimitBackend::Redis => {
                Arc::new(RedisWindowStore::new(pool.clone()))
            }
            (None, _) => {
                let local = Arc::new(LocalWindowStore::new());
                local_windows = Some(local.clone());
                local
            }
        };
        if window_store.can_fail() && config.rate_limit.on_backend_error.is_none() {
            anyhow::bail!(
                "rate_limit.on_backend_error (\"allow\" or \"deny\") is required with the {} counter store",
                window_store.name()
            );
        }
        let rate_limiter = Arc::new(RateLimiter::new(
            window_store,
            config.rate_limit.key_prefix.clone(),
        ));

        let publisher: Arc<dyn EventPublisher> = match (self.publisher, &redis_pool) {
            (Some(publisher), _) => publisher,
            (None, Some(pool)) => Arc::new(RedisStreamPublisher::new(
                pool.clone(),
                config.events.stream.clone(),
                config.events.partitions,
                config.events.max_len,
            )),
            (None, None) => Arc::new(LogPublisher),
        };
        let emitter = Arc::new(EventEmitter::new(
            publisher,
            config.events.max_in_flight,
            config.events.publish_timeout(),
        ));

        let auth = crmgate_auth::setup(&config.auth).await?;

        let queries = Arc::new(QueryService::new(
            cache.clone(),
            store.clone(),
            config.cache.ttl(),
            config.cache.key_prefix.clone(),
        ));
        let records = Arc::new(RecordService::new(store.clone(), emitter.clone()));

        tracing::info!(
            cache = cache.mode(),
            rate_limit = rate_limiter.backend(),
            events = emitter.publisher_name(),
            "pipeline assembled"
        );

        let mut background = Vec::new();
        if let Some(task) = auth.refresh_task {
            background.push(task);
        }
        background.push(spawn_purge_task(
            cache.clone(),
            local_windows,
            longest_period(&config),
        ));

        let state = AppState {
            config: Arc::new(config),
            store,
            cache,
            queries,
            records,
            rate_limiter,
            verifier: auth.verifier,
            signer: auth.signer.map(Arc::new),
            emitter,
        };

        Ok(CrmgateServer {
            addr: self.addr,
            app: build_app(state.clone()),
            state,
            postgres,
            background,
        })
    }
}

fn longest_period(config: &AppConfig) -> Duration {
    let limits = &config.rate_limit;
    [limits.default, limits.login, limits.writes]
        .iter()
        .map(|limit| limit.period())
        .max()
        .unwrap_or(Duration::from_secs(60))
}

/// Evicts expired process-local cache entries and idle rate-limit windows.
fn spawn_purge_task(
    cache: CacheBackend,
    windows: Option<Arc<LocalWindowStore>>,
    max_period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let entries = cache.purge_expired();
            let windows = windows.as_ref().map_or(0, |w| w.purge_idle(max_period));
            if entries > 0 || windows > 0 {
                tracing::debug!(entries, windows, "purged expired local state");
            }
        }
    })
}

impl CrmgateServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// The routed application, for serving on a listener of the caller's
    /// choosing.
    pub fn app(&self) -> Router {
        self.app.clone()
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(
            listener,
            self.app
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        let deadline = self.state.config.events.publish_timeout();
        if !self.state.emitter.drain(deadline).await {
            tracing::warn!(
                in_flight = self.state.emitter.in_flight(),
                "shutting down with events still in flight"
            );
        }
        for task in &self.background {
            task.abort();
        }
        if let Some(pg) = &self.postgres {
            pg.close().await;
        }
        tracing::info!("server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}

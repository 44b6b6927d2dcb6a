use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};

use alog_auth::AuthState;
use alog_auth::federation::{HttpIdentityProvider, IdentityProvider};
use alog_auth::handlers as auth_handlers;
use alog_auth::maintenance::ExpiredRecordSweeper;
use alog_core::DynUserStorage;
use alog_feed::{FeedRegenerator, RenderPool};
use axum::{Router, extract::FromRef, routing::get};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::handlers;
use crate::logs::LogService;
use crate::storage::StorageHandles;

/// Shared state for every route.
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthState,
    pub users: DynUserStorage,
    pub logs: LogService,
    pub regenerator: FeedRegenerator,
}

impl FromRef<AppState> for AuthState {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

impl AppState {
    /// Wires services over already-opened storage.
    pub fn new(
        cfg: &AppConfig,
        storage: &StorageHandles,
        provider: Arc<dyn IdentityProvider>,
    ) -> anyhow::Result<Self> {
        let auth = AuthState::from_config(&cfg.auth, storage.auth(), provider)?;
        let regenerator = FeedRegenerator::from_config(&cfg.feed, storage.logs.clone())?;
        let render = RenderPool::new(storage.logs.clone(), &cfg.render);
        Ok(Self {
            auth,
            users: storage.users.clone(),
            logs: LogService::new(storage.logs.clone(), render, regenerator.clone()),
            regenerator,
        })
    }
}

pub fn build_app(state: AppState, body_limit: usize) -> Router {
    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/feed", get(handlers::feed))
        .route("/sitemaps/{file}", get(handlers::sitemap))
        .route("/logs", get(handlers::list_logs).post(handlers::create_log))
        .route("/logs/search", get(handlers::search_logs))
        .route(
            "/logs/{id}",
            get(handlers::get_log)
                .patch(handlers::update_log)
                .delete(handlers::delete_log),
        )
        .route("/users/me", get(handlers::me))
        .merge(auth_handlers::routes::<AppState>())
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = Empty,
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: Duration, span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
}

pub struct AlogServer {
    addr: SocketAddr,
    app: Router,
    state: AppState,
    storage: StorageHandles,
    sweeper: ExpiredRecordSweeper,
    cleanup_interval: Duration,
    shutdown_timeout: Duration,
}

pub struct ServerBuilder {
    config: AppConfig,
    storage: Option<StorageHandles>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
            storage: None,
        }
    }

    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses the given storage instead of opening `storage.backend`.
    pub fn with_storage(mut self, storage: StorageHandles) -> Self {
        self.storage = Some(storage);
        self
    }

    pub async fn build(self) -> anyhow::Result<AlogServer> {
        let cfg = self.config;
        let storage = match self.storage {
            Some(storage) => storage,
            None => StorageHandles::connect(&cfg.storage).await?,
        };
        let provider = Arc::new(HttpIdentityProvider::new(&cfg.auth.provider)?);
        let state = AppState::new(&cfg, &storage, provider)?;

        Ok(AlogServer {
            addr: cfg.addr(),
            app: build_app(state.clone(), cfg.server.body_limit_bytes),
            sweeper: ExpiredRecordSweeper::new(&storage.auth()),
            cleanup_interval: cfg.auth.cleanup_interval,
            shutdown_timeout: cfg.feed.shutdown_timeout,
            state,
            storage,
        })
    }
}

impl AlogServer {
    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve(listener, shutdown_signal()).await
    }

    /// Serves on `listener` until `shutdown` resolves, then stops background
    /// work.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::info!(addr = %listener.local_addr()?, "listening");

        let sweeper = self.sweeper.spawn(self.cleanup_interval);
        // Build the RSS document and sitemap index before the first mutation.
        self.state.regenerator.trigger(None);

        let served = axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown)
            .await;

        sweeper.abort();
        self.state.regenerator.shutdown(self.shutdown_timeout).await;
        self.storage.close().await;
        served?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}

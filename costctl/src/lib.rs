//! # costctl: cost tracking reports for LLM agents
//!
//! `costctl` reads billing transactions recorded for agent traffic and serves aggregated spend
//! reports to administrators: an overall summary, totals per agent, totals per day/week/month,
//! and the agent by period cross product.
//!
//! ## Architecture
//!
//! The HTTP layer is [Axum](https://github.com/tokio-rs/axum). Requests to
//! `/admin/api/v1/cost-tracking/*` are authenticated ([`auth`]), validated
//! ([`api::models::cost_tracking`]) and answered by the [`cost_tracking::CostAggregator`], which
//! reads from a [`db::handlers::CostStore`]. PostgreSQL is the production store; an in-memory
//! store seeded from a JSON fixture is available for local runs and tests.
//!
//! Transactions carry an agent id that is either *persisted* (an id in the `agents` table,
//! recognised by a configurable prefix) or *ephemeral* (minted per session from the endpoint and
//! model). The per-agent report resolves both kinds to display names on a best-effort basis; see
//! [`cost_tracking::resolution`].
//!
//! ## Running
//!
//! ```bash
//! costctl -f config.yaml             # serve
//! costctl -f config.yaml --validate  # check configuration and exit
//! ```
//!
//! See [`config`] for the configuration file format and environment overrides.

pub mod api;
pub mod auth;
pub mod config;
pub mod cost_tracking;
pub mod db;
pub mod errors;
pub mod metrics;
mod openapi;
pub mod telemetry;
#[cfg(test)]
mod test_utils;
pub mod types;

use std::sync::Arc;

use anyhow::Context as _;
use axum::{Router, http, http::HeaderValue, routing::get};
use bon::Builder;
use sqlx::{PgPool, postgres::PgPoolOptions};
use tokio::net::TcpListener;
use tower_http::{
    cors::CorsLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

pub use config::Config;

use crate::{
    config::{CorsOrigin, DatabaseConfig, PoolSettings},
    cost_tracking::CostAggregator,
    db::handlers::{CostStore, InMemoryCostStore, PgCostStore},
    openapi::AdminApiDoc,
};

/// Shared state handed to every handler.
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config.clone())
///     .costs(CostAggregator::new(store, config.cost_tracking.clone()))
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub costs: CostAggregator,
}

/// Get the costctl database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

fn pool_options(settings: &PoolSettings) -> PgPoolOptions {
    let mut options = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(std::time::Duration::from_secs(settings.acquire_timeout_secs));
    // 0 means never
    if settings.idle_timeout_secs > 0 {
        options = options.idle_timeout(std::time::Duration::from_secs(settings.idle_timeout_secs));
    }
    if settings.max_lifetime_secs > 0 {
        options = options.max_lifetime(std::time::Duration::from_secs(settings.max_lifetime_secs));
    }
    options
}

/// Connect the configured store. Returns the pool too when the store is PostgreSQL, so it can be
/// closed on shutdown.
async fn setup_store(config: &Config) -> anyhow::Result<(Arc<dyn CostStore>, Option<PgPool>)> {
    match &config.database {
        DatabaseConfig::Postgres {
            url,
            pool,
            run_migrations,
        } => {
            info!(max_connections = pool.max_connections, "Connecting to PostgreSQL cost store");
            let pg = pool_options(pool).connect(url).await.context("connecting to cost database")?;
            if *run_migrations {
                migrator().run(&pg).await.context("running cost database migrations")?;
            }
            Ok((Arc::new(PgCostStore::new(pg.clone())), Some(pg)))
        }
        DatabaseConfig::Memory { fixtures } => {
            let store = match fixtures {
                Some(path) => InMemoryCostStore::from_fixture_file(path).await?,
                None => {
                    info!("Starting with an empty in-memory cost store");
                    InMemoryCostStore::new()
                }
            };
            Ok((Arc::new(store), None))
        }
    }
}

fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let mut origins = Vec::new();
    for origin in &config.auth.security.cors.allowed_origins {
        let header_value = match origin {
            CorsOrigin::Wildcard => "*".parse::<HeaderValue>()?,
            // Url::as_str always carries a trailing slash; browsers send origins without one
            CorsOrigin::Url(url) => url.origin().ascii_serialization().parse::<HeaderValue>()?,
        };
        origins.push(header_value);
    }

    let mut cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([http::Method::GET, http::Method::OPTIONS])
        .allow_headers([http::header::AUTHORIZATION, http::header::CONTENT_TYPE])
        .allow_credentials(config.auth.security.cors.allow_credentials);

    if let Some(max_age) = config.auth.security.cors.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the application router: health check, admin API, API docs, then CORS, timeout,
/// optional metrics and request tracing layers.
#[instrument(skip_all)]
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let api_routes = Router::new()
        .route("/cost-tracking/summary", get(api::handlers::cost_tracking::get_cost_summary))
        .route("/cost-tracking/by-agent", get(api::handlers::cost_tracking::get_cost_by_agent))
        .route("/cost-tracking/by-period", get(api::handlers::cost_tracking::get_cost_by_period))
        .route(
            "/cost-tracking/by-agent-and-period",
            get(api::handlers::cost_tracking::get_cost_by_agent_and_period),
        )
        .with_state(state.clone());

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .nest("/admin/api/v1", api_routes)
        .merge(Scalar::with_url("/admin/docs", AdminApiDoc::openapi()));

    let cors_layer = create_cors_layer(&state.config)?;
    let mut router = router
        .layer(TimeoutLayer::with_status_code(
            http::StatusCode::REQUEST_TIMEOUT,
            state.config.request_timeout,
        ))
        .layer(cors_layer);

    if state.config.enable_metrics {
        let (prometheus_layer, metric_handle) = metrics::http_metrics();

        // HTTP metrics from axum-prometheus, followed by the report metrics
        router = router
            .route(
                "/internal/metrics",
                get(|| async move {
                    let mut rendered = metric_handle.render();
                    rendered.push_str(&metrics::render());
                    rendered
                }),
            )
            .layer(prometheus_layer);
    }

    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// Owns the router and the store connection for the lifetime of the process.
///
/// 1. [`Application::new`] connects the store (running migrations for PostgreSQL) and builds the
///    router
/// 2. [`Application::serve`] binds the configured address and serves until the shutdown future
///    resolves, then closes the pool and flushes telemetry
pub struct Application {
    router: Router,
    config: Config,
    pool: Option<PgPool>,
}

impl Application {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting costctl with configuration: {:#?}", config);

        let (store, pool) = setup_store(&config).await?;
        let mut app = Self::with_store(config, store)?;
        app.pool = pool;
        Ok(app)
    }

    /// Build the application around an existing store
    pub fn with_store(config: Config, store: Arc<dyn CostStore>) -> anyhow::Result<Self> {
        let costs = CostAggregator::new(store, config.cost_tracking.clone());
        let state = AppState::builder().config(config.clone()).costs(costs).build();
        let router = build_router(state)?;

        Ok(Self {
            router,
            config,
            pool: None,
        })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router.into_make_service()).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "costctl listening on http://{}, API docs at http://localhost:{}/admin/docs",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        if let Some(pool) = self.pool {
            info!("Closing database connections...");
            pool.close().await;
        }

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}

mod config;
mod error;
mod handlers;
mod middleware;
mod models;
mod repos;
mod services;
mod state;
mod stores;
#[cfg(test)]
mod test_utils;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{Router, http};
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    config::Config,
    repos::{
        PgAuditLogRepo, PgSessionRepo, PgSiteConfigRepo, PgUserRepo, PgVerificationTokenRepo,
        Repos,
    },
    services::{HttpDiscordNotifier, MailerImpl, TokenLifecycle},
    state::AppState,
    stores::Stores,
};

/// How often the cache sweep evicts entries that were written but never
/// read again.
const CACHE_SWEEP_INTERVAL_SECS: u64 = 60;

#[derive(Parser)]
#[command(name = "api")]
#[command(about = "Hearth API server")]
struct Args {
    /// Run database migrations and exit
    #[arg(long)]
    migrate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Install rustls crypto provider before any TLS operations
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let args = Args::parse();
    let config = envy::prefixed("HEARTH_").from_env::<Config>()?;

    // Initialize Sentry for error tracking (must be done early, guard must stay alive)
    let _sentry_guard = config.sentry_dsn.as_ref().map(|dsn| {
        sentry::init((
            dsn.as_str(),
            sentry::ClientOptions {
                release: sentry::release_name!(),
                environment: Some(config.env.clone().into()),
                ..Default::default()
            },
        ))
    });

    // Set up tracing: JSON in production, human-readable otherwise
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.is_production() {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer())
            .init();
    }

    let database = PgPoolOptions::new()
        .max_connections(25)
        .connect(&config.database_url)
        .await?;

    // Run migrations via init container only (--migrate flag)
    if args.migrate {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&database).await?;
        tracing::info!("Migrations complete");
        return Ok(());
    }

    // Build repositories
    let token_repo = Arc::new(PgVerificationTokenRepo::new(database.clone()));
    let repos = Repos {
        users: Arc::new(PgUserRepo::new(database.clone())),
        sessions: Arc::new(PgSessionRepo::new(database.clone())),
        audit: Arc::new(PgAuditLogRepo::new(database.clone())),
        site_config: Arc::new(PgSiteConfigRepo::new(database)),
    };

    // In-process stores, one instance per process
    let stores = Stores::new();

    let mailer = MailerImpl::new(config.resend_api_key.clone(), config.smtp_url.clone())?;

    let state = AppState {
        config: config.clone(),
        repos,
        stores: stores.clone(),
        tokens: TokenLifecycle::new(token_repo),
        mailer: Arc::new(mailer),
        discord: Arc::new(HttpDiscordNotifier::new()),
    };

    // Periodic sweep bounds cache memory for write-heavy, read-never keys
    let sweep_cache = stores.cache.clone();
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(Duration::from_secs(CACHE_SWEEP_INTERVAL_SECS));
        loop {
            interval.tick().await;
            let removed = sweep_cache.cleanup();
            if removed > 0 {
                tracing::debug!(removed, "cache sweep evicted expired entries");
            }
        }
    });

    // Request ID header name
    let x_request_id = http::HeaderName::from_static("x-request-id");

    let auth_routes = handlers::auth::router(state.clone())
        .merge(handlers::password::router(state.clone()))
        .merge(handlers::verification::router(state.clone()));

    let app = Router::new()
        .nest("/health", handlers::health::router())
        .nest("/auth", auth_routes)
        .nest("/admin", handlers::admin::router(state.clone()))
        .nest("/discord", handlers::discord::router())
        .nest("/security", handlers::security::router())
        .with_state(state)
        // Request ID: generate UUID, include in logs, return in response
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &http::Request<axum::body::Body>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            },
        ))
        .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
        .layer(RequestBodyLimitLayer::new(1024 * 1024)); // 1MB limit

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = TcpListener::bind(addr).await?;

    tracing::info!("Listening on {}", addr);

    // Connect info feeds the rate limiter's peer-address fallback
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}

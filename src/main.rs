// Main application entrypoint. Sets up configuration, logging, DI wiring and starts the Axum server.

use std::{net::SocketAddr, sync::Arc};

use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::EnvFilter;

use bcard_api::auth::{AuthService, JwtAuthService};
use bcard_api::config::AppConfig;
use bcard_api::handlers::{app, AppState};
use bcard_api::mailer::{LogMailer, Mailer};
use bcard_api::repository::RepositoryFactory;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,axum=info,tower_http=info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).compact().init();

    let cfg = match AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Try to connect to Postgres; fall back to in-memory if unavailable.
    let pool = match PgPoolOptions::new()
        .max_connections(cfg.database.max_connections)
        .connect(&cfg.database.url)
        .await
    {
        Ok(p) => {
            if let Err(e) = sqlx::migrate!("./migrations").run(&p).await {
                tracing::error!(error = %e, "migrations failed; continuing without database");
                None
            } else {
                Some(p)
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "Postgres not available; starting with in-memory repositories");
            None
        }
    };

    let (users, cards) = match pool {
        Some(p) => RepositoryFactory::postgres(p),
        None => RepositoryFactory::in_memory(),
    };

    let auth = Arc::new(JwtAuthService::new(&cfg.jwt.secret, cfg.jwt.expiry_hours)) as Arc<dyn AuthService>;
    let mailer = Arc::new(LogMailer) as Arc<dyn Mailer>;

    if cfg.seed.enabled {
        tracing::warn!("card reseed endpoint enabled; this drops the collection and must stay out of production");
    }

    let state = AppState { users, cards, auth, mailer, seed: cfg.seed.clone() };

    let router: Router = app(state)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer());

    let addr: SocketAddr = format!("{}:{}", cfg.server.host, cfg.server.port).parse()?;
    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin([
            "http://localhost:3000".parse().unwrap(),
            "http://127.0.0.1:3000".parse().unwrap(),
        ])
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("failed to install signal handler");
        term.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! { _ = ctrl_c => {}, _ = terminate => {}, }
}

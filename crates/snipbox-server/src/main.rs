mod cleanup;
mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{
    HeaderName, Method,
    header::{AUTHORIZATION, CONTENT_TYPE},
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use snipbox_api::mail::LogMailer;
use snipbox_api::middleware::VIEWER_KEY_HEADER;
use snipbox_api::{ApiConfig, AppStateInner};
use snipbox_db::Database;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "snipbox=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    let db = Database::open(&config.db_path)?;
    let state = AppStateInner::new(
        db,
        ApiConfig {
            jwt_secret: config.jwt_secret,
            public_url: config.public_url,
            session_ttl: chrono::Duration::days(config.session_days),
            storage_dir: config.storage_dir,
            oauth: config.oauth,
        },
        Arc::new(LogMailer),
    )
    .await?;

    info!(
        "OAuth providers: github={}, google={}",
        state.oauth.github.is_some(),
        state.oauth.google.is_some()
    );

    // Background cleanup task (runs every hour)
    tokio::spawn(cleanup::run_cleanup_loop(state.clone(), 3600));

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, HeaderName::from_static(VIEWER_KEY_HEADER)])
        .allow_credentials(false);

    let app = snipbox_api::router(state.clone())
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("snipbox listening on {} (public URL {})", addr, state.public_url);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}

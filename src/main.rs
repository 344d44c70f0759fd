// src/main.rs
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum_server::Handle;
use tracing::info;
use tracing_subscriber::EnvFilter;

use poll_tally::config::Config;
use poll_tally::db::{create_pool, PgStore};
use poll_tally::handlers::AppState;
use poll_tally::routes;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let pool = create_pool(&config)
        .await
        .context("failed to connect to the database")?;
    let store = PgStore::new(pool, config.vote_write_timeout);
    let app = routes::create_routes(AppState::new(Arc::new(store)));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let handle = Handle::new();
    tokio::spawn(shutdown_signal(handle.clone()));

    info!(%addr, "server listening");
    axum_server::bind(addr)
        .handle(handle)
        .serve(app.into_make_service())
        .await
        .context("server error")?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal(handle: Handle) {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("received Ctrl+C, shutting down");
        handle.graceful_shutdown(Some(Duration::from_secs(10)));
    }
}

mod config;
mod db;
mod error;
mod handlers;
mod models;
mod pricing;
mod services;
mod state;
mod ws;

#[cfg(test)]
mod test;

use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{config::Config, db::bootstrap_admin, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("freight_desk_server=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::init().context("Failed to load configuration")?;
    let pool = db::init_db_pool(&config.database_url, config.max_db_connections)
        .await
        .context("Failed to open database")?;
    tracing::info!("Database ready at {}", config.database_url);

    let state = AppState::new(config, pool);

    if let Some(password) = bootstrap_admin(
        &state.users,
        &state.config.admin_email,
        state.config.admin_password.as_deref(),
    )
    .await?
    {
        tracing::warn!(
            "Generated password for {}: {} (change it after the first login)",
            state.config.admin_email,
            password
        );
    }

    let scan_every = Duration::from_secs(state.config.notification_scan_minutes.max(1) * 60);
    state.notifier.clone().spawn(scan_every);

    let addr = state.config.server_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, handlers::router(state)).await?;
    Ok(())
}

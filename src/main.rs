mod accounts;
mod app;
mod auth;
mod billing;
mod config;
mod contacts;
mod db;
mod email;
mod error;
mod state;
mod sweeper;

use tokio::sync::watch;

use crate::{state::AppState, sweeper::Sweeper};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "contacthub=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let app_state = AppState::init().await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = Sweeper::from_config(app_state.store.clone(), &app_state.config);
    let sweeper_task = tokio::spawn(sweeper.run(shutdown_rx));

    let served = app::serve(app::build_app(app_state)).await;

    let _ = shutdown_tx.send(true);
    if let Err(e) = sweeper_task.await {
        tracing::error!(error = %e, "sweeper task panicked");
    }

    served
}

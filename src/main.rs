mod api;
mod config;
mod models;
mod providers;
mod services;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use api::AppState;
use config::{Config, APP_NAME};
use providers::ProviderRouter;
use services::{ChatGateway, Database, LlmThrottle};

const DEFAULT_LOG_FILTER: &str = "coachdesk=info,tower_http=info";

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let config = Config::from_env()?;
    tracing::info!(?config, "starting {}", APP_NAME);

    let db = Database::open(&config.database_path).await?;

    if config.llm.api_key.is_empty() && config.llm.provider == models::ProviderId::Claude {
        tracing::warn!("COACHDESK_API_KEY is not set; Claude requests will fail");
    }

    let throttle = Arc::new(LlmThrottle::new(config.llm.min_interval));
    let gateway = ChatGateway::new(&ProviderRouter::with_builtin(), throttle, config.llm.clone())
        .context("Failed to set up the LLM gateway")?;
    let state = Arc::new(AppState { db, gateway });
    let app = api::build_router(state, &config.cors_origins);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    tracing::info!("{} listening on {}", APP_NAME, config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server failed")?;

    tracing::info!("{} stopped", APP_NAME);
    Ok(())
}

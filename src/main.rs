use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chatledger::config::{Config, ConfigArgs};
use chatledger::AppState;

#[derive(Parser, Debug)]
#[command(name = "chatledger")]
#[command(author, version, about = "A small authenticated conversation message store", long_about = None)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::from_args(cli.config).context("Invalid configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting chatledger v{}", env!("CARGO_PKG_VERSION"));

    std::fs::create_dir_all(&config.server.data_dir).with_context(|| {
        format!(
            "Failed to create data directory: {}",
            config.server.data_dir.display()
        )
    })?;

    let db = chatledger::db::init(&config.database).await?;

    chatledger::api::auth::ensure_admin_user(&db, &config.auth).await?;

    let api_addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState::new(config, db));
    let app = chatledger::api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("Failed to bind {}", api_addr))?;

    tracing::info!("API server listening on http://{}", api_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
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

    tracing::info!("Shutdown signal received");
}

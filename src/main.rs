mod auth;
mod config;
mod db;
mod error;
mod mailer;
mod models;
mod routes;
mod state;
mod statement;
mod uploads;

use anyhow::Result;
use clap::Parser;
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Kayzonale Prints and Designs backend API
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Port to listen on, overrides PORT
    #[arg(long)]
    port: Option<u16>,

    /// Interface to bind, overrides HOST
    #[arg(long)]
    host: Option<String>,

    /// Apply pending database migrations before serving
    #[arg(long)]
    migrate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let mut config = config::init()?;
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(host) = cli.host {
        config.host = host;
    }

    // Initialize database connection
    info!("Connecting to database...");
    let db = db::init(&config, cli.migrate).await?;

    tokio::fs::create_dir_all(&config.upload_dir).await?;

    let address = config.bind_address();
    let state = state::AppState::new(config, db)?;
    let app = routes::app(state)?;

    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
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
}

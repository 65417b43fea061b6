//! Query Console web server
//!
//! Run with: cargo run -p qconsole-web

use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use qconsole_common::ConsoleConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting Query Console...");

    let config = ConsoleConfig::load()?;
    info!(upstream = %config.upstream.base_url, "Agent backend");

    // Create app state and open the upstream stream
    let state = qconsole_web::state::AppState::new(&config)?;
    state.console.mount();

    // Build router
    let app = qconsole_web::router::build_router(state.clone());

    // Bind to configured address
    let addr: SocketAddr = config.server.bind.parse()?;
    info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown({
            let state = state.clone();
            async move {
                shutdown_signal().await;
                state.shutdown();
            }
        })
        .await?;

    info!("Query Console stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

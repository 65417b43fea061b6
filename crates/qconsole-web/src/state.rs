//! Shared application state for the web server.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use qconsole_common::{ConsoleConfig, Result};

use crate::console::QueryConsole;

/// Shared state injected into every Axum handler.
#[derive(Clone)]
pub struct AppState {
    pub console: QueryConsole,
    /// Flips to `true` once the server is shutting down
    shutdown: Arc<watch::Sender<bool>>,
}

impl AppState {
    pub fn new(config: &ConsoleConfig) -> Result<Self> {
        let (shutdown, _) = watch::channel(false);
        Ok(Self { console: QueryConsole::new(config)?, shutdown: Arc::new(shutdown) })
    }

    /// Close the upstream stream and end every open page feed.
    ///
    /// Long-lived `/api/events` responses never finish on their own, so this
    /// must run before graceful shutdown can complete.
    pub fn shutdown(&self) {
        self.console.unmount();
        self.shutdown.send_replace(true);
        info!("Closing event feeds");
    }

    /// Resolves once `shutdown` has been called.
    pub fn shutdown_requested(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut rx = self.shutdown.subscribe();
        async move {
            // the sender lives as long as any state handle; an error means it is gone
            let _ = rx.wait_for(|closing| *closing).await;
        }
    }
}

pub type SharedState = Arc<AppState>;

use crate::{create_router, AppState};
use aidev_core::{AidevError, ConfigManager, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

pub struct Server {
    state: AppState,
    addr: SocketAddr,
}

impl Server {
    pub fn new(config: Arc<ConfigManager>) -> Result<Self> {
        let server = &config.config().server;
        let addr: SocketAddr = format!("{}:{}", server.host, server.port)
            .parse()
            .map_err(|e| AidevError::InvalidOperation(format!("invalid listen address: {e}")))?;

        let state = AppState::new(config)?;
        Ok(Self { state, addr })
    }

    /// Override the listen address from the configuration.
    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub async fn run(self) -> Result<()> {
        if self.state.config.server.warm_models_cache {
            // Fire and forget: the first /api/models call fetches on its own
            // if this has not finished.
            self.state.spawn_models_warmup();
        }

        let router = create_router(self.state.clone());

        let listener = {
            let socket = if self.addr.is_ipv6() {
                tokio::net::TcpSocket::new_v6()
            } else {
                tokio::net::TcpSocket::new_v4()
            }?;

            let _ = socket.set_reuseaddr(true);
            let _ = socket.set_keepalive(true);

            socket.bind(self.addr)?;
            socket.listen(1024)?
        };

        info!("Server listening on http://{}", self.addr);
        info!("  POST /api/intent - Generate code from an intent");
        info!("  GET  /api/models - List models (server key, cached)");
        info!("  POST /api/models - List models with a client key");
        info!("  POST /api/models/select - Select the active model");
        info!("  GET  /health - Health check");
        if let Some(dir) = &self.state.config.server.static_dir {
            info!("Serving static files from {}", dir.display());
        }
        if self.state.provider.is_none() {
            warn!("OPENROUTER_API_KEY is not set; clients must send api_key");
        }

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully");
        },
    }
}

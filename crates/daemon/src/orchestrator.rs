//! Daemon orchestrator for wiring together all components.
//!
//! This module provides the `DaemonOrchestrator` that opens the vault, builds
//! the authenticated router, and owns the HTTP server lifecycle.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{info, warn};

use crate::auth::BasicAuth;
use crate::config::Config;
use crate::files::{FileVault, PathResolver};
use crate::router::Router;
use crate::server::HttpServer;

/// Daemon orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    /// Initial state, not started.
    Stopped,
    /// Starting up, binding the listener.
    Starting,
    /// Running and accepting connections.
    Running,
    /// Shutting down gracefully.
    ShuttingDown,
}

/// Events emitted by the orchestrator.
#[derive(Debug, Clone)]
pub enum OrchestratorEvent {
    /// Orchestrator state changed.
    StateChanged(OrchestratorState),
    /// The server is listening.
    Listening { addr: SocketAddr },
    /// Error occurred.
    Error { message: String },
}

/// Daemon orchestrator that manages all subsystems.
pub struct DaemonOrchestrator {
    /// Configuration.
    config: Config,
    /// Current state.
    state: Arc<RwLock<OrchestratorState>>,
    /// The opened vault.
    vault: Arc<FileVault>,
    /// Request router.
    router: Arc<Router>,
    /// Running HTTP server, if started.
    server: Mutex<Option<HttpServer>>,
    /// Event sender.
    event_tx: broadcast::Sender<OrchestratorEvent>,
}

impl DaemonOrchestrator {
    /// Creates a new daemon orchestrator.
    ///
    /// Validates the configuration and opens the vault, creating its root
    /// directory if needed. Nothing is bound until [`start`](Self::start).
    pub fn new(config: Config) -> Result<Self> {
        config.validate().context("Invalid configuration")?;

        let vault = Arc::new(FileVault::new(&config.vault).with_context(|| {
            format!("Failed to open vault root: {}", config.vault.root.display())
        })?);

        let mut router = Router::new(Arc::clone(&vault), BasicAuth::from_config(&config.auth));
        match PathResolver::new(&config.server.static_dir) {
            Ok(static_files) => {
                info!(dir = ?static_files.root(), "Serving static UI");
                router = router.with_static_files(static_files);
            }
            Err(e) => {
                warn!(
                    dir = %config.server.static_dir.display(),
                    error = %e,
                    "Static UI directory unavailable, serving API only"
                );
            }
        }

        let (event_tx, _) = broadcast::channel(64);

        Ok(Self {
            config,
            state: Arc::new(RwLock::new(OrchestratorState::Stopped)),
            vault,
            router: Arc::new(router),
            server: Mutex::new(None),
            event_tx,
        })
    }

    /// Returns the current state.
    pub async fn state(&self) -> OrchestratorState {
        *self.state.read().await
    }

    /// Returns a receiver for orchestrator events.
    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.event_tx.subscribe()
    }

    /// Starts the daemon orchestrator.
    pub async fn start(&self) -> Result<()> {
        // Check current state
        {
            let mut state = self.state.write().await;
            if *state != OrchestratorState::Stopped {
                anyhow::bail!("Orchestrator is already running");
            }
            *state = OrchestratorState::Starting;
        }
        self.emit_event(OrchestratorEvent::StateChanged(OrchestratorState::Starting));

        info!("Starting daemon orchestrator...");

        let server = match HttpServer::start(
            Arc::clone(&self.router),
            &self.config.server.bind_address,
            self.config.server.port,
        )
        .await
        {
            Ok(server) => server,
            Err(e) => {
                *self.state.write().await = OrchestratorState::Stopped;
                self.emit_event(OrchestratorEvent::Error {
                    message: e.to_string(),
                });
                self.emit_event(OrchestratorEvent::StateChanged(OrchestratorState::Stopped));
                return Err(e).with_context(|| {
                    format!(
                        "Failed to bind {}:{}",
                        self.config.server.bind_address, self.config.server.port
                    )
                });
            }
        };

        let addr = server.addr();
        let url = server.url();
        *self.server.lock().await = Some(server);
        self.emit_event(OrchestratorEvent::Listening { addr });

        *self.state.write().await = OrchestratorState::Running;
        self.emit_event(OrchestratorEvent::StateChanged(OrchestratorState::Running));

        info!(url = %url, root = ?self.vault.root(), "FileVault is running");
        Ok(())
    }

    /// Stops the daemon orchestrator gracefully.
    pub async fn stop(&self) -> Result<()> {
        // Check current state
        {
            let mut state = self.state.write().await;
            if *state == OrchestratorState::Stopped {
                return Ok(());
            }
            if *state == OrchestratorState::ShuttingDown {
                anyhow::bail!("Orchestrator is already shutting down");
            }
            *state = OrchestratorState::ShuttingDown;
        }
        self.emit_event(OrchestratorEvent::StateChanged(
            OrchestratorState::ShuttingDown,
        ));

        info!("Stopping daemon orchestrator...");

        if let Some(server) = self.server.lock().await.take() {
            server.stop().await;
        }

        *self.state.write().await = OrchestratorState::Stopped;
        self.emit_event(OrchestratorEvent::StateChanged(OrchestratorState::Stopped));

        info!("Daemon orchestrator stopped");
        Ok(())
    }

    /// Emits an orchestrator event.
    fn emit_event(&self, event: OrchestratorEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Returns the bound address while running.
    pub async fn addr(&self) -> Option<SocketAddr> {
        self.server.lock().await.as_ref().map(HttpServer::addr)
    }

}

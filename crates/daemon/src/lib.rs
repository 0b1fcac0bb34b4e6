//! # FileVault Daemon Library
//!
//! This crate provides the daemon (server) functionality for FileVault, a
//! small authenticated web service exposing one directory tree to browsers.
//!
//! ## Overview
//!
//! The daemon serves a single configured root directory. It provides:
//!
//! - **Browsing**: Paginated directory listings
//! - **Search**: Recursive name and size search across the tree
//! - **Transfer**: Streaming downloads and atomic, collision-safe uploads
//! - **Access Control**: HTTP Basic authentication and strict root confinement
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Daemon Orchestrator                         │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │              HTTP Server (hyper, HTTP/1 + HTTP/2)          │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! │                                                                  │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │          Router  ──  Basic Auth  ──  Static UI             │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! │                                                                  │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────────────┐  │
//! │  │  Directory   │  │     File     │  │        File          │  │
//! │  │   Browser    │  │    Search    │  │      Transfer        │  │
//! │  └──────────────┘  └──────────────┘  └──────────────────────┘  │
//! │                                                                  │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │                     Path Resolver                          │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use daemon::config::{default_config_path, Config};
//! use daemon::DaemonOrchestrator;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Load configuration and apply FILEVAULT_* overrides
//!     let mut config = Config::load(default_config_path())?;
//!     config.apply_env_overrides();
//!
//!     // Create and start the orchestrator
//!     let orchestrator = DaemonOrchestrator::new(config)?;
//!     orchestrator.start().await?;
//!
//!     // The daemon is now serving requests
//!     tokio::signal::ctrl_c().await?;
//!
//!     orchestrator.stop().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading, defaults and validation
//! - [`auth`]: HTTP Basic authentication
//! - [`files`]: Confined browsing, search and transfer
//! - [`router`]: HTTP routing to vault operations
//! - [`server`]: HTTP listener lifecycle
//! - [`orchestrator`]: Main daemon coordinator

pub mod auth;
pub mod config;
pub mod files;
pub mod orchestrator;
pub mod router;
pub mod server;

// Re-export protocol for convenience
pub use protocol;

// Re-export config types for convenience
pub use config::Config;

// Re-export auth types for convenience
pub use auth::{AuthError, BasicAuth};

// Re-export files types for convenience
pub use files::{
    AllowList, DirectoryBrowser, FileSearch, FileTransfer, FileVault, Pagination, PathResolver,
    SearchQuery, VaultError, VaultResult,
};

// Re-export router types for convenience
pub use router::{Route, Router, RouterError};

// Re-export server types for convenience
pub use server::HttpServer;

// Re-export orchestrator types for convenience
pub use orchestrator::{DaemonOrchestrator, OrchestratorEvent, OrchestratorState};

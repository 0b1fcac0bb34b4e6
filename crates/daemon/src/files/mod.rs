//! The file vault: confined browsing, search, download and upload.
//!
//! This module provides every filesystem operation the daemon exposes:
//! - Directory listing with pagination
//! - Recursive search by name and size
//! - Download lookup of regular files
//! - Atomic, collision-safe uploads with an extension allow-list
//!
//! # Security
//!
//! Every client path is resolved by [`PathResolver`] before it touches the
//! filesystem. Traversal is rejected lexically, and symlinks are followed
//! and re-checked against the canonical root, so no operation can reach
//! outside the vault.

pub mod browser;
pub mod containment;
pub mod error;
pub mod extensions;
pub mod resolver;
pub mod search;
pub mod transfer;
pub mod vault;

pub use browser::{DirectoryBrowser, Pagination, ResolvedFile};
pub use error::{ErrorKind, VaultError, VaultResult};
pub use extensions::AllowList;
pub use resolver::PathResolver;
pub use search::{FileSearch, SearchQuery};
pub use transfer::{FileTransfer, UploadOutcome, UploadTarget};
pub use vault::FileVault;

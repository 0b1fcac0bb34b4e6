//! # FileVault Protocol Library
//!
//! This crate provides the wire types shared by the FileVault daemon and its
//! clients.
//!
//! ## Overview
//!
//! - **Message Definitions**: JSON bodies for listings, uploads and errors
//! - **Credentials**: HTTP Basic header encoding and digest comparison
//!
//! ## Example Usage
//!
//! ```rust
//! use protocol::messages::{to_json, FileEntry};
//! use protocol::Credentials;
//!
//! let entry = FileEntry::file("notes.txt", "docs/notes.txt", 42);
//! let body = to_json(&vec![entry]).unwrap();
//! assert!(body.starts_with(b"["));
//!
//! let header = Credentials::new("admin", "secret").to_authorization_header();
//! let parsed = Credentials::from_authorization_header(&header).unwrap();
//! assert_eq!(parsed.username, "admin");
//! ```
//!
//! ## Modules
//!
//! - [`messages`]: Wire message definitions
//! - [`credentials`]: Basic-auth credentials
//! - [`error`]: Error types

pub mod credentials;
pub mod error;
pub mod messages;

pub use credentials::{CredentialDigest, Credentials};
pub use error::{ProtocolError, Result};
pub use messages::{
    AllowedTypes, ErrorCode, ErrorMessage, FileEntry, UploadResponse, UploadResult, API_VERSION,
};

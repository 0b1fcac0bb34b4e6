//! Wire message definitions for FileVault.
//!
//! This module defines the JSON bodies exchanged between the daemon and
//! browser clients. Field names follow the camelCase convention expected by
//! the bundled web UI.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Current API version, reported in the `X-FileVault-Api` response header.
pub const API_VERSION: u8 = 1;

// ============================================================================
// File Messages
// ============================================================================

/// A single file or directory entry, relative to the vault root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    /// Entry name (last path component).
    pub name: String,
    /// Root-relative path, always `/`-separated.
    #[serde(rename = "path")]
    pub relative_path: String,
    /// Whether this entry is a directory.
    pub is_directory: bool,
    /// Size in bytes. Absent for directories.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl FileEntry {
    /// Create an entry for a regular file.
    pub fn file(name: impl Into<String>, relative_path: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            relative_path: relative_path.into(),
            is_directory: false,
            size: Some(size),
        }
    }

    /// Create an entry for a directory.
    pub fn directory(name: impl Into<String>, relative_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            relative_path: relative_path.into(),
            is_directory: true,
            size: None,
        }
    }
}

/// Outcome for one file of an upload batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    /// File name as supplied by the client.
    pub file_name: String,
    /// Name the file was stored under, if it was saved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_name: Option<String>,
    /// Why the file was rejected, if it was not saved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorMessage>,
}

impl UploadResult {
    /// Whether this file was stored.
    pub fn is_saved(&self) -> bool {
        self.saved_name.is_some()
    }
}

/// Response to an upload request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    /// Human-readable summary.
    pub message: String,
    /// Per-file outcomes, in request order.
    pub files: Vec<UploadResult>,
}

impl UploadResponse {
    /// Build a response, deriving the summary from the outcomes.
    pub fn from_results(files: Vec<UploadResult>) -> Self {
        let saved = files.iter().filter(|f| f.is_saved()).count();
        let message = if saved == files.len() {
            "Files uploaded successfully.".to_string()
        } else {
            format!("{} of {} files uploaded.", saved, files.len())
        };
        Self { message, files }
    }
}

/// The upload allow-list as reported to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllowedTypes {
    /// Permitted extensions, lowercase, including the dot.
    pub allowed_extensions: Vec<String>,
    /// Whether every extension is accepted.
    pub allow_all: bool,
}

// ============================================================================
// Errors
// ============================================================================

/// Error body returned for every failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    /// Error code for programmatic handling.
    pub code: ErrorCode,
    /// Human-readable error message. Never contains host paths.
    pub message: String,
}

impl ErrorMessage {
    /// Create a new error message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Error codes for common error conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Missing or wrong credentials.
    Unauthorized,
    /// Path resolves outside the vault root.
    AccessDenied,
    /// Resource not found.
    NotFound,
    /// Invalid request or parameters, including rejected uploads.
    InvalidRequest,
    /// Upload exceeds the configured size limit.
    PayloadTooLarge,
    /// HTTP method not supported on this route.
    MethodNotAllowed,
    /// Server-side error.
    InternalError,
}

impl ErrorCode {
    /// HTTP status code this error is reported with.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::AccessDenied => 403,
            Self::NotFound => 404,
            Self::InvalidRequest => 400,
            Self::PayloadTooLarge => 413,
            Self::MethodNotAllowed => 405,
            Self::InternalError => 500,
        }
    }
}

/// Serialize a message to JSON bytes.
pub fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

/// Deserialize a message from JSON bytes.
pub fn from_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(bytes)?)
}

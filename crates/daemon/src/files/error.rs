//! Typed failures for vault operations.
//!
//! Every variant carries root-relative paths only, so error messages can be
//! returned to clients without leaking the host layout.

use protocol::messages::{ErrorCode, ErrorMessage};
use thiserror::Error;

/// Result type for vault operations.
pub type VaultResult<T> = Result<T, VaultError>;

/// Broad failure category, used for status mapping and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The path resolves outside the vault root.
    AccessDenied,
    /// The target does not exist or has the wrong type.
    NotFound,
    /// The request was malformed or the upload was rejected.
    Validation,
    /// Unexpected I/O failure.
    Generic,
}

/// Errors that can occur during vault operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// The requested path escapes the vault root.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// The requested path does not exist.
    #[error("path not found: {0}")]
    NotFound(String),

    /// The requested path exists but is not a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// The requested path exists but is not a regular file.
    #[error("not a file: {0}")]
    NotAFile(String),

    /// The upload's extension is not on the allow-list.
    #[error("file type not allowed: {0}")]
    DisallowedExtension(String),

    /// The upload's file name is unusable.
    #[error("invalid file name: {0}")]
    InvalidFileName(String),

    /// The upload exceeds the size limit.
    #[error("file too large: exceeds limit of {limit} bytes")]
    FileTooLarge { limit: u64 },

    /// A request parameter is out of range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Unexpected I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl VaultError {
    /// The failure category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AccessDenied(_) => ErrorKind::AccessDenied,
            Self::NotFound(_) | Self::NotADirectory(_) | Self::NotAFile(_) => ErrorKind::NotFound,
            Self::DisallowedExtension(_)
            | Self::InvalidFileName(_)
            | Self::FileTooLarge { .. }
            | Self::InvalidParameter(_) => ErrorKind::Validation,
            Self::Io(_) => ErrorKind::Generic,
        }
    }

    /// The wire error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::FileTooLarge { .. } => ErrorCode::PayloadTooLarge,
            _ => match self.kind() {
                ErrorKind::AccessDenied => ErrorCode::AccessDenied,
                ErrorKind::NotFound => ErrorCode::NotFound,
                ErrorKind::Validation => ErrorCode::InvalidRequest,
                ErrorKind::Generic => ErrorCode::InternalError,
            },
        }
    }

    /// Convert to a wire error body.
    ///
    /// I/O failures are reported without detail, since their messages may
    /// name host paths.
    pub fn to_error_message(&self) -> ErrorMessage {
        match self.kind() {
            ErrorKind::Generic => ErrorMessage::new(self.code(), "internal server error"),
            _ => ErrorMessage::new(self.code(), self.to_string()),
        }
    }
}

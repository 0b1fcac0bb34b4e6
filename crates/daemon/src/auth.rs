//! HTTP Basic authentication gate.
//!
//! Every request, static assets included, must carry the single configured
//! credential. The password is kept only as a digest.

use protocol::{CredentialDigest, Credentials, ProtocolError};
use thiserror::Error;

use crate::config::AuthConfig;

/// Realm announced in the `WWW-Authenticate` challenge.
pub const REALM: &str = "FileVault";

/// Reasons a request failed authentication.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No `Authorization` header was sent.
    #[error("missing Authorization header")]
    MissingHeader,

    /// The header could not be decoded.
    #[error("malformed Authorization header: {0}")]
    Malformed(#[from] ProtocolError),

    /// The credentials do not match.
    #[error("invalid credentials")]
    InvalidCredentials,
}

/// Verifies `Authorization` headers against one credential.
#[derive(Debug, Clone)]
pub struct BasicAuth {
    digest: CredentialDigest,
}

impl BasicAuth {
    /// Create a gate for the given username and password.
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            digest: Credentials::new(username, password).digest(),
        }
    }

    /// Create a gate from the `[auth]` config section.
    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(&config.username, &config.password)
    }

    /// Check the raw `Authorization` header value, if any.
    ///
    /// Returns the presented username on success.
    pub fn verify(&self, header: Option<&str>) -> Result<String, AuthError> {
        let header = header.ok_or(AuthError::MissingHeader)?;
        let presented = Credentials::from_authorization_header(header)?;

        if self.digest.matches(&presented) {
            Ok(presented.username)
        } else {
            Err(AuthError::InvalidCredentials)
        }
    }

    /// Value of the `WWW-Authenticate` header sent with a 401.
    pub fn challenge() -> String {
        format!("Basic realm=\"{}\"", REALM)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> BasicAuth {
        BasicAuth::new("admin", "secret")
    }

    #[test]
    fn test_verify_valid() {
        let header = Credentials::new("admin", "secret").to_authorization_header();
        assert_eq!(gate().verify(Some(&header)).unwrap(), "admin");
    }

    #[test]
    fn test_verify_missing() {
        assert!(matches!(gate().verify(None), Err(AuthError::MissingHeader)));
    }

    #[test]
    fn test_verify_wrong_password() {
        let header = Credentials::new("admin", "wrong").to_authorization_header();
        assert!(matches!(
            gate().verify(Some(&header)),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_verify_wrong_username() {
        let header = Credentials::new("root", "secret").to_authorization_header();
        assert!(matches!(
            gate().verify(Some(&header)),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_verify_malformed() {
        for header in ["", "Basic", "Basic %%%", "Bearer token", "Basic YWRtaW4="] {
            assert!(
                matches!(gate().verify(Some(header)), Err(AuthError::Malformed(_))),
                "{header:?}"
            );
        }
    }

    #[test]
    fn test_from_config() {
        let config = AuthConfig {
            username: "alice".to_string(),
            password: "pw".to_string(),
        };
        let header = Credentials::new("alice", "pw").to_authorization_header();
        assert!(BasicAuth::from_config(&config).verify(Some(&header)).is_ok());
    }

    #[test]
    fn test_challenge() {
        assert_eq!(BasicAuth::challenge(), "Basic realm=\"FileVault\"");
    }
}

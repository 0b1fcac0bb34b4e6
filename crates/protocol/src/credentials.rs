//! HTTP Basic credentials and their digest-based comparison.
//!
//! The daemon never keeps the shared secret around in plain form after
//! startup: it stores a [`CredentialDigest`] and compares SHA-256 digests of
//! the presented credentials against it.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};

use crate::error::{ProtocolError, Result};

/// Length of a SHA-256 digest in bytes.
pub const DIGEST_LENGTH: usize = 32;

/// A username/password pair.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// The username.
    pub username: String,
    /// The password.
    pub password: String,
}

impl Credentials {
    /// Create a new credential pair.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Parse an `Authorization` header value of the form `Basic <base64>`.
    ///
    /// The scheme is matched case-insensitively. The password is everything
    /// after the first `:`, so passwords may themselves contain colons.
    pub fn from_authorization_header(value: &str) -> Result<Self> {
        let value = value.trim();
        let (scheme, payload) = value
            .split_once(' ')
            .ok_or_else(|| ProtocolError::MalformedCredentials("missing payload".to_string()))?;

        if !scheme.eq_ignore_ascii_case("basic") {
            return Err(ProtocolError::UnsupportedScheme(scheme.to_string()));
        }

        let decoded = STANDARD.decode(payload.trim())?;
        let decoded = String::from_utf8(decoded)
            .map_err(|_| ProtocolError::MalformedCredentials("not valid UTF-8".to_string()))?;

        let (username, password) = decoded
            .split_once(':')
            .ok_or_else(|| ProtocolError::MalformedCredentials("missing ':'".to_string()))?;

        Ok(Self::new(username, password))
    }

    /// Encode as an `Authorization` header value.
    pub fn to_authorization_header(&self) -> String {
        let raw = format!("{}:{}", self.username, self.password);
        format!("Basic {}", STANDARD.encode(raw))
    }

    /// Compute the digest of these credentials.
    pub fn digest(&self) -> CredentialDigest {
        CredentialDigest {
            username: Sha256::digest(self.username.as_bytes()).into(),
            password: Sha256::digest(self.password.as_bytes()).into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// SHA-256 digests of a username and password.
#[derive(Clone)]
pub struct CredentialDigest {
    username: [u8; DIGEST_LENGTH],
    password: [u8; DIGEST_LENGTH],
}

impl CredentialDigest {
    /// Check presented credentials against this digest.
    ///
    /// Both digests are always compared in full.
    pub fn matches(&self, presented: &Credentials) -> bool {
        let other = presented.digest();
        let user_diff = fold_diff(&self.username, &other.username);
        let pass_diff = fold_diff(&self.password, &other.password);
        (user_diff | pass_diff) == 0
    }
}

impl fmt::Debug for CredentialDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CredentialDigest(<redacted>)")
    }
}

fn fold_diff(a: &[u8; DIGEST_LENGTH], b: &[u8; DIGEST_LENGTH]) -> u8 {
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y))
}

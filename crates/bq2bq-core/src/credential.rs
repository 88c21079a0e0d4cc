//! Service-account credentials
//!
//! A credential is parsed from the raw JSON key handed over by the host.
//! The raw payload is kept verbatim as the credential's fingerprint: two
//! credentials are the same credential only when their payloads are
//! byte-identical, even if they decode to the same key.

use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::fmt;

/// The only key type the plugin accepts
pub const SERVICE_ACCOUNT_TYPE: &str = "service_account";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Fields of a JSON service-account key
#[derive(Deserialize)]
struct RawServiceAccountKey {
    #[serde(rename = "type")]
    key_type: Option<String>,
    project_id: Option<String>,
    private_key_id: Option<String>,
    private_key: Option<String>,
    client_email: Option<String>,
    client_id: Option<String>,
    token_uri: Option<String>,
}

/// A parsed, immutable service-account credential
#[derive(Clone, PartialEq, Eq)]
pub struct ServiceAccountCredential {
    /// Raw JSON payload, byte for byte
    fingerprint: Vec<u8>,

    project_id: String,
    client_email: String,
    client_id: Option<String>,
    private_key_id: Option<String>,
    private_key: String,
    token_uri: String,

    /// Scopes the credential was parsed for
    scopes: Vec<String>,
}

impl ServiceAccountCredential {
    /// Parse a JSON service-account key requesting `scopes`
    pub fn from_json<S: AsRef<str>>(raw: &[u8], scopes: &[S]) -> Result<Self, CredentialError> {
        if raw.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(CredentialError::Empty);
        }

        let key: RawServiceAccountKey = serde_json::from_slice(raw)
            .map_err(|e| CredentialError::InvalidJson(e.to_string()))?;

        match key.key_type.as_deref() {
            Some(SERVICE_ACCOUNT_TYPE) => {}
            Some(other) => return Err(CredentialError::UnsupportedType(other.to_string())),
            None => return Err(CredentialError::MissingField("type")),
        }

        let project_id = required(key.project_id, "project_id")?;
        let client_email = required(key.client_email, "client_email")?;
        let private_key = required(key.private_key, "private_key")?;

        let scopes: Vec<String> = scopes.iter().map(|s| s.as_ref().to_string()).collect();
        if scopes.is_empty() {
            return Err(CredentialError::NoScopes);
        }

        Ok(Self {
            fingerprint: raw.to_vec(),
            project_id,
            client_email,
            client_id: key.client_id,
            private_key_id: key.private_key_id,
            private_key,
            token_uri: key.token_uri.unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
            scopes,
        })
    }

    /// Byte-exact payload used for equality checks
    pub fn fingerprint(&self) -> &[u8] {
        &self.fingerprint
    }

    /// Whether `other` carries the byte-identical payload
    pub fn same_fingerprint(&self, other: &Self) -> bool {
        self.fingerprint == other.fingerprint
    }

    /// Hex SHA-256 of the fingerprint, safe to log
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(&self.fingerprint))
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn client_email(&self) -> &str {
        &self.client_email
    }

    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    pub fn private_key_id(&self) -> Option<&str> {
        self.private_key_id.as_deref()
    }

    pub fn private_key(&self) -> &str {
        &self.private_key
    }

    pub fn token_uri(&self) -> &str {
        &self.token_uri
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }
}

// Keys must never end up in logs.
impl fmt::Debug for ServiceAccountCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountCredential")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("digest", &self.digest())
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

fn required(value: Option<String>, field: &'static str) -> Result<String, CredentialError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(CredentialError::MissingField(field)),
    }
}

/// Errors raised while reading a credential payload
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    #[error("credential payload is empty")]
    Empty,

    #[error("invalid credential JSON: {0}")]
    InvalidJson(String),

    #[error("unsupported credential type '{0}', expected 'service_account'")]
    UnsupportedType(String),

    #[error("credential is missing required field '{0}'")]
    MissingField(&'static str),

    #[error("no access scopes requested")]
    NoScopes,
}

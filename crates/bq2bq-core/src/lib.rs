//! bq2bq Core
//!
//! Configuration and credential model shared by the client factories.

pub mod config;
pub mod credential;

pub use config::{Config, ClientConfig, ConfigError, DEFAULT_MAX_REUSE, DEFAULT_SCOPES};
pub use credential::{ServiceAccountCredential, CredentialError, SERVICE_ACCOUNT_TYPE};

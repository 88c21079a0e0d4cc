//! Factory error taxonomy
//!
//! Every variant names the stage that failed and keeps the stage error as its
//! source. Nothing here is fatal to the process; retrying is up to the caller.

use crate::builder::ClientError;
use crate::extractor::ExtractorError;
use bq2bq_core::CredentialError;

#[derive(Debug, thiserror::Error)]
pub enum FactoryError {
    /// The credential payload could not be parsed
    #[error("failed to read secret: {0}")]
    Credential(#[source] CredentialError),

    /// Building the warehouse client failed
    #[error("failed to create client: {0}")]
    ClientConstruction(#[source] ClientError),

    /// The extractor collaborator refused the client
    #[error("error initializing extractor: {0}")]
    ExtractorInit(#[source] ExtractorError),
}

impl FactoryError {
    /// Whether repeating the call with the same input may succeed
    ///
    /// Credential errors need corrected input and never qualify.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Credential(_) => false,
            Self::ClientConstruction(e) => e.is_transient(),
            Self::ExtractorInit(_) => false,
        }
    }
}

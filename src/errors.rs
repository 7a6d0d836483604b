//! Crate-wide error type.
//!
//! Domain denials produced by the license verifier are *not* errors; they are
//! returned as values (see `server::verifier::DenyReason`). `LicenseError`
//! covers precondition failures, store faults and the client-side transport
//! failures.

use thiserror::Error;

use crate::client::errors::ClientApiError;

#[derive(Debug, Error)]
pub enum LicenseError {
    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// The caller did not supply a machine identifier.
    #[error("machine identifier is required")]
    MissingMachineId,

    /// Request payload failed a precondition.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Unique constraint violated (e.g. duplicate email).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Durable store failure (I/O, transaction, constraint).
    #[error("store error: {0}")]
    StoreError(String),

    /// Secret hashing or verification failed for a reason other than mismatch.
    #[error("hashing error: {0}")]
    HashError(String),

    /// Session token could not be created.
    #[error("token error: {0}")]
    TokenError(String),

    /// Unexpected server-side failure.
    #[error("server error: {0}")]
    ServerError(String),

    /// HTTP transport failure on the client side.
    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// Local file storage failure on the client side.
    #[error("local storage error: {0}")]
    StorageError(#[from] std::io::Error),

    /// The license server answered with a typed error body.
    #[error(transparent)]
    ClientApiError(#[from] ClientApiError),
}

pub type LicenseResult<T> = Result<T, LicenseError>;

impl LicenseError {
    /// True for failures that indicate a server fault rather than a caller mistake.
    pub fn is_server_fault(&self) -> bool {
        matches!(
            self,
            LicenseError::ConfigError(_)
                | LicenseError::StoreError(_)
                | LicenseError::HashError(_)
                | LicenseError::TokenError(_)
                | LicenseError::ServerError(_)
        )
    }
}

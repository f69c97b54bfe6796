//! Error types for certforge operations.
//!
//! Every failure falls into one of four categories: malformed input
//! (`Parse`), cryptographic failure (`Crypto`), a request that violates
//! issuance policy (`Policy`), or a depot problem (`Storage`). Errors carry a
//! human-readable cause and are never retried internally; duplicate-name and
//! permission failures require caller intervention.

use thiserror::Error;

/// The error type shared by all certforge operations.
#[derive(Error, Debug)]
pub enum PkiError {
    /// Malformed PEM, ASN.1, OID, or an unknown PEM block type.
    #[error("parse error: {0}")]
    Parse(String),

    /// Signature verification failure, decryption with a wrong passphrase,
    /// or an unsupported key type for the requested operation.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// The request violates issuance policy (issuer not CA-capable,
    /// conflicting path-length options, expiry outside the representable
    /// ASN.1 time range).
    #[error("policy violation: {0}")]
    Policy(String),

    /// Depot failure: artifact already exists, artifact missing, permissions
    /// too lax, or a write that could not complete.
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<openssl::error::ErrorStack> for PkiError {
    fn from(e: openssl::error::ErrorStack) -> Self {
        PkiError::Crypto(e.to_string())
    }
}

impl From<der::Error> for PkiError {
    fn from(e: der::Error) -> Self {
        PkiError::Parse(e.to_string())
    }
}

/// A specialized Result type for certforge operations.
pub type Result<T> = std::result::Result<T, PkiError>;

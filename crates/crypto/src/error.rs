//! Error type for the crypto crate.

use thiserror::Error;

/// Errors from key handling, signing, and verification.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// A cryptographic operation failed internally.
    #[error("operation failed: {0}")]
    OperationFailed(String),
    /// A signature did not verify.
    #[error("verification failed")]
    VerificationFailed,
    /// A key or signature buffer had the wrong length.
    #[error("invalid length: expected {expected}, got {got}")]
    InvalidLength {
        /// Expected byte length.
        expected: usize,
        /// Length actually supplied.
        got: usize,
    },
    /// Bytes did not decode to a valid key, point, or scalar.
    #[error("deserialization failed: {0}")]
    Deserialization(String),
    /// The caller supplied an unusable argument.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

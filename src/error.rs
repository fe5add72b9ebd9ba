//! Error types for the Drift protocol core.
//!
//! The taxonomy separates structurally-wrong input (`MalformedInput`,
//! `UnsupportedVersion`) from authentication failures (`DecryptionFailed`,
//! `InvalidSignature`). On a public relay network most events are simply
//! not addressed to the local identity, so authentication failures are
//! ordinary branches for callers to drop on, never reasons to abort the
//! ingestion loop.

use thiserror::Error;

/// Errors that can occur during protocol event construction, encryption,
/// and validation.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Input is structurally wrong (bad bech32, bad hex length, malformed
    /// JSON shape). Never retried.
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Ciphertext carries an unknown version prefix.
    #[error("Unsupported encryption version: {0}")]
    UnsupportedVersion(String),

    /// Encryption operation failed.
    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// AEAD authentication failed under every candidate key. The event is
    /// not decryptable by the local identity.
    #[error("Decryption failed")]
    DecryptionFailed,

    /// Event signature or id verification failed.
    #[error("Invalid event signature")]
    InvalidSignature,

    /// Key generation or derivation failed.
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    /// Event signing failed.
    #[error("Event signing failed: {0}")]
    Signing(String),

    /// Serialization failed.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid event structure or content.
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// Gift wrap layer could not be removed.
    #[error("Gift unwrap failed: {0}")]
    Unwrap(String),

    /// Seal layer could not be opened.
    #[error("Seal open failed: {0}")]
    Open(String),

    /// Proof-of-work mining hit the iteration cap without reaching the
    /// target difficulty. Recoverable: retry with a lower target or send
    /// without proof-of-work.
    #[error("Proof-of-work mining exhausted after {iterations} iterations")]
    MiningExhausted {
        /// Number of nonces tried before giving up.
        iterations: u64,
    },

    /// Hex encoding/decoding error.
    #[error("Hex encoding error: {0}")]
    HexError(String),
}

/// Result type for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

impl From<hex::FromHexError> for ProtocolError {
    fn from(e: hex::FromHexError) -> Self {
        Self::HexError(e.to_string())
    }
}

use std::path::PathBuf;

use thiserror::Error;

/// Every failure is terminal for the call that produced it. Variants carry
/// enough context for an operator-facing message and never any key bytes.
#[derive(Debug, Error)]
pub enum AttestError {
    #[error("Malformed input: {0}")]
    Decode(String),

    #[error("Version {version} not supported (maximum {max}), please update")]
    UnsupportedVersion { version: u64, max: u64 },

    /// Wrong password and corrupted vault are the same error.
    #[error("Key decryption failed")]
    KeyDecryptionFailed,

    #[error("Password must be at least {min} characters")]
    PasswordTooShort { min: usize },

    #[error("Passwords do not match")]
    PasswordMismatch,

    #[error("Could not decode the signing request: {0}")]
    InvalidRequest(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Signature was not made over this request")]
    RequestMismatch,

    #[error("Public key does not match")]
    KeyMismatch,

    #[error("Invalid response: signature count does not match (expected {expected}, got {actual})")]
    SignatureCountMismatch { expected: usize, actual: usize },

    #[error("Invalid signature at index {index}")]
    InvalidSignature { index: usize },

    #[error("Public key is not a signer of this request")]
    NotASigner,

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Key already exists at {}", .0.display())]
    KeyExists(PathBuf),

    #[error("No key found at {}", .0.display())]
    KeyNotFound(PathBuf),

    #[error("Invalid settings: {0}")]
    Config(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AttestError>;

//! attest-core: offline signing of append-only log checkpoints
//!
//! # Design principles
//! - No custom primitives; Argon2id, BLAKE3 and Ed25519 come from audited crates.
//! - Secret keys only exist in plaintext inside zero-on-drop buffers.
//! - The wire formats are versioned and decoding rejects unknown versions
//!   before reading anything else.
//!
//! # Module layout
//! - `encoding`: compact binary encoding (varints, fixed and length-prefixed fields)
//! - `crypto`: KDF, hashing and Ed25519 helpers
//! - `password`: zero-on-drop operator password
//! - `vault`: password-protected secret key blob
//! - `request`: signing request decoder trait + log checkpoint requests
//! - `response`: versioned signed response codec
//! - `signer`: request → response
//! - `verifier`: response + request → verified request
//! - `keystore`: key pair files and public key sources
//! - `settings`: `settings.json` in the keys directory
//! - `paths`: default locations
//! - `text`: base64url text transport
//! - `error`: unified error type

pub mod crypto;
pub mod encoding;
pub mod error;
pub mod keystore;
pub mod password;
pub mod paths;
pub mod request;
pub mod response;
pub mod settings;
pub mod signer;
pub mod text;
pub mod vault;
pub mod verifier;

/// Highest request/response version this build understands.
pub const MAX_SUPPORTED_VERSION: u64 = 2;

pub use crypto::{KdfParams, PublicKey};
pub use error::{AttestError, Result};
pub use password::Password;
pub use request::{LogRequest, LogRequestDecoder, RequestDecoder, Signable, SigningRequest};
pub use response::Response;
pub use vault::EncryptedKeyBlob;

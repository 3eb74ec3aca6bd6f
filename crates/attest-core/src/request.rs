//! Signing requests.
//!
//! The signer and verifier only see requests through [`RequestDecoder`]:
//! turn raw bytes into a request, then derive the ordered signables for a
//! public key. [`LogRequestDecoder`] is the decoder for append-only log
//! checkpoints, either a single tree ("core") or a metadata tree plus a
//! content tree ("drive").

use std::fmt;

use crate::crypto::{PublicKey, HASH_LEN, PUBLIC_KEY_LEN};
use crate::encoding::{uint_len, CompactEncoding, Reader, Writer};
use crate::error::{AttestError, Result};
use crate::MAX_SUPPORTED_VERSION;

const CONTENT_KEY_CONTEXT: &str = "attest 2024 content key";
const NAMESPACE_CONTEXT: &str = "attest 2024 log tree namespace";

const FLAG_CONTENT: u64 = 1;

/// Exactly what one signature covers, plus the index of the signing key in
/// the request's signer set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signable {
    pub signer: u64,
    pub bytes: Vec<u8>,
}

impl AsRef<[u8]> for Signable {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

pub trait SigningRequest {
    fn version(&self) -> u64;
}

pub trait RequestDecoder {
    type Request: SigningRequest;

    fn decode(&self, bytes: &[u8]) -> Result<Self::Request>;

    /// Ordered signables for `public_key`. Signer and verifier must get the
    /// same order for the same inputs.
    fn signables(&self, public_key: &PublicKey, request: &Self::Request) -> Result<Vec<Signable>>;
}

// ── Log checkpoint requests ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeCheckpoint {
    pub length: u64,
    pub tree_hash: [u8; HASH_LEN],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRequest {
    pub version: u64,
    /// Log key. For a drive, the metadata log key.
    pub key: [u8; PUBLIC_KEY_LEN],
    pub fork: u64,
    pub length: u64,
    pub tree_hash: [u8; HASH_LEN],
    /// Content tree checkpoint, present for drives.
    pub content: Option<TreeCheckpoint>,
    /// Keys allowed to sign, in manifest order.
    pub signers: Vec<PublicKey>,
}

impl LogRequest {
    pub fn is_drive(&self) -> bool {
        self.content.is_some()
    }

    pub fn content_key(&self) -> [u8; 32] {
        blake3::derive_key(CONTENT_KEY_CONTEXT, &self.key)
    }

    pub fn signer_index(&self, public_key: &PublicKey) -> Option<u64> {
        self.signers
            .iter()
            .position(|k| k == public_key)
            .map(|i| i as u64)
    }
}

impl SigningRequest for LogRequest {
    fn version(&self) -> u64 {
        self.version
    }
}

impl CompactEncoding for LogRequest {
    fn preencode(&self) -> usize {
        let content = self
            .content
            .map(|c| uint_len(c.length) + HASH_LEN)
            .unwrap_or(0);
        uint_len(self.version)
            + PUBLIC_KEY_LEN
            + uint_len(self.fork)
            + uint_len(self.length)
            + HASH_LEN
            + 1
            + content
            + uint_len(self.signers.len() as u64)
            + self.signers.len() * PUBLIC_KEY_LEN
    }

    fn encode(&self, writer: &mut Writer) {
        writer.uint(self.version);
        writer.fixed(&self.key);
        writer.uint(self.fork);
        writer.uint(self.length);
        writer.fixed(&self.tree_hash);
        match &self.content {
            Some(content) => {
                writer.uint(FLAG_CONTENT);
                writer.uint(content.length);
                writer.fixed(&content.tree_hash);
            }
            None => writer.uint(0),
        }
        writer.uint(self.signers.len() as u64);
        for signer in &self.signers {
            writer.fixed(signer.as_bytes());
        }
    }

    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        let version = reader.uint()?;
        if version == 0 {
            return Err(AttestError::Decode("request version 0".into()));
        }
        // Unknown versions may have a different body.
        if version > MAX_SUPPORTED_VERSION {
            return Err(AttestError::UnsupportedVersion {
                version,
                max: MAX_SUPPORTED_VERSION,
            });
        }
        let key = reader.fixed()?;
        let fork = reader.uint()?;
        let length = reader.uint()?;
        let tree_hash = reader.fixed()?;
        let flags = reader.uint()?;
        if flags & !FLAG_CONTENT != 0 {
            return Err(AttestError::Decode(format!("unknown request flags {flags:#x}")));
        }
        let content = if flags & FLAG_CONTENT != 0 {
            Some(TreeCheckpoint {
                length: reader.uint()?,
                tree_hash: reader.fixed()?,
            })
        } else {
            None
        };
        let count = reader.array_len(PUBLIC_KEY_LEN)?;
        let signers = (0..count)
            .map(|_| reader.fixed().map(PublicKey))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            version,
            key,
            fork,
            length,
            tree_hash,
            content,
            signers,
        })
    }
}

/// `namespace (32) || treeHash (32) || length (u64 LE) || fork (u64 LE)`
fn tree_signable(tree_key: &[u8; 32], tree_hash: &[u8; HASH_LEN], length: u64, fork: u64) -> Vec<u8> {
    let namespace = blake3::derive_key(NAMESPACE_CONTEXT, tree_key);
    let mut out = Vec::with_capacity(32 + HASH_LEN + 16);
    out.extend_from_slice(&namespace);
    out.extend_from_slice(tree_hash);
    out.extend_from_slice(&length.to_le_bytes());
    out.extend_from_slice(&fork.to_le_bytes());
    out
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LogRequestDecoder;

impl RequestDecoder for LogRequestDecoder {
    type Request = LogRequest;

    fn decode(&self, bytes: &[u8]) -> Result<LogRequest> {
        LogRequest::from_bytes(bytes)
    }

    fn signables(&self, public_key: &PublicKey, request: &LogRequest) -> Result<Vec<Signable>> {
        let signer = request
            .signer_index(public_key)
            .ok_or(AttestError::NotASigner)?;
        let mut out = vec![Signable {
            signer,
            bytes: tree_signable(&request.key, &request.tree_hash, request.length, request.fork),
        }];
        if let Some(content) = &request.content {
            out.push(Signable {
                signer,
                bytes: tree_signable(
                    &request.content_key(),
                    &content.tree_hash,
                    content.length,
                    request.fork,
                ),
            });
        }
        Ok(out)
    }
}

impl fmt::Display for LogRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = PublicKey(self.key);
        match &self.content {
            None => {
                writeln!(f, "Log signing request (v{})", self.version)?;
                writeln!(f, "  core:     {key}")?;
                writeln!(f, "  fork:     {}", self.fork)?;
                writeln!(f, "  length:   {}", self.length)?;
                write!(f, "  treeHash: {}", hex::encode(self.tree_hash))
            }
            Some(content) => {
                writeln!(f, "Drive signing request (v{})", self.version)?;
                writeln!(f, "  key:      {key}")?;
                writeln!(f, "  fork:     {}", self.fork)?;
                writeln!(f, "  metadata: length {} treeHash {}", self.length, hex::encode(self.tree_hash))?;
                write!(
                    f,
                    "  content:  length {} treeHash {}",
                    content.length,
                    hex::encode(content.tree_hash)
                )
            }
        }
    }
}

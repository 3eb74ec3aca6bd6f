//! Signed response wire format.
//!
//! ```text
//! version (uint) || requestHash (32) || publicKey (32) || uint(count) || entries
//! ```
//!
//! The entry shape is chosen by `version` through [`LAYOUTS`]; decoding never
//! inspects the entry bytes to guess their shape.

use crate::crypto::{PublicKey, SignatureBytes, HASH_LEN, PUBLIC_KEY_LEN, SIGNATURE_LEN};
use crate::encoding::{uint_len, CompactEncoding, Reader, Writer};
use crate::error::{AttestError, Result};
use crate::MAX_SUPPORTED_VERSION;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryLayout {
    /// A bare 64-byte signature.
    Single,
    /// `uint(signer) || signature (64) || uint(patch)`.
    Quorum,
}

/// Version → entry layout. Adding a protocol version means adding a row.
pub const LAYOUTS: &[(u64, EntryLayout)] = &[(1, EntryLayout::Single), (2, EntryLayout::Quorum)];

impl EntryLayout {
    pub fn for_version(version: u64) -> Result<Self> {
        LAYOUTS
            .iter()
            .find(|(v, _)| *v == version)
            .map(|(_, layout)| *layout)
            .ok_or(AttestError::UnsupportedVersion {
                version,
                max: MAX_SUPPORTED_VERSION,
            })
    }

    fn min_entry_len(self) -> usize {
        match self {
            EntryLayout::Single => SIGNATURE_LEN,
            EntryLayout::Quorum => 1 + SIGNATURE_LEN + 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureEntry {
    Single(SignatureBytes),
    Quorum {
        /// Index of the signing key in the request's signer set.
        signer: u64,
        signature: SignatureBytes,
        patch: u64,
    },
}

impl SignatureEntry {
    pub fn signature(&self) -> &SignatureBytes {
        match self {
            SignatureEntry::Single(signature) => signature,
            SignatureEntry::Quorum { signature, .. } => signature,
        }
    }

    pub fn signature_mut(&mut self) -> &mut SignatureBytes {
        match self {
            SignatureEntry::Single(signature) => signature,
            SignatureEntry::Quorum { signature, .. } => signature,
        }
    }

    pub fn signer(&self) -> Option<u64> {
        match self {
            SignatureEntry::Single(_) => None,
            SignatureEntry::Quorum { signer, .. } => Some(*signer),
        }
    }

    pub fn layout(&self) -> EntryLayout {
        match self {
            SignatureEntry::Single(_) => EntryLayout::Single,
            SignatureEntry::Quorum { .. } => EntryLayout::Quorum,
        }
    }

    fn encoded_len(&self) -> usize {
        match self {
            SignatureEntry::Single(_) => SIGNATURE_LEN,
            SignatureEntry::Quorum { signer, patch, .. } => {
                uint_len(*signer) + SIGNATURE_LEN + uint_len(*patch)
            }
        }
    }

    fn encode(&self, writer: &mut Writer) {
        match self {
            SignatureEntry::Single(signature) => writer.fixed(signature),
            SignatureEntry::Quorum {
                signer,
                signature,
                patch,
            } => {
                writer.uint(*signer);
                writer.fixed(signature);
                writer.uint(*patch);
            }
        }
    }

    fn decode(layout: EntryLayout, reader: &mut Reader<'_>) -> Result<Self> {
        Ok(match layout {
            EntryLayout::Single => SignatureEntry::Single(reader.fixed()?),
            EntryLayout::Quorum => SignatureEntry::Quorum {
                signer: reader.uint()?,
                signature: reader.fixed()?,
                patch: reader.uint()?,
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub version: u64,
    pub request_hash: [u8; HASH_LEN],
    pub public_key: PublicKey,
    pub signatures: Vec<SignatureEntry>,
}

impl Response {
    /// Build a response, checking every entry has the shape `version` demands.
    pub fn new(
        version: u64,
        request_hash: [u8; HASH_LEN],
        public_key: PublicKey,
        signatures: Vec<SignatureEntry>,
    ) -> Result<Self> {
        let layout = EntryLayout::for_version(version)?;
        if let Some(bad) = signatures.iter().find(|s| s.layout() != layout) {
            return Err(AttestError::Encoding(format!(
                "{:?} entry in a version {version} response",
                bad.layout()
            )));
        }
        Ok(Self {
            version,
            request_hash,
            public_key,
            signatures,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        self.to_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Self::from_bytes(bytes)
    }
}

impl CompactEncoding for Response {
    fn preencode(&self) -> usize {
        uint_len(self.version)
            + HASH_LEN
            + PUBLIC_KEY_LEN
            + uint_len(self.signatures.len() as u64)
            + self
                .signatures
                .iter()
                .map(SignatureEntry::encoded_len)
                .sum::<usize>()
    }

    fn encode(&self, writer: &mut Writer) {
        writer.uint(self.version);
        writer.fixed(&self.request_hash);
        writer.fixed(self.public_key.as_bytes());
        writer.uint(self.signatures.len() as u64);
        for entry in &self.signatures {
            entry.encode(writer);
        }
    }

    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        let version = reader.uint()?;
        // The layout must be known before touching anything after the version.
        let layout = EntryLayout::for_version(version)?;
        let request_hash = reader.fixed::<HASH_LEN>()?;
        let public_key = PublicKey(reader.fixed::<PUBLIC_KEY_LEN>()?);
        let count = reader.array_len(layout.min_entry_len())?;
        let signatures = (0..count)
            .map(|_| SignatureEntry::decode(layout, reader))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            version,
            request_hash,
            public_key,
            signatures,
        })
    }
}

use tracing::{debug, info};

use crate::crypto::{self, PublicKey};
use crate::error::{AttestError, Result};
use crate::password::Password;
use crate::request::{RequestDecoder, Signable, SigningRequest};
use crate::response::{EntryLayout, Response, SignatureEntry};
use crate::vault::{self, EncryptedKeyBlob};
use crate::MAX_SUPPORTED_VERSION;

/// A decoded, version-checked request with its signables already derived.
/// Everything that can fail without the password has already been checked,
/// so the operator is only asked for it once the request is known to be
/// signable by this key.
#[derive(Debug)]
pub struct PreparedRequest<R> {
    request: R,
    request_hash: [u8; 32],
    public_key: PublicKey,
    signables: Vec<Signable>,
}

pub fn prepare<D: RequestDecoder>(
    decoder: &D,
    raw_request: &[u8],
    public_key: &PublicKey,
) -> Result<PreparedRequest<D::Request>> {
    let request = decoder.decode(raw_request).map_err(|e| match e {
        AttestError::UnsupportedVersion { .. } => e,
        other => AttestError::InvalidRequest(other.to_string()),
    })?;
    let version = request.version();
    if version > MAX_SUPPORTED_VERSION {
        return Err(AttestError::UnsupportedVersion {
            version,
            max: MAX_SUPPORTED_VERSION,
        });
    }
    let signables = decoder.signables(public_key, &request)?;
    debug!(version, signables = signables.len(), "prepared signing request");
    Ok(PreparedRequest {
        request,
        request_hash: crypto::hash(raw_request),
        public_key: *public_key,
        signables,
    })
}

impl<R: SigningRequest> PreparedRequest<R> {
    pub fn request(&self) -> &R {
        &self.request
    }

    pub fn signables(&self) -> &[Signable] {
        &self.signables
    }

    /// Unlock the vault, sign every signable in order and return the
    /// encoded response. Nothing is written anywhere.
    pub fn sign(&self, blob: &EncryptedKeyBlob, password: Password) -> Result<Vec<u8>> {
        let version = self.request.version();
        let layout = EntryLayout::for_version(version)?;

        let key = vault::unlock(blob, password)?;
        if key.public_key() != self.public_key {
            return Err(AttestError::KeyMismatch);
        }
        let signatures = key.sign(&self.signables)?;

        let entries = self
            .signables
            .iter()
            .zip(signatures)
            .map(|(signable, signature)| match layout {
                EntryLayout::Single => SignatureEntry::Single(signature),
                EntryLayout::Quorum => SignatureEntry::Quorum {
                    signer: signable.signer,
                    signature,
                    patch: 0,
                },
            })
            .collect();

        let response = Response::new(version, self.request_hash, self.public_key, entries)?;
        info!(version, signatures = response.signatures.len(), "signed request");
        Ok(response.encode())
    }
}

/// Decode, check and sign in one step.
pub fn sign_request<D: RequestDecoder>(
    decoder: &D,
    raw_request: &[u8],
    public_key: &PublicKey,
    blob: &EncryptedKeyBlob,
    password: Password,
) -> Result<Vec<u8>> {
    prepare(decoder, raw_request, public_key)?.sign(blob, password)
}

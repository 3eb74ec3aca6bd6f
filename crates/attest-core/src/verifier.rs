//! Response verification.
//!
//! Checks run cheapest first and stop at the first failure: response
//! decoding, request decoding and version ceiling, request hash, claimed
//! key, version agreement, signature count, then each signature in order.

use tracing::{debug, warn};

use crate::crypto::{self, PublicKey};
use crate::error::{AttestError, Result};
use crate::request::{RequestDecoder, SigningRequest};
use crate::response::Response;
use crate::MAX_SUPPORTED_VERSION;

fn decode_response(raw_response: &[u8]) -> Result<Response> {
    Response::decode(raw_response).map_err(|e| match e {
        AttestError::UnsupportedVersion { .. } => e,
        other => AttestError::InvalidResponse(other.to_string()),
    })
}

/// The public key a response claims to be signed by. Used to pick a key
/// out of a directory before verifying; it proves nothing on its own.
pub fn claimed_public_key(raw_response: &[u8]) -> Result<PublicKey> {
    Ok(decode_response(raw_response)?.public_key)
}

/// Verify `raw_response` against `raw_request` for `public_key`, returning
/// the decoded request on success.
pub fn verify<D: RequestDecoder>(
    decoder: &D,
    raw_response: &[u8],
    raw_request: &[u8],
    public_key: &PublicKey,
) -> Result<D::Request> {
    let response = decode_response(raw_response)?;

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

    if blake3::Hash::from(crypto::hash(raw_request)) != blake3::Hash::from(response.request_hash) {
        warn!("response was produced for a different request");
        return Err(AttestError::RequestMismatch);
    }
    if response.public_key != *public_key {
        warn!(claimed = %response.public_key, expected = %public_key, "response key mismatch");
        return Err(AttestError::KeyMismatch);
    }
    if response.version != version {
        return Err(AttestError::InvalidResponse(format!(
            "response version {} for a version {version} request",
            response.version
        )));
    }

    let signables = decoder.signables(public_key, &request)?;
    if signables.len() != response.signatures.len() {
        return Err(AttestError::SignatureCountMismatch {
            expected: signables.len(),
            actual: response.signatures.len(),
        });
    }

    for (index, (entry, signable)) in response.signatures.iter().zip(&signables).enumerate() {
        let signer_ok = entry.signer().map_or(true, |s| s == signable.signer);
        if !signer_ok || !crypto::verify_detached(entry.signature(), &signable.bytes, public_key) {
            warn!(index, "signature failed verification");
            return Err(AttestError::InvalidSignature { index });
        }
    }

    debug!(version, signatures = signables.len(), "response verified");
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::TEST_KDF;
    use crate::encoding::CompactEncoding;
    use crate::password::Password;
    use crate::request::{LogRequest, LogRequestDecoder, TreeCheckpoint};
    use crate::response::SignatureEntry;
    use crate::signer;
    use crate::vault::{self, GeneratedKey};

    fn pw(s: &str) -> Password {
        Password::new(s).unwrap()
    }

    fn drive(public_key: PublicKey) -> LogRequest {
        LogRequest {
            version: 2,
            key: [0x11; 32],
            fork: 3,
            length: 42,
            tree_hash: [0x22; 32],
            content: Some(TreeCheckpoint {
                length: 17,
                tree_hash: [0x33; 32],
            }),
            signers: vec![PublicKey([0x44; 32]), public_key],
        }
    }

    struct Fixture {
        key: GeneratedKey,
        request: LogRequest,
        raw_request: Vec<u8>,
        raw_response: Vec<u8>,
    }

    fn signed() -> Fixture {
        let key = vault::generate(pw("correct-password"), TEST_KDF).unwrap();
        let request = drive(key.public_key);
        let raw_request = request.to_bytes();
        let raw_response = signer::sign_request(
            &LogRequestDecoder,
            &raw_request,
            &key.public_key,
            &key.encrypted_secret_key,
            pw("correct-password"),
        )
        .unwrap();
        Fixture {
            key,
            request,
            raw_request,
            raw_response,
        }
    }

    fn reencode(raw: &[u8], edit: impl FnOnce(&mut Response)) -> Vec<u8> {
        let mut response = Response::decode(raw).unwrap();
        edit(&mut response);
        response.encode()
    }

    #[test]
    fn valid_response_returns_request() {
        let f = signed();
        let verified = verify(
            &LogRequestDecoder,
            &f.raw_response,
            &f.raw_request,
            &f.key.public_key,
        )
        .unwrap();
        assert_eq!(verified, f.request);
        assert_eq!(claimed_public_key(&f.raw_response).unwrap(), f.key.public_key);
    }

    #[test]
    fn zeroed_first_signature_is_invalid() {
        let f = signed();
        let tampered = reencode(&f.raw_response, |r| {
            *r.signatures[0].signature_mut() = [0u8; 64];
        });
        assert!(matches!(
            verify(&LogRequestDecoder, &tampered, &f.raw_request, &f.key.public_key),
            Err(AttestError::InvalidSignature { index: 0 })
        ));
    }

    #[test]
    fn zeroing_any_signature_byte_fails() {
        let f = signed();
        let response = Response::decode(&f.raw_response).unwrap();
        for entry in 0..response.signatures.len() {
            for byte in 0..64 {
                if response.signatures[entry].signature()[byte] == 0 {
                    continue;
                }
                let tampered = reencode(&f.raw_response, |r| {
                    r.signatures[entry].signature_mut()[byte] = 0;
                });
                assert!(
                    verify(&LogRequestDecoder, &tampered, &f.raw_request, &f.key.public_key).is_err(),
                    "entry {entry} byte {byte}"
                );
            }
        }
        // the untouched response still verifies
        verify(&LogRequestDecoder, &f.raw_response, &f.raw_request, &f.key.public_key).unwrap();
    }

    #[test]
    fn different_key_is_key_mismatch() {
        let f = signed();
        let other = vault::generate(pw("correct-password"), TEST_KDF).unwrap();
        assert!(matches!(
            verify(&LogRequestDecoder, &f.raw_response, &f.raw_request, &other.public_key),
            Err(AttestError::KeyMismatch)
        ));
    }

    #[test]
    fn swapped_signatures_fail() {
        let f = signed();
        let swapped = reencode(&f.raw_response, |r| r.signatures.swap(0, 1));
        assert!(matches!(
            verify(&LogRequestDecoder, &swapped, &f.raw_request, &f.key.public_key),
            Err(AttestError::InvalidSignature { index: 0 })
        ));
    }

    #[test]
    fn other_request_is_request_mismatch() {
        let f = signed();
        let mut other = f.request.clone();
        other.length += 1;
        assert!(matches!(
            verify(&LogRequestDecoder, &f.raw_response, &other.to_bytes(), &f.key.public_key),
            Err(AttestError::RequestMismatch)
        ));
    }

    #[test]
    fn dropped_signature_is_count_mismatch() {
        let f = signed();
        let short = reencode(&f.raw_response, |r| {
            r.signatures.pop();
        });
        assert!(matches!(
            verify(&LogRequestDecoder, &short, &f.raw_request, &f.key.public_key),
            Err(AttestError::SignatureCountMismatch { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn wrong_signer_index_is_invalid() {
        let f = signed();
        let moved = reencode(&f.raw_response, |r| {
            if let SignatureEntry::Quorum { signer, .. } = &mut r.signatures[1] {
                *signer = 0;
            }
        });
        assert!(matches!(
            verify(&LogRequestDecoder, &moved, &f.raw_request, &f.key.public_key),
            Err(AttestError::InvalidSignature { index: 1 })
        ));
    }

    #[test]
    fn response_version_above_ceiling_rejected_first() {
        let f = signed();
        let mut bytes = f.raw_response.clone();
        bytes[0] = (MAX_SUPPORTED_VERSION + 1) as u8;
        // even against a request it was never made for
        assert!(matches!(
            verify(&LogRequestDecoder, &bytes, b"unrelated", &f.key.public_key),
            Err(AttestError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn request_version_above_ceiling_rejected_before_hash_check() {
        let f = signed();
        let raw_request = [(MAX_SUPPORTED_VERSION + 1) as u8];
        assert!(matches!(
            verify(&LogRequestDecoder, &f.raw_response, &raw_request, &f.key.public_key),
            Err(AttestError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn garbage_response_is_invalid_response() {
        let f = signed();
        assert!(matches!(
            verify(&LogRequestDecoder, &f.raw_response[..40], &f.raw_request, &f.key.public_key),
            Err(AttestError::InvalidResponse(_))
        ));
    }

    #[test]
    fn version_one_request_with_version_two_response_rejected() {
        let key = vault::generate(pw("correct-password"), TEST_KDF).unwrap();
        let mut request = drive(key.public_key);
        request.version = 1;
        let raw_v1 = request.to_bytes();
        let signed_v1 = signer::sign_request(
            &LogRequestDecoder,
            &raw_v1,
            &key.public_key,
            &key.encrypted_secret_key,
            pw("correct-password"),
        )
        .unwrap();
        verify(&LogRequestDecoder, &signed_v1, &raw_v1, &key.public_key).unwrap();

        let relabelled = reencode(&signed_v1, |r| {
            r.version = 2;
            r.signatures = r
                .signatures
                .iter()
                .map(|s| SignatureEntry::Quorum {
                    signer: 1,
                    signature: *s.signature(),
                    patch: 0,
                })
                .collect();
        });
        assert!(matches!(
            verify(&LogRequestDecoder, &relabelled, &raw_v1, &key.public_key),
            Err(AttestError::InvalidResponse(_))
        ));
    }
}

//! Primitive layer: Argon2id keystream derivation, BLAKE3 hashing and
//! detached Ed25519 signatures. Nothing above this module touches the
//! underlying crates directly.

use argon2::{Algorithm, Argon2, Params, Version};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroizing;

use crate::error::{AttestError, Result};
use crate::text;

pub const PUBLIC_KEY_LEN: usize = 32;
pub const SECRET_KEY_LEN: usize = 64;
pub const SIGNATURE_LEN: usize = 64;
pub const HASH_LEN: usize = 32;
pub const SALT_LEN: usize = 32;

pub type SignatureBytes = [u8; SIGNATURE_LEN];

// ── KDF parameters ────────────────────────────────────────────────────────────

/// Cost of the password KDF. `ops` is the Argon2id pass count, `mem` the
/// memory cost in bytes. Stored in the clear next to every vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub ops: u64,
    pub mem: u64,
}

pub const MIN_KDF_OPS: u64 = 1;
pub const MAX_KDF_OPS: u64 = 32;
pub const MIN_KDF_MEM: u64 = 8 * 1024;
pub const MAX_KDF_MEM: u64 = 4 * 1024 * 1024 * 1024;

impl KdfParams {
    pub const INTERACTIVE: KdfParams = KdfParams {
        ops: 2,
        mem: 64 * 1024 * 1024,
    };
    pub const MODERATE: KdfParams = KdfParams {
        ops: 3,
        mem: 256 * 1024 * 1024,
    };
    pub const SENSITIVE: KdfParams = KdfParams {
        ops: 4,
        mem: 1024 * 1024 * 1024,
    };

    /// Vault files are untrusted input; refuse parameters that would make a
    /// decrypt attempt unbounded.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_KDF_OPS..=MAX_KDF_OPS).contains(&self.ops) {
            return Err(AttestError::Decode(format!(
                "kdf ops {} outside {MIN_KDF_OPS}..={MAX_KDF_OPS}",
                self.ops
            )));
        }
        if !(MIN_KDF_MEM..=MAX_KDF_MEM).contains(&self.mem) {
            return Err(AttestError::Decode(format!(
                "kdf memory {} outside {MIN_KDF_MEM}..={MAX_KDF_MEM}",
                self.mem
            )));
        }
        Ok(())
    }

    fn argon2(&self, output_len: usize) -> Result<Argon2<'static>> {
        self.validate()?;
        let m_cost = u32::try_from(self.mem / 1024)
            .map_err(|_| AttestError::KeyDerivation("memory cost too large".into()))?;
        let t_cost = self.ops as u32;
        let params = Params::new(m_cost, t_cost, 1, Some(output_len))
            .map_err(|e| AttestError::KeyDerivation(e.to_string()))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::SENSITIVE
    }
}

/// Fill `out` with password-derived keystream. Blocks for as long as the
/// parameters demand.
pub fn derive_keystream(
    password: &[u8],
    salt: &[u8; SALT_LEN],
    params: &KdfParams,
    out: &mut [u8],
) -> Result<()> {
    let argon = params.argon2(out.len())?;
    tracing::debug!(ops = params.ops, mem = params.mem, len = out.len(), "deriving keystream");
    argon
        .hash_password_into(password, salt, out)
        .map_err(|e| AttestError::KeyDerivation(e.to_string()))
}

/// In-place XOR. The same call encrypts and decrypts.
pub fn xor_in_place(data: &mut [u8], keystream: &[u8]) -> Result<()> {
    if data.len() != keystream.len() {
        return Err(AttestError::KeyDerivation(format!(
            "keystream length {} does not match payload length {}",
            keystream.len(),
            data.len()
        )));
    }
    for (d, k) in data.iter_mut().zip(keystream) {
        *d ^= k;
    }
    Ok(())
}

// ── Hashing ───────────────────────────────────────────────────────────────────

pub fn hash(data: &[u8]) -> [u8; HASH_LEN] {
    blake3::hash(data).into()
}

pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut out = [0u8; N];
    OsRng.fill_bytes(&mut out);
    out
}

// ── Keys and signatures ───────────────────────────────────────────────────────

/// 32-byte Ed25519 public key, base64url-encoded when shown to people.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey(pub [u8; PUBLIC_KEY_LEN]);

impl PublicKey {
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        text::encode(self.0)
    }

    pub fn from_base64(s: &str) -> Result<Self> {
        Self::from_slice(&text::decode(s)?)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; PUBLIC_KEY_LEN] = bytes.try_into().map_err(|_| {
            AttestError::InvalidKey(format!(
                "public key must be {PUBLIC_KEY_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_base64())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

/// Fresh keypair. The secret half is the 64-byte `seed || public` encoding
/// and is wiped when the returned buffer drops.
pub fn generate_keypair() -> (PublicKey, Zeroizing<[u8; SECRET_KEY_LEN]>) {
    let signing_key = SigningKey::generate(&mut OsRng);
    let public = PublicKey(signing_key.verifying_key().to_bytes());
    let secret = Zeroizing::new(signing_key.to_keypair_bytes());
    (public, secret)
}

/// Public half of a 64-byte secret key.
pub fn public_key_of(secret: &[u8; SECRET_KEY_LEN]) -> PublicKey {
    let mut public = [0u8; PUBLIC_KEY_LEN];
    public.copy_from_slice(&secret[32..]);
    PublicKey(public)
}

/// Load a signing key, rejecting a secret whose embedded public half does
/// not match its seed.
pub(crate) fn signing_key(secret: &[u8; SECRET_KEY_LEN]) -> Result<SigningKey> {
    SigningKey::from_keypair_bytes(secret)
        .map_err(|_| AttestError::InvalidKey("secret key does not match its public half".into()))
}

pub(crate) fn sign_detached(key: &SigningKey, message: &[u8]) -> SignatureBytes {
    key.sign(message).to_bytes()
}

pub fn verify_detached(signature: &SignatureBytes, message: &[u8], public: &PublicKey) -> bool {
    let Ok(key) = VerifyingKey::from_bytes(&public.0) else {
        return false;
    };
    key.verify_strict(message, &Signature::from_bytes(signature))
        .is_ok()
}

#[cfg(test)]
pub(crate) const TEST_KDF: KdfParams = KdfParams {
    ops: 1,
    mem: 64 * 1024,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keystream_is_deterministic_per_password_and_salt() {
        let salt = [7u8; SALT_LEN];
        let mut a = [0u8; 104];
        let mut b = [0u8; 104];
        let mut c = [0u8; 104];
        derive_keystream(b"password", &salt, &TEST_KDF, &mut a).unwrap();
        derive_keystream(b"password", &salt, &TEST_KDF, &mut b).unwrap();
        derive_keystream(b"passwore", &salt, &TEST_KDF, &mut c).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn out_of_range_params_rejected_before_derivation() {
        let mut out = [0u8; 16];
        let greedy = KdfParams {
            ops: 1,
            mem: MAX_KDF_MEM + 1,
        };
        assert!(derive_keystream(b"pw", &[0u8; SALT_LEN], &greedy, &mut out).is_err());
        let zero_ops = KdfParams { ops: 0, mem: MIN_KDF_MEM };
        assert!(zero_ops.validate().is_err());
    }

    #[test]
    fn xor_roundtrip_and_length_check() {
        let key = [0x5au8; 4];
        let mut data = *b"abcd";
        xor_in_place(&mut data, &key).unwrap();
        assert_ne!(&data, b"abcd");
        xor_in_place(&mut data, &key).unwrap();
        assert_eq!(&data, b"abcd");
        assert!(xor_in_place(&mut data, &[0u8; 3]).is_err());
    }

    #[test]
    fn sign_and_verify_detached() {
        let (public, secret) = generate_keypair();
        assert_eq!(public_key_of(&secret), public);
        let key = signing_key(&secret).unwrap();
        let sig = sign_detached(&key, b"message");
        assert!(verify_detached(&sig, b"message", &public));
        assert!(!verify_detached(&sig, b"massage", &public));
    }

    #[test]
    fn mismatched_keypair_bytes_rejected() {
        let (_, secret) = generate_keypair();
        let mut broken = *secret;
        broken[40] ^= 1;
        assert!(signing_key(&broken).is_err());
    }

    #[test]
    fn public_key_base64_roundtrip() {
        let (public, _) = generate_keypair();
        let text = public.to_base64();
        assert_eq!(PublicKey::from_base64(&text).unwrap(), public);
        assert!(PublicKey::from_base64("AAAA").is_err());
    }
}

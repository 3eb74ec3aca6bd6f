//! Password-protected secret key at rest.
//!
//! On disk a key is an [`EncryptedKeyBlob`]:
//!
//! ```text
//! ops (u64 LE) || mem (u64 LE) || salt (32) || uint(len) || payload (104)
//! ```
//!
//! `payload` is `id (8) || secretKey (64) || checkSum (32)` XORed with 104
//! bytes of Argon2id output keyed by the password and salt. `checkSum` is
//! BLAKE3 over `id || secretKey`, so a wrong password and a corrupted file
//! both surface as the same checksum failure.

use std::fmt;

use tracing::debug;
use zeroize::{Zeroize, Zeroizing};

use crate::crypto::{
    self, derive_keystream, xor_in_place, KdfParams, PublicKey, SignatureBytes, HASH_LEN,
    SALT_LEN, SECRET_KEY_LEN,
};
use crate::encoding::{buffer_len, CompactEncoding, Reader, Writer};
use crate::error::{AttestError, Result};
use crate::password::Password;

pub const ID_LEN: usize = 8;
pub const CHECKSUM_LEN: usize = HASH_LEN;
pub const PAYLOAD_LEN: usize = ID_LEN + SECRET_KEY_LEN + CHECKSUM_LEN;

const SECRET_RANGE: std::ops::Range<usize> = ID_LEN..ID_LEN + SECRET_KEY_LEN;
const CHECKSUM_RANGE: std::ops::Range<usize> = ID_LEN + SECRET_KEY_LEN..PAYLOAD_LEN;

#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedKeyBlob {
    pub params: KdfParams,
    pub salt: [u8; SALT_LEN],
    payload: Vec<u8>,
}

impl EncryptedKeyBlob {
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Mutable view of the ciphertext, for corruption tests and tooling.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.payload
    }
}

impl fmt::Debug for EncryptedKeyBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedKeyBlob")
            .field("params", &self.params)
            .field("salt", &hex::encode(self.salt))
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

impl CompactEncoding for EncryptedKeyBlob {
    fn preencode(&self) -> usize {
        8 + 8 + SALT_LEN + buffer_len(self.payload.len())
    }

    fn encode(&self, writer: &mut Writer) {
        writer.uint64(self.params.ops);
        writer.uint64(self.params.mem);
        writer.fixed(&self.salt);
        writer.buffer(&self.payload);
    }

    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        let params = KdfParams {
            ops: reader.uint64()?,
            mem: reader.uint64()?,
        };
        params.validate()?;
        let salt = reader.fixed::<SALT_LEN>()?;
        let payload = reader.buffer()?;
        if payload.len() != PAYLOAD_LEN {
            return Err(AttestError::Decode(format!(
                "vault payload must be {PAYLOAD_LEN} bytes, got {}",
                payload.len()
            )));
        }
        Ok(Self {
            params,
            salt,
            payload: payload.to_vec(),
        })
    }
}

/// Result of key generation: the public key and the sealed secret. The
/// plaintext secret never leaves `generate`.
#[derive(Debug, Clone)]
pub struct GeneratedKey {
    pub public_key: PublicKey,
    pub encrypted_secret_key: EncryptedKeyBlob,
}

/// Generate a keypair and seal its secret half under `password`.
pub fn generate(password: Password, params: KdfParams) -> Result<GeneratedKey> {
    let (public_key, secret_key) = crypto::generate_keypair();
    let id = crypto::random_bytes::<ID_LEN>();
    let encrypted_secret_key = seal(&id, &secret_key, &password, params)?;
    debug!(public_key = %public_key, "generated key pair");
    Ok(GeneratedKey {
        public_key,
        encrypted_secret_key,
    })
}

/// Decrypt and checksum-verify a vault. The returned key can sign exactly
/// once and is wiped afterwards.
pub fn unlock(blob: &EncryptedKeyBlob, password: Password) -> Result<UnlockedKey> {
    let payload = open(blob, &password)?;
    drop(password);
    let mut secret = Zeroizing::new([0u8; SECRET_KEY_LEN]);
    secret.copy_from_slice(&payload[SECRET_RANGE]);
    Ok(UnlockedKey { secret })
}

/// Re-encrypt an existing key under a new password with a fresh salt. The
/// key `id` and secret are carried over unchanged.
pub fn rekey(
    blob: &EncryptedKeyBlob,
    old_password: Password,
    new_password: Password,
    params: KdfParams,
) -> Result<EncryptedKeyBlob> {
    let payload = open(blob, &old_password)?;
    drop(old_password);
    let mut id = [0u8; ID_LEN];
    id.copy_from_slice(&payload[..ID_LEN]);
    let mut secret = Zeroizing::new([0u8; SECRET_KEY_LEN]);
    secret.copy_from_slice(&payload[SECRET_RANGE]);
    drop(payload);
    seal(&id, &secret, &new_password, params)
}

fn checksum(id: &[u8], secret_key: &[u8]) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(id);
    hasher.update(secret_key);
    let sum = hasher.finalize();
    hasher.zeroize();
    sum
}

fn seal(
    id: &[u8; ID_LEN],
    secret_key: &[u8; SECRET_KEY_LEN],
    password: &Password,
    params: KdfParams,
) -> Result<EncryptedKeyBlob> {
    let salt = crypto::random_bytes::<SALT_LEN>();
    let sum = checksum(id, secret_key);

    let mut payload = Zeroizing::new(Vec::with_capacity(PAYLOAD_LEN));
    payload.extend_from_slice(id);
    payload.extend_from_slice(secret_key);
    payload.extend_from_slice(sum.as_bytes());

    let mut keystream = Zeroizing::new([0u8; PAYLOAD_LEN]);
    derive_keystream(password.as_bytes(), &salt, &params, &mut keystream[..])?;
    xor_in_place(&mut payload, &keystream[..])?;

    Ok(EncryptedKeyBlob {
        params,
        salt,
        payload: std::mem::take(&mut *payload),
    })
}

/// Recover `id || secretKey || checkSum` and verify the checksum. Every
/// buffer holding plaintext is `Zeroizing`, so early returns wipe too.
fn open(blob: &EncryptedKeyBlob, password: &Password) -> Result<Zeroizing<Vec<u8>>> {
    if blob.payload.len() != PAYLOAD_LEN {
        return Err(AttestError::KeyDecryptionFailed);
    }
    let mut keystream = Zeroizing::new([0u8; PAYLOAD_LEN]);
    derive_keystream(password.as_bytes(), &blob.salt, &blob.params, &mut keystream[..])?;

    let mut payload = Zeroizing::new(blob.payload.clone());
    xor_in_place(&mut payload, &keystream[..])?;
    drop(keystream);

    let mut stored = [0u8; CHECKSUM_LEN];
    stored.copy_from_slice(&payload[CHECKSUM_RANGE]);
    let computed = checksum(&payload[..ID_LEN], &payload[SECRET_RANGE]);
    if computed != blake3::Hash::from(stored) {
        debug!("vault checksum mismatch");
        return Err(AttestError::KeyDecryptionFailed);
    }
    Ok(payload)
}

/// A decrypted secret key that can only be used to sign.
pub struct UnlockedKey {
    secret: Zeroizing<[u8; SECRET_KEY_LEN]>,
}

impl UnlockedKey {
    pub fn public_key(&self) -> PublicKey {
        crypto::public_key_of(&self.secret)
    }

    /// One signature per message, in order. Consumes the key.
    pub fn sign<I, M>(self, messages: I) -> Result<Vec<SignatureBytes>>
    where
        I: IntoIterator<Item = M>,
        M: AsRef<[u8]>,
    {
        let key = crypto::signing_key(&self.secret)
            .map_err(|_| AttestError::KeyDecryptionFailed)?;
        let signatures = messages
            .into_iter()
            .map(|m| crypto::sign_detached(&key, m.as_ref()))
            .collect();
        Ok(signatures)
    }
}

impl fmt::Debug for UnlockedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnlockedKey")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{AttestError, Result};

pub const MIN_PASSWORD_LEN: usize = 8;

/// Operator password. Owned, passed explicitly into vault calls, and wiped
/// when dropped.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Password(Vec<u8>);

impl Password {
    /// Length policy is checked here so a short password never reaches the
    /// KDF. The rejected buffer is still wiped on the way out.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let password = Self(bytes.into());
        if password.0.len() < MIN_PASSWORD_LEN {
            return Err(AttestError::PasswordTooShort {
                min: MIN_PASSWORD_LEN,
            });
        }
        Ok(password)
    }

    pub fn from_string(s: String) -> Result<Self> {
        Self::new(s.into_bytes())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Confirmation step for new keys. Compared without early exit.
    pub fn confirm(&self, again: &Password) -> Result<()> {
        if self.0.len() != again.0.len() {
            return Err(AttestError::PasswordMismatch);
        }
        let diff = self
            .0
            .iter()
            .zip(again.0.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b));
        if diff != 0 {
            return Err(AttestError::PasswordMismatch);
        }
        Ok(())
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(<redacted>)")
    }
}

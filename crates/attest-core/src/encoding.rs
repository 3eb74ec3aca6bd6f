//! Compact binary encoding.
//!
//! Every wire structure in this crate (vault files, responses, log requests)
//! is built from the same handful of field shapes:
//!
//! - `uint`: variable-length unsigned integer. Values below `0xfd` take a
//!   single byte; larger values are a marker byte (`0xfd`, `0xfe`, `0xff`)
//!   followed by a little-endian `u16`, `u32` or `u64`.
//! - `uint64`: fixed 8-byte little-endian integer.
//! - `fixed`: raw bytes of a length known to both sides (no prefix).
//! - `buffer`: `uint` length prefix followed by that many bytes.
//!
//! Encoding is a two-pass affair: `preencode` sizes the output exactly, then
//! `encode` writes into a buffer allocated once with that capacity.

use crate::error::{AttestError, Result};

const UINT16_MARKER: u8 = 0xfd;
const UINT32_MARKER: u8 = 0xfe;
const UINT64_MARKER: u8 = 0xff;

/// A type with a fixed, deterministic compact encoding.
pub trait CompactEncoding: Sized {
    /// Exact number of bytes `encode` will write.
    fn preencode(&self) -> usize;

    fn encode(&self, writer: &mut Writer);

    fn decode(reader: &mut Reader<'_>) -> Result<Self>;

    fn to_bytes(&self) -> Vec<u8> {
        let mut writer = Writer::with_capacity(self.preencode());
        self.encode(&mut writer);
        writer.into_inner()
    }

    /// Decode a complete buffer. Trailing bytes are an error.
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        let value = Self::decode(&mut reader)?;
        reader.finish()?;
        Ok(value)
    }
}

/// Encoded size of `value` as a `uint`.
pub fn uint_len(value: u64) -> usize {
    if value < UINT16_MARKER as u64 {
        1
    } else if value <= u16::MAX as u64 {
        3
    } else if value <= u32::MAX as u64 {
        5
    } else {
        9
    }
}

/// Encoded size of a `buffer` field holding `len` bytes.
pub fn buffer_len(len: usize) -> usize {
    uint_len(len as u64) + len
}

#[derive(Debug, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn uint(&mut self, value: u64) {
        if value < UINT16_MARKER as u64 {
            self.buf.push(value as u8);
        } else if value <= u16::MAX as u64 {
            self.buf.push(UINT16_MARKER);
            self.buf.extend_from_slice(&(value as u16).to_le_bytes());
        } else if value <= u32::MAX as u64 {
            self.buf.push(UINT32_MARKER);
            self.buf.extend_from_slice(&(value as u32).to_le_bytes());
        } else {
            self.buf.push(UINT64_MARKER);
            self.buf.extend_from_slice(&value.to_le_bytes());
        }
    }

    pub fn uint64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn fixed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn buffer(&mut self, bytes: &[u8]) {
        self.uint(bytes.len() as u64);
        self.buf.extend_from_slice(bytes);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over an encoded buffer. Every read is bounds-checked; a short
/// buffer yields `AttestError::Decode`, never a panic.
#[derive(Debug)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(AttestError::Decode(format!(
                "truncated input: {what} needs {len} bytes, {} left",
                self.remaining()
            )));
        }
        let out = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    pub fn uint(&mut self) -> Result<u64> {
        let marker = self.take(1, "uint")?[0];
        let (value, min) = match marker {
            UINT16_MARKER => {
                let b = self.take(2, "uint16")?;
                (u16::from_le_bytes([b[0], b[1]]) as u64, UINT16_MARKER as u64)
            }
            UINT32_MARKER => {
                let b = self.take(4, "uint32")?;
                (
                    u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as u64,
                    u16::MAX as u64 + 1,
                )
            }
            UINT64_MARKER => (self.uint64()?, u32::MAX as u64 + 1),
            small => return Ok(small as u64),
        };
        if value < min {
            return Err(AttestError::Decode(format!(
                "non-canonical uint encoding for {value}"
            )));
        }
        Ok(value)
    }

    pub fn uint64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.fixed::<8>()?))
    }

    pub fn fixed<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self.take(N, "fixed field")?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub fn buffer(&mut self) -> Result<&'a [u8]> {
        let len = self.uint()?;
        let len = usize::try_from(len)
            .map_err(|_| AttestError::Decode(format!("buffer length {len} too large")))?;
        self.take(len, "buffer")
    }

    /// Read an array length and check it against the bytes left, assuming
    /// each element takes at least `min_element_len` bytes.
    pub fn array_len(&mut self, min_element_len: usize) -> Result<usize> {
        let count = self.uint()?;
        let fits = usize::try_from(count)
            .ok()
            .and_then(|c| c.checked_mul(min_element_len))
            .map(|needed| needed <= self.remaining())
            .unwrap_or(false);
        if !fits {
            return Err(AttestError::Decode(format!(
                "array of {count} elements exceeds remaining input"
            )));
        }
        Ok(count as usize)
    }

    pub fn finish(&self) -> Result<()> {
        if self.remaining() != 0 {
            return Err(AttestError::Decode(format!(
                "{} trailing bytes",
                self.remaining()
            )));
        }
        Ok(())
    }
}

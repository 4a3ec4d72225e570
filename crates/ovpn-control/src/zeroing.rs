//! Zeroing Buffers
//!
//! Byte buffers for secret material (pre-master secret, randoms,
//! credentials, decrypted control data). Every buffer is wiped when
//! zeroed explicitly and again when dropped.
//!
//! Growth never leaves a stale copy behind: when the backing storage
//! must be reallocated, the old allocation is wiped before release.

use rand::{CryptoRng, RngCore};
use std::fmt;
use zeroize::Zeroize;

/// Securely erasable byte buffer
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ZeroingBuffer {
    bytes: Vec<u8>,
}

impl ZeroingBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    /// Create an empty buffer with room for `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
        }
    }

    /// Create a buffer holding a copy of `bytes`
    pub fn from_slice(bytes: &[u8]) -> Self {
        let mut buf = Self::with_capacity(bytes.len());
        buf.bytes.extend_from_slice(bytes);
        buf
    }

    /// Create a buffer from a string, optionally NUL-terminated
    pub fn from_text(string: &str, null_terminated: bool) -> Self {
        let mut buf = Self::with_capacity(string.len() + usize::from(null_terminated));
        buf.bytes.extend_from_slice(string.as_bytes());
        if null_terminated {
            buf.bytes.push(0);
        }
        buf
    }

    /// Create a buffer of `length` bytes drawn from a secure PRNG
    pub fn random<R: RngCore + CryptoRng + ?Sized>(rng: &mut R, length: usize) -> Self {
        let mut bytes = vec![0u8; length];
        rng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Number of bytes held
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the buffer holds no bytes
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Borrow the raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Whether every byte is zero
    pub fn is_zeroed(&self) -> bool {
        self.bytes.iter().all(|b| *b == 0)
    }

    /// Append bytes in place
    pub fn append(&mut self, bytes: &[u8]) {
        self.reserve_wiping(bytes.len());
        self.bytes.extend_from_slice(bytes);
    }

    /// Append a 2-byte big-endian value
    pub fn append_u16(&mut self, value: u16) {
        self.append(&value.to_be_bytes());
    }

    /// Append another buffer prefixed with its 2-byte big-endian length
    ///
    /// Returns `None` (appending nothing) if `buf` exceeds 65535 bytes.
    pub fn append_sized(&mut self, buf: &ZeroingBuffer) -> Option<()> {
        let length = u16::try_from(buf.len()).ok()?;
        self.append_u16(length);
        self.append(buf.as_bytes());
        Some(())
    }

    /// Copy `length` bytes starting at `offset` into a new buffer
    ///
    /// Panics if the range runs past the end of the buffer.
    pub fn with_offset(&self, offset: usize, length: usize) -> ZeroingBuffer {
        Self::from_slice(self.slice(offset, length))
    }

    /// Borrow `length` bytes starting at `offset`
    ///
    /// Panics if the range runs past the end of the buffer.
    pub fn slice(&self, offset: usize, length: usize) -> &[u8] {
        &self.bytes[offset..offset + length]
    }

    /// Overwrite every byte with zero, keeping the length
    pub fn zero(&mut self) {
        self.bytes.as_mut_slice().zeroize();
    }

    /// Wipe the contents and drop to zero length
    pub fn clear(&mut self) {
        self.bytes.zeroize();
    }

    /// Discard the first `offset` bytes, shifting the rest to index 0
    ///
    /// The vacated tail is wiped before truncation.
    pub fn remove_until(&mut self, offset: usize) {
        assert!(offset <= self.bytes.len(), "remove_until past end of buffer");
        let remaining = self.bytes.len() - offset;
        self.bytes.copy_within(offset.., 0);
        self.bytes[remaining..].zeroize();
        self.bytes.truncate(remaining);
    }

    /// Read the string starting at `offset` up to (not including) a NUL
    ///
    /// Returns `None` if no NUL follows `offset`.
    pub fn null_terminated_string(&self, offset: usize) -> Option<String> {
        self.null_terminated_bytes(offset)
            .map(|raw| String::from_utf8_lossy(raw).into_owned())
    }

    /// Borrow the bytes starting at `offset` up to (not including) a NUL
    pub(crate) fn null_terminated_bytes(&self, offset: usize) -> Option<&[u8]> {
        let tail = self.bytes.get(offset..)?;
        let end = tail.iter().position(|b| *b == 0)?;
        Some(&tail[..end])
    }

    /// Read a 2-byte big-endian value at `offset`
    ///
    /// Panics if fewer than 2 bytes follow `offset`.
    pub fn network_u16_value(&self, offset: usize) -> u16 {
        u16::from_be_bytes([self.bytes[offset], self.bytes[offset + 1]])
    }

    /// Compare contents against raw bytes
    pub fn eq_bytes(&self, other: &[u8]) -> bool {
        self.bytes == other
    }

    /// Lowercase hex rendering of the contents
    ///
    /// This exposes the secret; use only where clear output is intended.
    pub fn to_hex(&self) -> String {
        to_hex(&self.bytes)
    }

    fn reserve_wiping(&mut self, additional: usize) {
        let needed = self.bytes.len() + additional;
        if needed <= self.bytes.capacity() {
            return;
        }
        let capacity = needed.max(self.bytes.capacity() * 2);
        let mut grown = Vec::with_capacity(capacity);
        grown.extend_from_slice(&self.bytes);
        let mut old = std::mem::replace(&mut self.bytes, grown);
        old.zeroize();
    }
}

impl Drop for ZeroingBuffer {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl fmt::Debug for ZeroingBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ZeroingBuffer([{} bytes redacted])", self.bytes.len())
    }
}

impl From<&[u8]> for ZeroingBuffer {
    fn from(bytes: &[u8]) -> Self {
        Self::from_slice(bytes)
    }
}

/// Lowercase hex rendering
pub(crate) fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

//! Reversible whole-packet byte transforms.
//!
//! A transform is the hook point for ciphers and similar byte-level
//! processing. The encode-side hook runs on the entire framed packet
//! (header included) after framing; the decode-side hook runs on the raw
//! bytes before header interpretation. Paired hooks must be mutually
//! inverse and length-preserving, which is what lets the reassembler peek
//! a header from a transformed prefix.

use crate::error::Result;

/// In-place, length-preserving byte transform.
pub trait Transform: Send + Sync {
    /// Apply the transform to `data`.
    fn apply(&self, data: &mut [u8]) -> Result<()>;
}

/// XOR cipher with a cyclic key. Self-inverse, so the same instance serves
/// as both the encode and decode hook.
pub struct XorTransform {
    key: Vec<u8>,
}

impl XorTransform {
    /// Create a transform with the given key.
    ///
    /// # Panics
    ///
    /// Panics if the key is empty.
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        let key = key.into();
        assert!(!key.is_empty(), "XOR key must not be empty");
        Self { key }
    }
}

impl Transform for XorTransform {
    fn apply(&self, data: &mut [u8]) -> Result<()> {
        for (i, byte) in data.iter_mut().enumerate() {
            *byte ^= self.key[i % self.key.len()];
        }
        Ok(())
    }
}

//! Data Encryption Keys: generation, the in-memory key type, and the
//! per-process cache of unwrapped keys.
//!
//! # Security invariants
//!
//! - A plaintext DEK is **never** persisted, logged, or attached to a span.
//! - [`Dek`] zeroes its bytes on drop. Clones are independent buffers that are
//!   zeroed independently.
//! - Cached keys are scoped to one organisation and one wrapped blob; see
//!   [`cache::DekCache`].

pub mod cache;
pub mod sweeper;

pub use cache::DekCache;
pub use sweeper::CacheSweeper;

use aes_gcm::aead::{rand_core::RngCore, OsRng};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::KEY_LEN;

/// Errors produced by the DEK layer.
#[derive(Debug, Error)]
pub enum DekError {
    /// Unwrapped key material has an unexpected length.
    #[error("DEK has invalid length: expected {KEY_LEN} bytes, got {0}")]
    InvalidLength(usize),
}

/// A plaintext 256-bit Data Encryption Key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Dek([u8; KEY_LEN]);

impl Dek {
    /// Copy `bytes` into a new key.
    ///
    /// # Errors
    ///
    /// Returns [`DekError::InvalidLength`] unless `bytes` is exactly [`KEY_LEN`] long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, DekError> {
        if bytes.len() != KEY_LEN {
            return Err(DekError::InvalidLength(bytes.len()));
        }
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(bytes);
        Ok(Self(key))
    }

    /// Borrow the raw key bytes. Do not copy them anywhere long-lived.
    #[inline]
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for Dek {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Dek([REDACTED])")
    }
}

/// Generate a fresh random DEK from the OS CSPRNG.
///
/// Called once per organisation at provisioning time, and again on rotation.
pub fn generate_dek() -> Dek {
    let mut key = [0u8; KEY_LEN];
    OsRng.fill_bytes(&mut key);
    Dek(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_are_full_length_and_distinct() {
        let a = generate_dek();
        let b = generate_dek();
        assert_eq!(a.as_bytes().len(), KEY_LEN);
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn from_slice_rejects_wrong_length() {
        assert!(matches!(
            Dek::from_slice(&[0u8; 31]),
            Err(DekError::InvalidLength(31))
        ));
        assert!(Dek::from_slice(&[7u8; KEY_LEN]).is_ok());
    }

    #[test]
    fn debug_is_redacted() {
        let dek = Dek::from_slice(&[0xAB; KEY_LEN]).unwrap();
        let rendered = format!("{dek:?}");
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains("171"));
    }
}

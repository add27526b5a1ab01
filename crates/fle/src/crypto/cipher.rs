//! AES-256-GCM encryption and decryption with detached tags.
//!
//! **Every call to [`encrypt`] draws a fresh 96-bit IV from the OS CSPRNG.**
//! GCM nonce reuse under one key is catastrophic: it breaks both
//! confidentiality and authentication. Never accept an IV from a caller.

use aes_gcm::{
    aead::{generic_array::GenericArray, rand_core::RngCore, AeadInPlace, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use thiserror::Error;

/// Byte length of an AES-256 key (32 bytes = 256 bits).
pub const KEY_LEN: usize = 32;

/// Byte length of an AES-GCM IV (12 bytes = 96 bits).
pub const IV_LEN: usize = 12;

/// Byte length of an AES-GCM authentication tag.
pub const TAG_LEN: usize = 16;

/// Output of one AEAD seal: IV, detached tag, and ciphertext.
///
/// Not persisted directly; pass it through [`super::pack_encrypted_blob`] or
/// [`super::Envelope`] before storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionResult {
    /// Random per-call nonce.
    pub iv: [u8; IV_LEN],
    /// GCM authentication tag.
    pub auth_tag: [u8; TAG_LEN],
    /// Ciphertext, same length as the plaintext.
    pub ciphertext: Vec<u8>,
}

/// Errors produced by the cipher layer.
#[derive(Debug, Error)]
pub enum CipherError {
    /// The key is the wrong length (must be [`KEY_LEN`] bytes).
    #[error("invalid key length: expected {expected} bytes, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    /// Tag verification failed: wrong key, wrong associated data, or tampered input.
    #[error("decryption failed: authentication tag mismatch")]
    Authentication,

    /// AES-GCM sealing failed. Unreachable with a valid key and a plaintext
    /// under the GCM length limit.
    #[error("aead seal failed")]
    Encryption,
}

/// Encrypt `plaintext` under `key`, binding `aad` as associated data.
///
/// `None` and `Some(&[])` are equivalent.
///
/// # Errors
///
/// Returns [`CipherError::InvalidKeyLength`] if `key` is not [`KEY_LEN`] bytes.
pub fn encrypt(
    plaintext: &[u8],
    key: &[u8],
    aad: Option<&[u8]>,
) -> Result<EncryptionResult, CipherError> {
    let cipher = build_cipher(key)?;

    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);

    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(&iv), aad.unwrap_or_default(), &mut buffer)
        .map_err(|_| CipherError::Encryption)?;

    let mut auth_tag = [0u8; TAG_LEN];
    auth_tag.copy_from_slice(tag.as_slice());

    Ok(EncryptionResult {
        iv,
        auth_tag,
        ciphertext: buffer,
    })
}

/// Authenticate and decrypt `enc` under `key`.
///
/// `aad` must be byte-identical to the value given to [`encrypt`].
///
/// # Errors
///
/// Returns [`CipherError::InvalidKeyLength`] if `key` is not [`KEY_LEN`] bytes.
/// Returns [`CipherError::Authentication`] if the tag does not verify.
pub fn decrypt(
    enc: &EncryptionResult,
    key: &[u8],
    aad: Option<&[u8]>,
) -> Result<Vec<u8>, CipherError> {
    let cipher = build_cipher(key)?;

    let mut buffer = enc.ciphertext.clone();
    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(&enc.iv),
            aad.unwrap_or_default(),
            &mut buffer,
            GenericArray::from_slice(&enc.auth_tag),
        )
        .map_err(|_| CipherError::Authentication)?;
    Ok(buffer)
}

fn build_cipher(key: &[u8]) -> Result<Aes256Gcm, CipherError> {
    if key.len() != KEY_LEN {
        return Err(CipherError::InvalidKeyLength {
            expected: KEY_LEN,
            got: key.len(),
        });
    }
    Aes256Gcm::new_from_slice(key).map_err(|_| CipherError::InvalidKeyLength {
        expected: KEY_LEN,
        got: key.len(),
    })
}

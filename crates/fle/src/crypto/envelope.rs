//! Versioned binary envelope for [`EncryptionResult`]s.
//!
//! The first byte selects the layout. Readers reject unknown versions rather
//! than guessing, so a stored blob always maps to exactly one result.
//!
//! ```text
//! v1: [0x01][iv:12][tag:16][ciphertext:N]
//! v2: [0x02][generation:u32 BE][iv:12][tag:16][ciphertext:N]
//! ```

use thiserror::Error;

use super::cipher::{EncryptionResult, IV_LEN, TAG_LEN};

/// Version byte of the original layout.
pub const VERSION_1: u8 = 1;

/// Version byte of the generation-tagged layout.
pub const VERSION_2: u8 = 2;

const GENERATION_LEN: usize = 4;

/// Smallest valid v1 blob (empty ciphertext).
pub const V1_MIN_LEN: usize = 1 + IV_LEN + TAG_LEN;

/// Smallest valid v2 blob (empty ciphertext).
pub const V2_MIN_LEN: usize = 1 + GENERATION_LEN + IV_LEN + TAG_LEN;

/// Errors produced while decoding a blob.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    /// Zero-length input.
    #[error("encrypted blob is empty")]
    Empty,

    /// The blob is shorter than its header.
    #[error("encrypted blob too short: {len} bytes, need at least {min}")]
    TooShort { len: usize, min: usize },

    /// The version byte is not one this build can read.
    #[error("unsupported encrypted blob version: {0}")]
    UnsupportedVersion(u8),

    /// A v2 blob names generation 0, which is never issued.
    #[error("encrypted blob names invalid DEK generation 0")]
    InvalidGeneration,
}

/// A decoded blob, keyed by its version byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    /// Sealed under the organisation's first DEK.
    V1(EncryptionResult),
    /// Sealed under the named DEK generation.
    V2 {
        generation: u32,
        sealed: EncryptionResult,
    },
}

impl Envelope {
    /// Wrap `sealed` in the layout appropriate for `generation`.
    ///
    /// Generation 1 keeps the v1 layout so blobs written before any rotation
    /// and blobs written by an unrotated org are indistinguishable.
    ///
    /// # Errors
    ///
    /// [`FormatError::InvalidGeneration`] for generation 0, which no blob can
    /// name.
    pub fn for_generation(generation: u32, sealed: EncryptionResult) -> Result<Self, FormatError> {
        match generation {
            0 => Err(FormatError::InvalidGeneration),
            1 => Ok(Envelope::V1(sealed)),
            _ => Ok(Envelope::V2 { generation, sealed }),
        }
    }

    /// DEK generation this blob was sealed under.
    pub fn generation(&self) -> u32 {
        match self {
            Envelope::V1(_) => 1,
            Envelope::V2 { generation, .. } => *generation,
        }
    }

    /// Borrow the sealed payload.
    pub fn sealed(&self) -> &EncryptionResult {
        match self {
            Envelope::V1(sealed) | Envelope::V2 { sealed, .. } => sealed,
        }
    }

    /// Consume the envelope, returning the sealed payload.
    pub fn into_sealed(self) -> EncryptionResult {
        match self {
            Envelope::V1(sealed) | Envelope::V2 { sealed, .. } => sealed,
        }
    }

    /// Serialise to bytes.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Envelope::V1(sealed) => pack_encrypted_blob(sealed),
            Envelope::V2 { generation, sealed } => {
                let mut out = Vec::with_capacity(V2_MIN_LEN + sealed.ciphertext.len());
                out.push(VERSION_2);
                out.extend_from_slice(&generation.to_be_bytes());
                write_sealed(&mut out, sealed);
                out
            }
        }
    }

    /// Parse any supported version.
    ///
    /// # Errors
    ///
    /// Returns a [`FormatError`] for empty, truncated, or unknown-version input.
    pub fn decode(blob: &[u8]) -> Result<Self, FormatError> {
        match blob.first() {
            None => Err(FormatError::Empty),
            Some(&VERSION_1) => unpack_encrypted_blob(blob).map(Envelope::V1),
            Some(&VERSION_2) => {
                ensure_len(blob, V2_MIN_LEN)?;
                let mut generation = [0u8; GENERATION_LEN];
                generation.copy_from_slice(&blob[1..1 + GENERATION_LEN]);
                let generation = u32::from_be_bytes(generation);
                if generation == 0 {
                    return Err(FormatError::InvalidGeneration);
                }
                Ok(Envelope::V2 {
                    generation,
                    sealed: read_sealed(&blob[1 + GENERATION_LEN..]),
                })
            }
            Some(&other) => Err(FormatError::UnsupportedVersion(other)),
        }
    }
}

/// Serialise `enc` as a v1 blob: `[0x01] || iv || tag || ciphertext`.
pub fn pack_encrypted_blob(enc: &EncryptionResult) -> Vec<u8> {
    let mut out = Vec::with_capacity(V1_MIN_LEN + enc.ciphertext.len());
    out.push(VERSION_1);
    write_sealed(&mut out, enc);
    out
}

/// Parse a v1 blob.
///
/// # Errors
///
/// Returns [`FormatError::TooShort`] below 29 bytes and
/// [`FormatError::UnsupportedVersion`] for any version byte other than 1.
pub fn unpack_encrypted_blob(blob: &[u8]) -> Result<EncryptionResult, FormatError> {
    ensure_len(blob, V1_MIN_LEN)?;
    if blob[0] != VERSION_1 {
        return Err(FormatError::UnsupportedVersion(blob[0]));
    }
    Ok(read_sealed(&blob[1..]))
}

fn ensure_len(blob: &[u8], min: usize) -> Result<(), FormatError> {
    if blob.len() < min {
        return Err(FormatError::TooShort {
            len: blob.len(),
            min,
        });
    }
    Ok(())
}

fn write_sealed(out: &mut Vec<u8>, enc: &EncryptionResult) {
    out.extend_from_slice(&enc.iv);
    out.extend_from_slice(&enc.auth_tag);
    out.extend_from_slice(&enc.ciphertext);
}

// Caller guarantees `body.len() >= IV_LEN + TAG_LEN`.
fn read_sealed(body: &[u8]) -> EncryptionResult {
    let mut iv = [0u8; IV_LEN];
    iv.copy_from_slice(&body[..IV_LEN]);
    let mut auth_tag = [0u8; TAG_LEN];
    auth_tag.copy_from_slice(&body[IV_LEN..IV_LEN + TAG_LEN]);
    EncryptionResult {
        iv,
        auth_tag,
        ciphertext: body[IV_LEN + TAG_LEN..].to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ciphertext: &[u8]) -> EncryptionResult {
        EncryptionResult {
            iv: [0x11; IV_LEN],
            auth_tag: [0x22; TAG_LEN],
            ciphertext: ciphertext.to_vec(),
        }
    }

    #[test]
    fn pack_layout_is_fixed() {
        let blob = pack_encrypted_blob(&sample(b"abc"));
        assert_eq!(blob.len(), 32);
        assert_eq!(blob[0], 1);
        assert_eq!(&blob[1..13], &[0x11; 12]);
        assert_eq!(&blob[13..29], &[0x22; 16]);
        assert_eq!(&blob[29..], b"abc");
    }

    #[test]
    fn unpack_reverses_pack() {
        let enc = sample(b"ciphertext bytes");
        assert_eq!(unpack_encrypted_blob(&pack_encrypted_blob(&enc)).unwrap(), enc);
    }

    #[test]
    fn unpack_accepts_header_only_blob() {
        let enc = sample(b"");
        let blob = pack_encrypted_blob(&enc);
        assert_eq!(blob.len(), V1_MIN_LEN);
        assert_eq!(unpack_encrypted_blob(&blob).unwrap(), enc);
    }

    #[test]
    fn unpack_rejects_short_blobs() {
        for len in 0..V1_MIN_LEN {
            let mut blob = vec![0u8; len];
            if let Some(b) = blob.first_mut() {
                *b = VERSION_1;
            }
            assert_eq!(
                unpack_encrypted_blob(&blob),
                Err(FormatError::TooShort { len, min: 29 })
            );
        }
    }

    #[test]
    fn unpack_rejects_other_versions() {
        for version in [0u8, 2, 3, 0xFF] {
            let mut blob = pack_encrypted_blob(&sample(b"x"));
            blob[0] = version;
            assert_eq!(
                unpack_encrypted_blob(&blob),
                Err(FormatError::UnsupportedVersion(version))
            );
        }
    }

    #[test]
    fn generation_one_uses_v1_layout() {
        let env = Envelope::for_generation(1, sample(b"x")).unwrap();
        assert!(matches!(env, Envelope::V1(_)));
        assert_eq!(env.encode(), pack_encrypted_blob(&sample(b"x")));
    }

    #[test]
    fn generation_zero_cannot_be_encoded() {
        assert_eq!(
            Envelope::for_generation(0, sample(b"x")),
            Err(FormatError::InvalidGeneration)
        );
    }

    #[test]
    fn v2_carries_generation() {
        let env = Envelope::for_generation(7, sample(b"payload")).unwrap();
        let blob = env.encode();
        assert_eq!(blob[0], VERSION_2);
        assert_eq!(&blob[1..5], &7u32.to_be_bytes());
        assert_eq!(blob.len(), V2_MIN_LEN + 7);

        let decoded = Envelope::decode(&blob).unwrap();
        assert_eq!(decoded.generation(), 7);
        assert_eq!(decoded, env);
    }

    #[test]
    fn v1_readers_reject_v2_blobs() {
        let blob = Envelope::for_generation(2, sample(b"x")).unwrap().encode();
        assert_eq!(
            unpack_encrypted_blob(&blob),
            Err(FormatError::UnsupportedVersion(2))
        );
    }

    #[test]
    fn decode_rejects_malformed_input() {
        assert_eq!(Envelope::decode(&[]), Err(FormatError::Empty));
        assert_eq!(
            Envelope::decode(&[VERSION_2, 0, 0, 0, 2]),
            Err(FormatError::TooShort { len: 5, min: 33 })
        );
        assert_eq!(
            Envelope::decode(&[9u8; 40]),
            Err(FormatError::UnsupportedVersion(9))
        );

        let mut zero_gen = Envelope::for_generation(3, sample(b"x")).unwrap().encode();
        zero_gen[1..5].copy_from_slice(&0u32.to_be_bytes());
        assert_eq!(Envelope::decode(&zero_gen), Err(FormatError::InvalidGeneration));
    }
}

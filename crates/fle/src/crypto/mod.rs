//! AES-256-GCM field encryption primitives and the versioned blob format.
//!
//! This module is intentionally free of KMS and storage dependencies. It
//! provides the low-level seal/open operations used by both the DEK-wrapping
//! layer ([`crate::kms::LocalKms`]) and the per-org field layer.
//!
//! # Blob format
//!
//! ```text
//! byte 0       : version (1)
//! bytes 1..13  : IV (12 bytes)
//! bytes 13..29 : authentication tag (16 bytes)
//! bytes 29..   : ciphertext (same length as plaintext)
//! ```
//!
//! Version 2 inserts a big-endian `u32` DEK generation after the version byte.
//! See [`envelope`].

pub mod cipher;
pub mod envelope;

pub use cipher::{decrypt, encrypt, CipherError, EncryptionResult, IV_LEN, KEY_LEN, TAG_LEN};
pub use envelope::{pack_encrypted_blob, unpack_encrypted_blob, Envelope, FormatError};

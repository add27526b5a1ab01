//! Per-organisation field-level encryption.
//!
//! Tenant PII is sealed with AES-256-GCM under a per-organisation Data
//! Encryption Key (DEK). Each DEK is itself wrapped by a master key held in a
//! KMS, so the master key never touches field data.
//!
//! ```text
//! master key (KMS) ──wraps──► org DEK ──seals──► field ciphertext
//!                                             (context string as AAD)
//! ```
//!
//! # Layers
//!
//! - [`crypto`] — AES-256-GCM seal/open and the versioned blob format.
//! - [`kms`] — master-key backends and the configuration-driven factory.
//! - [`dek`] — DEK generation and the per-process unwrapped-key cache.
//! - [`org`] — the organisation-facing API: `encrypt_for_org`,
//!   `decrypt_for_org`, rotation, and per-field degradation helpers.
//!
//! Every layer reports failures; none of them substitutes a default.

pub mod config;
pub mod crypto;
pub mod dek;
pub mod error;
pub mod kms;
pub mod org;

pub use crate::config::KmsConfig;
pub use crypto::{
    pack_encrypted_blob, unpack_encrypted_blob, CipherError, EncryptionResult, Envelope,
    FormatError,
};
pub use dek::{generate_dek, CacheSweeper, Dek, DekCache};
pub use error::ErrorClass;
pub use kms::{create_kms_client, KmsBackendKind, KmsClient, KmsError};
pub use org::{KeyError, MemoryKeyStore, OrgKeyManager, OrgKeyRecord, OrgKeyStore, WrappedDek};

//! Organisation data keys: provisioning, field encryption under the org DEK,
//! rotation, and caller-side degradation.
//!
//! # Flow
//!
//! 1. [`OrgKeyManager::provision_org`] generates a DEK, wraps it through the
//!    [`KmsClient`](crate::kms::KmsClient), and stores generation 1.
//! 2. [`OrgKeyManager::encrypt_for_org`] loads the record, unwraps the active
//!    DEK (via the [`DekCache`](crate::dek::DekCache)), seals the value with
//!    the field context as associated data, and returns a storable blob.
//! 3. [`OrgKeyManager::decrypt_for_org`] reverses this using the generation
//!    named in the blob.
//!
//! The manager never swallows an error. Degrading a single unreadable field
//! to a placeholder is the caller's decision; see [`degrade`].

pub mod degrade;
mod manager;
mod record;
mod store;

pub use manager::OrgKeyManager;
pub use record::{OrgKeyRecord, WrappedDek};
pub use store::{MemoryKeyStore, OrgKeyStore, StoreError};

use thiserror::Error;

use crate::crypto::{CipherError, FormatError};
use crate::dek::DekError;
use crate::error::ErrorClass;
use crate::kms::KmsError;

/// Errors produced by [`OrgKeyManager`].
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("organisation {0} has no data key")]
    OrgNotFound(String),

    #[error("organisation {0} already has a data key")]
    AlreadyProvisioned(String),

    #[error("organisation {org_id} has no DEK generation {generation}")]
    UnknownGeneration { org_id: String, generation: u32 },

    #[error("generation {generation} is active for organisation {org_id} and cannot be retired")]
    ActiveGeneration { org_id: String, generation: u32 },

    #[error("organisation {0} has used every DEK generation number")]
    GenerationsExhausted(String),

    #[error("decrypted field is not valid UTF-8")]
    InvalidUtf8,

    #[error(transparent)]
    Kms(#[from] KmsError),

    #[error(transparent)]
    Cipher(#[from] CipherError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Dek(#[from] DekError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl KeyError {
    /// Which failure class this error belongs to.
    pub fn class(&self) -> ErrorClass {
        match self {
            KeyError::OrgNotFound(_) | KeyError::UnknownGeneration { .. } => ErrorClass::NotFound,
            KeyError::AlreadyProvisioned(_)
            | KeyError::ActiveGeneration { .. }
            | KeyError::GenerationsExhausted(_) => ErrorClass::Configuration,
            KeyError::InvalidUtf8 | KeyError::Format(_) => ErrorClass::Format,
            KeyError::Cipher(CipherError::Authentication) => ErrorClass::Authentication,
            KeyError::Cipher(_) | KeyError::Dek(_) => ErrorClass::Configuration,
            KeyError::Store(_) => ErrorClass::Storage,
            KeyError::Kms(e) => match e {
                KmsError::Cipher(CipherError::Authentication) => ErrorClass::Authentication,
                KmsError::Format(_) => ErrorClass::Format,
                KmsError::Transport { .. } | KmsError::Timeout(_) => ErrorClass::Transport,
                KmsError::Configuration(_)
                | KmsError::Unsupported(_)
                | KmsError::InvalidMasterKey(_)
                | KmsError::Cipher(_) => ErrorClass::Configuration,
            },
        }
    }

    /// `true` for tag mismatches on the field or on the wrapped DEK.
    pub fn is_authentication_failure(&self) -> bool {
        self.class() == ErrorClass::Authentication
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kms::KmsBackendKind;
    use std::time::Duration;

    #[test]
    fn classes_follow_taxonomy() {
        assert_eq!(
            KeyError::from(CipherError::Authentication).class(),
            ErrorClass::Authentication
        );
        assert_eq!(
            KeyError::from(KmsError::Cipher(CipherError::Authentication)).class(),
            ErrorClass::Authentication
        );
        assert_eq!(
            KeyError::from(FormatError::UnsupportedVersion(9)).class(),
            ErrorClass::Format
        );
        assert_eq!(
            KeyError::from(KmsError::Timeout(Duration::from_secs(1))).class(),
            ErrorClass::Transport
        );
        assert_eq!(
            KeyError::from(KmsError::Transport {
                backend: KmsBackendKind::Gcp,
                message: "unavailable".into()
            })
            .class(),
            ErrorClass::Transport
        );
        assert_eq!(
            KeyError::from(KmsError::Configuration("unset".into())).class(),
            ErrorClass::Configuration
        );
        assert_eq!(
            KeyError::OrgNotFound("org_1".into()).class(),
            ErrorClass::NotFound
        );
    }

    #[test]
    fn display_never_mentions_plaintext_fields() {
        let e = KeyError::from(CipherError::Authentication);
        assert!(e.to_string().contains("decryption failed"));
        assert!(e.is_authentication_failure());
    }
}

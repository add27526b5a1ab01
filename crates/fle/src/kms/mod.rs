//! Master-key backends that wrap and unwrap organisation DEKs.
//!
//! # Backends
//!
//! - [`GcpKms`] — Google Cloud KMS; the master key never leaves the service.
//!   Compiled only with the `gcp-kms` feature.
//! - [`LocalKms`] — AES-256-GCM under an operator-supplied 32-byte key, using
//!   the same blob format as field ciphertexts.
//! - [`UnconfiguredKms`] — stands in when nothing usable is configured; every
//!   call fails with a descriptive [`KmsError::Configuration`].
//!
//! [`create_kms_client`] picks one from configuration and wraps it in
//! [`TimeoutKms`]. No backend retries; a failed call surfaces to the caller.

mod factory;
#[cfg(feature = "gcp-kms")]
mod gcp;
mod local;
mod timeout;
mod unconfigured;

pub use factory::{create_kms_client, is_gcp_key_name, select_backend, KmsBackend, KmsProvider};
#[cfg(feature = "gcp-kms")]
pub use gcp::GcpKms;
pub use local::LocalKms;
pub use timeout::TimeoutKms;
pub use unconfigured::UnconfiguredKms;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::crypto::{CipherError, FormatError};

/// Which backend a [`KmsClient`] talks to. Safe to log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KmsBackendKind {
    Gcp,
    Local,
    Unconfigured,
}

impl KmsBackendKind {
    /// Short lowercase label for logs and health output.
    pub fn as_str(&self) -> &'static str {
        match self {
            KmsBackendKind::Gcp => "gcp",
            KmsBackendKind::Local => "local",
            KmsBackendKind::Unconfigured => "unconfigured",
        }
    }
}

impl std::fmt::Display for KmsBackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by KMS backends and the backend factory.
#[derive(Debug, Error)]
pub enum KmsError {
    /// No usable backend is configured, or a backend could not be built.
    #[error("KMS configuration error: {0}")]
    Configuration(String),

    /// The requested provider is recognised but not implemented.
    #[error("unsupported KMS provider: {0}")]
    Unsupported(String),

    /// The local master key is not 32 bytes of valid base64.
    #[error("invalid local master key: {0}")]
    InvalidMasterKey(String),

    /// A locally wrapped DEK failed to authenticate.
    #[error(transparent)]
    Cipher(#[from] CipherError),

    /// A locally wrapped DEK blob is malformed.
    #[error(transparent)]
    Format(#[from] FormatError),

    /// The remote KMS call failed (network, permission, missing or disabled key).
    #[error("{backend} KMS request failed: {message}")]
    Transport {
        backend: KmsBackendKind,
        message: String,
    },

    /// The remote KMS did not answer within the configured deadline.
    #[error("KMS request timed out after {0:?}")]
    Timeout(Duration),
}

/// Wrap/unwrap capability for organisation DEKs.
///
/// Implementations must be safe to share across concurrent requests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KmsClient: Send + Sync {
    /// Encrypt a plaintext DEK under the master key. The returned blob is
    /// opaque to callers.
    async fn encrypt_dek(&self, plaintext: &[u8]) -> Result<Vec<u8>, KmsError>;

    /// Recover the plaintext DEK from a blob produced by [`KmsClient::encrypt_dek`].
    async fn decrypt_dek(&self, wrapped: &[u8]) -> Result<Zeroizing<Vec<u8>>, KmsError>;

    /// The backend behind this client.
    fn backend(&self) -> KmsBackendKind;
}

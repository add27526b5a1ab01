//! [`UnconfiguredKms`]: the client handed out when configuration names no
//! usable backend.

use async_trait::async_trait;
use tracing::error;
use zeroize::Zeroizing;

use super::{KmsBackendKind, KmsClient, KmsError};

/// A client whose every operation fails with [`KmsError::Configuration`].
///
/// Returning this instead of silently skipping encryption means a
/// misconfigured deployment fails on its first crypto call and never stores
/// plaintext.
#[derive(Debug, Clone)]
pub struct UnconfiguredKms {
    reason: String,
}

impl UnconfiguredKms {
    /// Create a stub that reports `reason` on every call.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// Why no backend could be selected.
    pub fn reason(&self) -> &str {
        &self.reason
    }

    fn fail(&self, op: &str) -> KmsError {
        error!(op, reason = %self.reason, "KMS is not configured");
        KmsError::Configuration(format!("cannot {op}: {}", self.reason))
    }
}

#[async_trait]
impl KmsClient for UnconfiguredKms {
    async fn encrypt_dek(&self, _plaintext: &[u8]) -> Result<Vec<u8>, KmsError> {
        Err(self.fail("wrap DEK"))
    }

    async fn decrypt_dek(&self, _wrapped: &[u8]) -> Result<Zeroizing<Vec<u8>>, KmsError> {
        Err(self.fail("unwrap DEK"))
    }

    fn backend(&self) -> KmsBackendKind {
        KmsBackendKind::Unconfigured
    }
}

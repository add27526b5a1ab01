//! [`LocalKms`]: DEK wrapping under an operator-supplied master key.
//!
//! For deployments without a cloud KMS. Wrapped DEKs use exactly the v1 blob
//! format of field ciphertexts, with no associated data.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::{KmsBackendKind, KmsClient, KmsError};
use crate::crypto::{self, KEY_LEN};

#[derive(Zeroize, ZeroizeOnDrop)]
struct MasterKey([u8; KEY_LEN]);

/// Local AES-256-GCM key wrapper.
pub struct LocalKms {
    master_key: MasterKey,
}

impl LocalKms {
    /// Build from raw key bytes.
    pub fn new(master_key: [u8; KEY_LEN]) -> Self {
        Self {
            master_key: MasterKey(master_key),
        }
    }

    /// Build from a base64-encoded 32-byte key.
    ///
    /// # Errors
    ///
    /// Returns [`KmsError::InvalidMasterKey`] if `encoded` is not valid base64
    /// or does not decode to exactly 32 bytes.
    pub fn from_base64(encoded: &str) -> Result<Self, KmsError> {
        let bytes = Zeroizing::new(
            STANDARD
                .decode(encoded.trim())
                .map_err(|e| KmsError::InvalidMasterKey(format!("not valid base64: {e}")))?,
        );
        if bytes.len() != KEY_LEN {
            return Err(KmsError::InvalidMasterKey(format!(
                "expected {KEY_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&bytes);
        let kms = Self::new(key);
        key.zeroize();
        Ok(kms)
    }
}

impl std::fmt::Debug for LocalKms {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalKms")
            .field("master_key", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
impl KmsClient for LocalKms {
    async fn encrypt_dek(&self, plaintext: &[u8]) -> Result<Vec<u8>, KmsError> {
        let sealed = crypto::encrypt(plaintext, &self.master_key.0, None)?;
        debug!(kms = "local", "wrapped DEK");
        Ok(crypto::pack_encrypted_blob(&sealed))
    }

    async fn decrypt_dek(&self, wrapped: &[u8]) -> Result<Zeroizing<Vec<u8>>, KmsError> {
        let sealed = crypto::unpack_encrypted_blob(wrapped)?;
        let plaintext = crypto::decrypt(&sealed, &self.master_key.0, None)?;
        debug!(kms = "local", "unwrapped DEK");
        Ok(Zeroizing::new(plaintext))
    }

    fn backend(&self) -> KmsBackendKind {
        KmsBackendKind::Local
    }
}

//! Caller-side policy for unreadable fields.
//!
//! One corrupt or legacy field must not fail a whole listing. These helpers
//! log the failure (org and context only, never the value) and hand back a
//! fallback so the rest of the record still renders.

use std::collections::HashSet;

use tracing::{debug, warn};

use super::{OrgKeyManager, OrgKeyStore};
use crate::crypto::Envelope;
use crate::error::ErrorClass;

/// Decrypt a field to a string, or `None` after logging why it failed.
pub async fn decrypt_lossy<S: OrgKeyStore>(
    manager: &OrgKeyManager<S>,
    org_id: &str,
    blob: &[u8],
    context: &str,
) -> Option<String> {
    match manager.decrypt_string_for_org(org_id, blob, context).await {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(
                org_id,
                context,
                class = %e.class(),
                error = %e,
                "field decryption failed; substituting fallback"
            );
            None
        }
    }
}

/// Decrypt a field to a string, substituting `fallback` on any failure.
pub async fn decrypt_or<S: OrgKeyStore>(
    manager: &OrgKeyManager<S>,
    org_id: &str,
    blob: &[u8],
    context: &str,
    fallback: &str,
) -> String {
    decrypt_lossy(manager, org_id, blob, context)
        .await
        .unwrap_or_else(|| fallback.to_owned())
}

/// Decrypt a nullable column. `None` stays `None` without logging.
pub async fn decrypt_optional<S: OrgKeyStore>(
    manager: &OrgKeyManager<S>,
    org_id: &str,
    blob: Option<&[u8]>,
    context: &str,
) -> Option<String> {
    match blob {
        Some(blob) => decrypt_lossy(manager, org_id, blob, context).await,
        None => None,
    }
}

/// Decrypts many fields of one organisation with [`decrypt_lossy`] semantics.
///
/// Once the KMS fails to unwrap a generation with a transport error or a
/// timeout, later fields sealed under that generation fall back immediately
/// instead of waiting on the KMS again. Other failures only affect their own
/// field.
pub struct LossyBatch<'a, S> {
    manager: &'a OrgKeyManager<S>,
    org_id: &'a str,
    unreachable: HashSet<u32>,
    skipped: usize,
}

impl<'a, S: OrgKeyStore> LossyBatch<'a, S> {
    pub fn new(manager: &'a OrgKeyManager<S>, org_id: &'a str) -> Self {
        Self {
            manager,
            org_id,
            unreachable: HashSet::new(),
            skipped: 0,
        }
    }

    /// Decrypt one field, or `None` after logging why it failed.
    pub async fn decrypt(&mut self, blob: &[u8], context: &str) -> Option<String> {
        let org_id = self.org_id;
        let generation = match Envelope::decode(blob) {
            Ok(envelope) => envelope.generation(),
            Err(e) => {
                warn!(org_id, context, error = %e, "field blob is malformed; substituting fallback");
                return None;
            }
        };
        if self.unreachable.contains(&generation) {
            self.skipped += 1;
            debug!(org_id, context, generation, "DEK unavailable earlier in batch; substituting fallback");
            return None;
        }

        match self.manager.decrypt_string_for_org(org_id, blob, context).await {
            Ok(value) => Some(value),
            Err(e) => {
                let class = e.class();
                if class == ErrorClass::Transport {
                    self.unreachable.insert(generation);
                }
                warn!(
                    org_id,
                    context,
                    generation,
                    class = %class,
                    error = %e,
                    "field decryption failed; substituting fallback"
                );
                None
            }
        }
    }

    /// Fields that fell back without a KMS call.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::dek::DekCache;
    use crate::kms::{KmsBackendKind, KmsError, LocalKms, MockKmsClient, UnconfiguredKms};
    use crate::org::{MemoryKeyStore, OrgKeyRecord, WrappedDek};

    async fn provisioned() -> OrgKeyManager<MemoryKeyStore> {
        let m = OrgKeyManager::new(
            MemoryKeyStore::new(),
            Arc::new(LocalKms::new([0x21; 32])),
            DekCache::default(),
        );
        m.provision_org("org_1").await.unwrap();
        m
    }

    #[tokio::test]
    async fn good_field_decrypts() {
        let m = provisioned().await;
        let blob = m.encrypt_for_org("org_1", "Sarah", "contact:name").await.unwrap();
        assert_eq!(
            decrypt_or(&m, "org_1", &blob, "contact:name", "").await,
            "Sarah"
        );
    }

    #[tokio::test]
    async fn bad_field_degrades_to_fallback() {
        let m = provisioned().await;
        let mut blob = m.encrypt_for_org("org_1", "Sarah", "contact:name").await.unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0x01;
        assert_eq!(
            decrypt_or(&m, "org_1", &blob, "contact:name", "Unknown").await,
            "Unknown"
        );
        assert!(decrypt_lossy(&m, "org_1", b"garbage", "contact:name").await.is_none());
    }

    #[tokio::test]
    async fn listing_survives_one_corrupt_record() {
        let m = provisioned().await;
        let mut rows = Vec::new();
        for name in ["Ada", "Grace", "Linus"] {
            rows.push(m.encrypt_for_org("org_1", name, "contact:name").await.unwrap());
        }
        rows[1].truncate(10);

        let mut rendered = Vec::new();
        for row in &rows {
            rendered.push(decrypt_or(&m, "org_1", row, "contact:name", "").await);
        }
        assert_eq!(rendered, vec!["Ada", "", "Linus"]);
    }

    #[tokio::test]
    async fn kms_outage_degrades_each_field() {
        let store = MemoryKeyStore::new();
        let healthy = OrgKeyManager::new(
            store.clone(),
            Arc::new(LocalKms::new([0x21; 32])),
            DekCache::disabled(),
        );
        healthy.provision_org("org_1").await.unwrap();
        let blob = healthy.encrypt_for_org("org_1", "x", "ctx").await.unwrap();

        let broken = OrgKeyManager::new(
            store,
            Arc::new(UnconfiguredKms::new("KMS_KEY_ID is not set")),
            DekCache::disabled(),
        );
        assert_eq!(decrypt_or(&broken, "org_1", &blob, "ctx", "-").await, "-");
    }

    fn sealed_under_generation_one(value: &[u8]) -> Vec<u8> {
        let sealed = crate::crypto::encrypt(value, &[0x55; 32], Some(b"ctx")).unwrap();
        crate::crypto::pack_encrypted_blob(&sealed)
    }

    #[tokio::test]
    async fn batch_stops_calling_kms_after_timeout() {
        let mut mock = MockKmsClient::new();
        mock.expect_decrypt_dek()
            .times(1)
            .returning(|_| Err(KmsError::Timeout(Duration::from_secs(5))));
        mock.expect_backend().return_const(KmsBackendKind::Gcp);

        let store = MemoryKeyStore::with_record(
            "org_1",
            OrgKeyRecord::new(WrappedDek {
                generation: 1,
                blob: vec![0u8; 64],
            }),
        );
        let m = OrgKeyManager::new(store, Arc::new(mock), DekCache::default());

        let mut batch = LossyBatch::new(&m, "org_1");
        for value in [&b"a"[..], b"b", b"c", b"d"] {
            let blob = sealed_under_generation_one(value);
            assert!(batch.decrypt(&blob, "ctx").await.is_none());
        }
        assert_eq!(batch.skipped(), 3);
    }

    #[tokio::test]
    async fn batch_keeps_going_after_field_level_failures() {
        let m = provisioned().await;
        let blob = m.encrypt_for_org("org_1", "Sarah", "contact:name").await.unwrap();

        let mut batch = LossyBatch::new(&m, "org_1");
        assert!(batch.decrypt(&blob, "contact:email").await.is_none());
        assert!(batch.decrypt(b"\x01short", "contact:name").await.is_none());
        assert_eq!(
            batch.decrypt(&blob, "contact:name").await.as_deref(),
            Some("Sarah")
        );
        assert_eq!(batch.skipped(), 0);
    }

    #[tokio::test]
    async fn null_column_stays_null() {
        let m = provisioned().await;
        assert!(decrypt_optional(&m, "org_1", None, "contact:phone").await.is_none());
    }
}

//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use fle::kms::UnconfiguredKms;
use fle::{DekCache, KmsClient, MemoryKeyStore, OrgKeyManager, OrgKeyRecord};

/// Application state shared across all request handlers.
///
/// Both fields are shared handles, so cloning per request is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Master-key client, already wrapped with the per-call timeout.
    pub kms: Arc<dyn KmsClient>,
    /// Unwrapped DEKs, shared by every request.
    pub dek_cache: DekCache,
}

impl AppState {
    pub fn new(kms: Arc<dyn KmsClient>, dek_cache: DekCache) -> Self {
        Self { kms, dek_cache }
    }

    /// A manager over a request-scoped store. `record`, when given, is the
    /// caller's copy of the org's key record.
    pub fn manager(
        &self,
        org_id: &str,
        record: Option<OrgKeyRecord>,
    ) -> OrgKeyManager<MemoryKeyStore> {
        let store = match record {
            Some(record) => MemoryKeyStore::with_record(org_id, record),
            None => MemoryKeyStore::new(),
        };
        OrgKeyManager::new(store, self.kms.clone(), self.dek_cache.clone())
    }
}

impl Default for AppState {
    /// An unconfigured KMS and an empty cache, suitable for tests.
    fn default() -> Self {
        Self::new(
            Arc::new(UnconfiguredKms::new("no KMS configured")),
            DekCache::default(),
        )
    }
}

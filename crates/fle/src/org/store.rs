//! [`OrgKeyStore`]: where organisation key records live.
//!
//! Production deployments back this with the `Org` table. The wrapped DEK is
//! owned by the organisation row; nothing else reads or writes it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use super::record::OrgKeyRecord;

/// Errors surfaced by a key store implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store could not be reached or rejected the operation.
    #[error("key store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence for [`OrgKeyRecord`]s.
#[async_trait]
pub trait OrgKeyStore: Send + Sync {
    /// Load the record for `org_id`, or `None` if the org was never provisioned.
    async fn load(&self, org_id: &str) -> Result<Option<OrgKeyRecord>, StoreError>;

    /// Create or replace the record for `org_id`.
    async fn save(&self, org_id: &str, record: &OrgKeyRecord) -> Result<(), StoreError>;
}

#[async_trait]
impl<S: OrgKeyStore + ?Sized> OrgKeyStore for Arc<S> {
    async fn load(&self, org_id: &str) -> Result<Option<OrgKeyRecord>, StoreError> {
        (**self).load(org_id).await
    }

    async fn save(&self, org_id: &str, record: &OrgKeyRecord) -> Result<(), StoreError> {
        (**self).save(org_id, record).await
    }
}

/// In-process [`OrgKeyStore`].
///
/// Used by tests and by the HTTP sidecar, which receives each org's record
/// with the request and seeds a store scoped to that request.
#[derive(Clone, Debug, Default)]
pub struct MemoryKeyStore {
    inner: Arc<RwLock<HashMap<String, OrgKeyRecord>>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-populated with one record.
    pub fn with_record(org_id: impl Into<String>, record: OrgKeyRecord) -> Self {
        let mut map = HashMap::new();
        map.insert(org_id.into(), record);
        Self {
            inner: Arc::new(RwLock::new(map)),
        }
    }

    /// Number of organisations held.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Returns `true` if no organisation is held.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl OrgKeyStore for MemoryKeyStore {
    async fn load(&self, org_id: &str) -> Result<Option<OrgKeyRecord>, StoreError> {
        Ok(self.inner.read().await.get(org_id).cloned())
    }

    async fn save(&self, org_id: &str, record: &OrgKeyRecord) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .insert(org_id.to_owned(), record.clone());
        Ok(())
    }
}

//! [`OrgKeyManager`]: per-organisation envelope encryption.

use std::sync::Arc;

use tracing::{debug, info, instrument};
use zeroize::Zeroizing;

use super::record::{OrgKeyRecord, WrappedDek};
use super::store::OrgKeyStore;
use super::KeyError;
use crate::crypto::{self, Envelope};
use crate::dek::{generate_dek, Dek, DekCache};
use crate::kms::KmsClient;

/// Resolves an organisation's DEK and seals or opens field values with it.
///
/// Cheap to construct: the KMS client and the cache are shared handles.
pub struct OrgKeyManager<S> {
    store: S,
    kms: Arc<dyn KmsClient>,
    cache: DekCache,
}

impl<S: OrgKeyStore> OrgKeyManager<S> {
    pub fn new(store: S, kms: Arc<dyn KmsClient>, cache: DekCache) -> Self {
        Self { store, kms, cache }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn kms(&self) -> &Arc<dyn KmsClient> {
        &self.kms
    }

    pub fn cache(&self) -> &DekCache {
        &self.cache
    }

    /// Create generation 1 of the DEK for a new organisation.
    ///
    /// # Errors
    ///
    /// [`KeyError::AlreadyProvisioned`] if a record exists; KMS and store
    /// errors otherwise.
    #[instrument(skip_all, fields(org_id = %org_id))]
    pub async fn provision_org(&self, org_id: &str) -> Result<OrgKeyRecord, KeyError> {
        if self.store.load(org_id).await?.is_some() {
            return Err(KeyError::AlreadyProvisioned(org_id.to_owned()));
        }
        let record = OrgKeyRecord::new(self.wrap_new_dek(1).await?);
        self.store.save(org_id, &record).await?;
        info!(generation = 1, kms = %self.kms.backend(), "provisioned organisation DEK");
        Ok(record)
    }

    /// Encrypt `plaintext` under the org's active DEK, bound to `context`.
    ///
    /// Returns a blob ready for a binary column. Two calls with identical
    /// arguments return different blobs.
    #[instrument(skip_all, fields(org_id = %org_id, context = %context))]
    pub async fn encrypt_for_org(
        &self,
        org_id: &str,
        plaintext: &str,
        context: &str,
    ) -> Result<Vec<u8>, KeyError> {
        let record = self.load_record(org_id).await?;
        self.seal(org_id, &record, plaintext.as_bytes(), context)
            .await
    }

    /// Decrypt a blob produced by [`Self::encrypt_for_org`].
    ///
    /// `context` must equal the value used at encryption time.
    ///
    /// # Errors
    ///
    /// Format errors for malformed blobs, an authentication error for a
    /// context mismatch or tampering, and KMS errors when the DEK cannot be
    /// unwrapped.
    #[instrument(skip_all, fields(org_id = %org_id, context = %context))]
    pub async fn decrypt_for_org(
        &self,
        org_id: &str,
        blob: &[u8],
        context: &str,
    ) -> Result<Vec<u8>, KeyError> {
        let envelope = Envelope::decode(blob)?;
        let record = self.load_record(org_id).await?;
        self.open(org_id, &record, &envelope, context).await
    }

    /// [`Self::decrypt_for_org`] followed by UTF-8 decoding.
    pub async fn decrypt_string_for_org(
        &self,
        org_id: &str,
        blob: &[u8],
        context: &str,
    ) -> Result<String, KeyError> {
        let bytes = self.decrypt_for_org(org_id, blob, context).await?;
        String::from_utf8(bytes).map_err(|_| KeyError::InvalidUtf8)
    }

    /// Decrypt `blob` with whichever generation sealed it and re-seal it under
    /// the active generation.
    #[instrument(skip_all, fields(org_id = %org_id, context = %context))]
    pub async fn reencrypt_for_org(
        &self,
        org_id: &str,
        blob: &[u8],
        context: &str,
    ) -> Result<Vec<u8>, KeyError> {
        let envelope = Envelope::decode(blob)?;
        let record = self.load_record(org_id).await?;
        let plaintext = Zeroizing::new(self.open(org_id, &record, &envelope, context).await?);
        self.seal(org_id, &record, &plaintext, context).await
    }

    /// Generate a new DEK generation and make it active.
    ///
    /// Previous generations stay in the record so existing ciphertexts
    /// remain readable.
    #[instrument(skip_all, fields(org_id = %org_id))]
    pub async fn rotate_org_dek(&self, org_id: &str) -> Result<OrgKeyRecord, KeyError> {
        let mut record = self.load_record(org_id).await?;
        let generation = record
            .max_generation()
            .checked_add(1)
            .ok_or_else(|| KeyError::GenerationsExhausted(org_id.to_owned()))?;
        record.promote(self.wrap_new_dek(generation).await?);
        self.store.save(org_id, &record).await?;
        self.cache.invalidate_org(org_id).await;
        info!(generation, retired = record.retired.len(), "rotated organisation DEK");
        Ok(record)
    }

    /// Re-wrap every generation under `target`, leaving the DEKs themselves
    /// unchanged.
    ///
    /// Used when the master key rotates. Passing this manager's own client
    /// re-encrypts under the current primary key version. After migrating to a
    /// different master key, build new managers with `target`.
    #[instrument(skip_all, fields(org_id = %org_id, target = %target.backend()))]
    pub async fn rewrap_org(
        &self,
        org_id: &str,
        target: &dyn KmsClient,
    ) -> Result<OrgKeyRecord, KeyError> {
        let record = self.load_record(org_id).await?;

        let active = self.rewrap_one(org_id, &record.active, target).await?;
        let mut retired = Vec::with_capacity(record.retired.len());
        for wrapped in &record.retired {
            retired.push(self.rewrap_one(org_id, wrapped, target).await?);
        }

        let record = OrgKeyRecord { active, retired };
        self.store.save(org_id, &record).await?;
        self.cache.invalidate_org(org_id).await;
        info!(generations = record.iter().count(), "re-wrapped organisation DEKs");
        Ok(record)
    }

    /// Forget a retired generation once nothing is sealed under it.
    ///
    /// Ciphertexts still sealed under `generation` become unreadable.
    #[instrument(skip_all, fields(org_id = %org_id, generation = generation))]
    pub async fn retire_generation(
        &self,
        org_id: &str,
        generation: u32,
    ) -> Result<OrgKeyRecord, KeyError> {
        let mut record = self.load_record(org_id).await?;
        if record.active.generation == generation {
            return Err(KeyError::ActiveGeneration {
                org_id: org_id.to_owned(),
                generation,
            });
        }
        let before = record.retired.len();
        record.retired.retain(|w| w.generation != generation);
        if record.retired.len() == before {
            return Err(KeyError::UnknownGeneration {
                org_id: org_id.to_owned(),
                generation,
            });
        }
        self.store.save(org_id, &record).await?;
        self.cache.invalidate_org(org_id).await;
        info!("dropped retired DEK generation");
        Ok(record)
    }

    async fn load_record(&self, org_id: &str) -> Result<OrgKeyRecord, KeyError> {
        self.store
            .load(org_id)
            .await?
            .ok_or_else(|| KeyError::OrgNotFound(org_id.to_owned()))
    }

    async fn wrap_new_dek(&self, generation: u32) -> Result<WrappedDek, KeyError> {
        let dek = generate_dek();
        let blob = self.kms.encrypt_dek(dek.as_bytes()).await?;
        Ok(WrappedDek { generation, blob })
    }

    async fn unwrap(&self, org_id: &str, wrapped: &WrappedDek) -> Result<Dek, KeyError> {
        if let Some(dek) = self.cache.get(org_id, wrapped.generation, &wrapped.blob).await {
            debug!(generation = wrapped.generation, "DEK cache hit");
            return Ok(dek);
        }
        let plaintext = self.kms.decrypt_dek(&wrapped.blob).await?;
        let dek = Dek::from_slice(&plaintext)?;
        self.cache
            .insert(org_id, wrapped.generation, &wrapped.blob, &dek)
            .await;
        debug!(generation = wrapped.generation, "unwrapped DEK via KMS");
        Ok(dek)
    }

    async fn rewrap_one(
        &self,
        org_id: &str,
        wrapped: &WrappedDek,
        target: &dyn KmsClient,
    ) -> Result<WrappedDek, KeyError> {
        let dek = self.unwrap(org_id, wrapped).await?;
        let blob = target.encrypt_dek(dek.as_bytes()).await?;
        Ok(WrappedDek {
            generation: wrapped.generation,
            blob,
        })
    }

    async fn seal(
        &self,
        org_id: &str,
        record: &OrgKeyRecord,
        plaintext: &[u8],
        context: &str,
    ) -> Result<Vec<u8>, KeyError> {
        let dek = self.unwrap(org_id, &record.active).await?;
        let sealed = crypto::encrypt(plaintext, dek.as_bytes(), Some(context.as_bytes()))?;
        Ok(Envelope::for_generation(record.active.generation, sealed)?.encode())
    }

    async fn open(
        &self,
        org_id: &str,
        record: &OrgKeyRecord,
        envelope: &Envelope,
        context: &str,
    ) -> Result<Vec<u8>, KeyError> {
        let generation = envelope.generation();
        let wrapped = record
            .find(generation)
            .ok_or_else(|| KeyError::UnknownGeneration {
                org_id: org_id.to_owned(),
                generation,
            })?;
        let dek = self.unwrap(org_id, wrapped).await?;
        Ok(crypto::decrypt(
            envelope.sealed(),
            dek.as_bytes(),
            Some(context.as_bytes()),
        )?)
    }
}

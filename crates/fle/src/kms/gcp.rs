//! [`GcpKms`]: DEK wrapping via Google Cloud KMS.
//!
//! The master key lives in Cloud KMS and never reaches this process. DEKs are
//! sent to the service for symmetric encrypt/decrypt; the returned ciphertext
//! is opaque and owned by the provider's format.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use google_cloud_gax::retry::RetrySetting;
use google_cloud_kms::client::google_cloud_auth::credentials::CredentialsFile;
use google_cloud_kms::client::{Client, ClientConfig};
use google_cloud_kms::grpc::kms::v1::{DecryptRequest, EncryptRequest};
use tracing::{info, instrument, warn};
use zeroize::Zeroizing;

use super::{KmsBackendKind, KmsClient, KmsError};

/// Google Cloud KMS client bound to one crypto key.
pub struct GcpKms {
    client: Client,
    /// `projects/{project}/locations/{location}/keyRings/{ring}/cryptoKeys/{key}`
    key_name: String,
}

impl GcpKms {
    /// Connect to Cloud KMS.
    ///
    /// `credentials_json_b64` is a base64-encoded service-account JSON
    /// document. When absent, application-default credentials are used
    /// (`GOOGLE_APPLICATION_CREDENTIALS` or the metadata server).
    ///
    /// # Errors
    ///
    /// Returns [`KmsError::Configuration`] if the credentials cannot be decoded
    /// or the client cannot be built.
    pub async fn connect(
        key_name: String,
        credentials_json_b64: Option<&str>,
    ) -> Result<Self, KmsError> {
        let config = match credentials_json_b64 {
            Some(encoded) => {
                let json = STANDARD.decode(encoded.trim()).map_err(|e| {
                    KmsError::Configuration(format!(
                        "GOOGLE_APPLICATION_CREDENTIALS_JSON is not valid base64: {e}"
                    ))
                })?;
                let json = String::from_utf8(json).map_err(|_| {
                    KmsError::Configuration(
                        "GOOGLE_APPLICATION_CREDENTIALS_JSON is not UTF-8".into(),
                    )
                })?;
                let credentials = CredentialsFile::new_from_str(&json).await.map_err(|e| {
                    KmsError::Configuration(format!("invalid GCP service-account JSON: {e}"))
                })?;
                ClientConfig::default()
                    .with_credentials(credentials)
                    .await
                    .map_err(|e| KmsError::Configuration(format!("GCP auth error: {e}")))?
            }
            None => ClientConfig::default()
                .with_auth()
                .await
                .map_err(|e| KmsError::Configuration(format!("GCP auth error: {e}")))?,
        };

        let client = Client::new(config)
            .await
            .map_err(|e| KmsError::Configuration(format!("GCP KMS client error: {e}")))?;

        info!(key_name = %key_name, "connected to GCP Cloud KMS");
        Ok(Self { client, key_name })
    }

    /// The crypto key resource name.
    pub fn key_name(&self) -> &str {
        &self.key_name
    }

    fn transport(message: String) -> KmsError {
        KmsError::Transport {
            backend: KmsBackendKind::Gcp,
            message,
        }
    }
}

/// Exactly one attempt per call. Passing `None` to the client would select its
/// default of up to 20 attempts on `Unavailable`/`Unknown`.
fn single_attempt() -> Option<RetrySetting> {
    Some(RetrySetting {
        take: 0,
        codes: Vec::new(),
        ..RetrySetting::default()
    })
}

impl std::fmt::Debug for GcpKms {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcpKms")
            .field("key_name", &self.key_name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl KmsClient for GcpKms {
    #[instrument(skip_all, fields(kms = "gcp"))]
    async fn encrypt_dek(&self, plaintext: &[u8]) -> Result<Vec<u8>, KmsError> {
        let request = EncryptRequest {
            name: self.key_name.clone(),
            plaintext: plaintext.to_vec(),
            ..Default::default()
        };

        let response = self.client.encrypt(request, single_attempt()).await.map_err(|e| {
            warn!(error = %e, "GCP Cloud KMS encrypt failed");
            Self::transport(format!("encrypt: {e}"))
        })?;

        Ok(response.ciphertext)
    }

    #[instrument(skip_all, fields(kms = "gcp"))]
    async fn decrypt_dek(&self, wrapped: &[u8]) -> Result<Zeroizing<Vec<u8>>, KmsError> {
        let request = DecryptRequest {
            name: self.key_name.clone(),
            ciphertext: wrapped.to_vec(),
            ..Default::default()
        };

        let response = self.client.decrypt(request, single_attempt()).await.map_err(|e| {
            warn!(error = %e, "GCP Cloud KMS decrypt failed");
            Self::transport(format!("decrypt: {e}"))
        })?;

        Ok(Zeroizing::new(response.plaintext))
    }

    fn backend(&self) -> KmsBackendKind {
        KmsBackendKind::Gcp
    }
}

//! Backend selection from `KMS_PROVIDER` / `KMS_KEY_ID`.
//!
//! Selection is a pure function ([`select_backend`]) so the rules can be
//! tested without network access; [`create_kms_client`] then builds only the
//! backend that was selected.

use std::str::FromStr;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::{info, warn};

use super::{KmsBackendKind, KmsClient, KmsError, LocalKms, TimeoutKms, UnconfiguredKms};
use crate::config::KmsConfig;
use crate::crypto::KEY_LEN;

/// Values accepted in `KMS_PROVIDER`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KmsProvider {
    Gcp,
    Aws,
    Azure,
    Local,
}

impl FromStr for KmsProvider {
    type Err = KmsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gcp" => Ok(KmsProvider::Gcp),
            "aws" => Ok(KmsProvider::Aws),
            "azure" => Ok(KmsProvider::Azure),
            "local" => Ok(KmsProvider::Local),
            other => Err(KmsError::Unsupported(format!("unknown provider {other:?}"))),
        }
    }
}

/// The outcome of backend selection.
#[derive(Debug)]
pub enum KmsBackend {
    /// Google Cloud KMS, keyed by a crypto key resource name.
    Gcp { key_name: String },
    /// Local wrapper; the master key has already been validated.
    Local(LocalKms),
    /// Nothing usable is configured.
    Unconfigured { reason: String },
}

impl KmsBackend {
    pub fn kind(&self) -> KmsBackendKind {
        match self {
            KmsBackend::Gcp { .. } => KmsBackendKind::Gcp,
            KmsBackend::Local(_) => KmsBackendKind::Local,
            KmsBackend::Unconfigured { .. } => KmsBackendKind::Unconfigured,
        }
    }
}

/// Returns `true` for `projects/P/locations/L/keyRings/R/cryptoKeys/K`.
pub fn is_gcp_key_name(key_id: &str) -> bool {
    let parts: Vec<&str> = key_id.split('/').collect();
    parts.len() == 8
        && parts[0] == "projects"
        && parts[2] == "locations"
        && parts[4] == "keyRings"
        && parts[6] == "cryptoKeys"
        && parts.iter().all(|p| !p.is_empty())
}

/// Decide which backend `provider` and `key_id` describe.
///
/// 1. `gcp` with a crypto key resource name selects Cloud KMS.
/// 2. Otherwise a key id that is base64 for exactly 32 bytes selects the
///    local wrapper.
/// 3. Otherwise the result is [`KmsBackend::Unconfigured`].
///
/// # Errors
///
/// `aws`, `azure`, and unrecognised providers fail with
/// [`KmsError::Unsupported`] rather than falling back to local wrapping.
pub fn select_backend(
    provider: Option<&str>,
    key_id: Option<&str>,
) -> Result<KmsBackend, KmsError> {
    let provider = provider
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(KmsProvider::from_str)
        .transpose()?;

    match provider {
        Some(KmsProvider::Aws) => {
            return Err(KmsError::Unsupported("aws KMS is not implemented".into()))
        }
        Some(KmsProvider::Azure) => {
            return Err(KmsError::Unsupported(
                "azure Key Vault is not implemented".into(),
            ))
        }
        _ => {}
    }

    let Some(key_id) = key_id.map(str::trim).filter(|k| !k.is_empty()) else {
        return Ok(KmsBackend::Unconfigured {
            reason: "KMS_KEY_ID is not set".into(),
        });
    };

    if provider == Some(KmsProvider::Gcp) && is_gcp_key_name(key_id) {
        return Ok(KmsBackend::Gcp {
            key_name: key_id.to_owned(),
        });
    }

    // Never echo the key id below this point: it may be key material.
    match STANDARD.decode(key_id) {
        Ok(bytes) if bytes.len() == KEY_LEN => {
            if provider == Some(KmsProvider::Gcp) {
                warn!("KMS_PROVIDER=gcp but KMS_KEY_ID is a local master key; using local wrapper");
            }
            Ok(KmsBackend::Local(LocalKms::from_base64(key_id)?))
        }
        Ok(bytes) => Ok(KmsBackend::Unconfigured {
            reason: format!(
                "KMS_KEY_ID decodes to {} bytes; a local master key must be {KEY_LEN}",
                bytes.len()
            ),
        }),
        Err(_) if provider == Some(KmsProvider::Gcp) => Ok(KmsBackend::Unconfigured {
            reason: "KMS_KEY_ID is not a GCP crypto key resource name \
                     (projects/.../locations/.../keyRings/.../cryptoKeys/...)"
                .into(),
        }),
        Err(_) => Ok(KmsBackend::Unconfigured {
            reason: "KMS_KEY_ID is neither a cloud key name with a matching \
                     KMS_PROVIDER nor a base64 32-byte master key"
                .into(),
        }),
    }
}

/// Build the configured KMS client, wrapped in the configured call deadline.
///
/// # Errors
///
/// Fails at construction for unsupported providers, malformed local master
/// keys, and cloud clients that cannot authenticate.
pub async fn create_kms_client(cfg: &KmsConfig) -> Result<Arc<dyn KmsClient>, KmsError> {
    let backend = select_backend(cfg.kms_provider.as_deref(), cfg.kms_key_id.as_deref())?;
    let timeout = cfg.kms_timeout();

    let client: Arc<dyn KmsClient> = match backend {
        KmsBackend::Gcp { key_name } => connect_gcp(key_name, cfg, timeout).await?,
        KmsBackend::Local(kms) => Arc::new(TimeoutKms::new(kms, timeout)),
        KmsBackend::Unconfigured { reason } => {
            warn!(reason = %reason, "no KMS backend configured; crypto operations will fail");
            Arc::new(UnconfiguredKms::new(reason))
        }
    };

    info!(backend = %client.backend(), timeout = ?timeout, "KMS client ready");
    Ok(client)
}

#[cfg(feature = "gcp-kms")]
async fn connect_gcp(
    key_name: String,
    cfg: &KmsConfig,
    timeout: std::time::Duration,
) -> Result<Arc<dyn KmsClient>, KmsError> {
    let gcp = super::GcpKms::connect(key_name, cfg.google_application_credentials_json.as_deref())
        .await?;
    Ok(Arc::new(TimeoutKms::new(gcp, timeout)))
}

#[cfg(not(feature = "gcp-kms"))]
async fn connect_gcp(
    _key_name: String,
    _cfg: &KmsConfig,
    _timeout: std::time::Duration,
) -> Result<Arc<dyn KmsClient>, KmsError> {
    Err(KmsError::Unsupported(
        "gcp (built without the `gcp-kms` feature)".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const GCP_KEY: &str = "projects/acme/locations/us-central1/keyRings/crm/cryptoKeys/org-deks";

    fn local_key() -> String {
        STANDARD.encode([0x24u8; KEY_LEN])
    }

    #[test]
    fn recognises_gcp_key_names() {
        assert!(is_gcp_key_name(GCP_KEY));
        assert!(!is_gcp_key_name("projects/acme"));
        assert!(!is_gcp_key_name("projects//locations/l/keyRings/r/cryptoKeys/k"));
        assert!(!is_gcp_key_name(&format!("{GCP_KEY}/cryptoKeyVersions/1")));
        assert!(!is_gcp_key_name(&local_key()));
    }

    #[test]
    fn gcp_provider_with_resource_name_selects_cloud() {
        let backend = select_backend(Some("gcp"), Some(GCP_KEY)).unwrap();
        assert!(matches!(backend, KmsBackend::Gcp { ref key_name } if key_name == GCP_KEY));
    }

    #[test]
    fn provider_is_case_insensitive() {
        let backend = select_backend(Some(" GCP "), Some(GCP_KEY)).unwrap();
        assert_eq!(backend.kind(), KmsBackendKind::Gcp);
    }

    #[test]
    fn base64_master_key_selects_local() {
        assert_eq!(
            select_backend(None, Some(local_key().as_str())).unwrap().kind(),
            KmsBackendKind::Local
        );
        assert_eq!(
            select_backend(Some("local"), Some(local_key().as_str())).unwrap().kind(),
            KmsBackendKind::Local
        );
        assert_eq!(
            select_backend(Some("gcp"), Some(local_key().as_str())).unwrap().kind(),
            KmsBackendKind::Local
        );
    }

    #[test]
    fn resource_name_without_gcp_provider_is_unconfigured() {
        assert_eq!(
            select_backend(None, Some(GCP_KEY)).unwrap().kind(),
            KmsBackendKind::Unconfigured
        );
    }

    #[test]
    fn missing_or_short_key_is_unconfigured() {
        assert!(matches!(
            select_backend(None, None).unwrap(),
            KmsBackend::Unconfigured { ref reason } if reason.contains("not set")
        ));
        assert!(matches!(
            select_backend(None, Some("   ")).unwrap(),
            KmsBackend::Unconfigured { .. }
        ));
        let short = STANDARD.encode([0u8; 16]);
        assert!(matches!(
            select_backend(None, Some(short.as_str())).unwrap(),
            KmsBackend::Unconfigured { ref reason } if reason.contains("16 bytes")
        ));
    }

    #[test]
    fn unconfigured_reason_never_echoes_key_id() {
        let KmsBackend::Unconfigured { reason } =
            select_backend(None, Some("sup3r-s3cret-value")).unwrap()
        else {
            panic!("expected unconfigured backend");
        };
        assert!(!reason.contains("sup3r-s3cret-value"));
    }

    #[test]
    fn other_clouds_are_unsupported() {
        for provider in ["aws", "azure", "vault"] {
            assert!(matches!(
                select_backend(Some(provider), Some(local_key().as_str())),
                Err(KmsError::Unsupported(_))
            ));
        }
    }

    #[tokio::test]
    async fn factory_builds_local_client() {
        let cfg = KmsConfig {
            kms_key_id: Some(local_key()),
            ..KmsConfig::default()
        };
        let kms = create_kms_client(&cfg).await.unwrap();
        assert_eq!(kms.backend(), KmsBackendKind::Local);
        let wrapped = kms.encrypt_dek(&[1u8; KEY_LEN]).await.unwrap();
        assert_eq!(kms.decrypt_dek(&wrapped).await.unwrap().as_slice(), &[1u8; KEY_LEN]);
    }

    #[tokio::test]
    async fn factory_stub_fails_on_first_call() {
        let kms = create_kms_client(&KmsConfig::default()).await.unwrap();
        assert_eq!(kms.backend(), KmsBackendKind::Unconfigured);
        assert!(matches!(
            kms.encrypt_dek(&[0u8; KEY_LEN]).await,
            Err(KmsError::Configuration(_))
        ));
        assert!(matches!(
            kms.decrypt_dek(&[0u8; 61]).await,
            Err(KmsError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn factory_rejects_aws() {
        let cfg = KmsConfig {
            kms_provider: Some("aws".into()),
            kms_key_id: Some("arn:aws:kms:us-east-1:123456789012:key/abc".into()),
            ..KmsConfig::default()
        };
        assert!(matches!(
            create_kms_client(&cfg).await,
            Err(KmsError::Unsupported(_))
        ));
    }
}

//! KMS and DEK-cache configuration.
//!
//! Values are read from environment variables. Anything that could be key
//! material is redacted from `Debug` output.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::dek::DekCache;

/// Errors from loading or validating [`KmsConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("{0}")]
    Invalid(String),
}

/// Configuration consumed by [`crate::kms::create_kms_client`] and the DEK cache.
#[derive(Clone, Deserialize)]
pub struct KmsConfig {
    /// `gcp`, `aws`, `azure`, or `local`. Optional.
    #[serde(default)]
    pub kms_provider: Option<String>,

    /// Cloud key resource name, or a base64 32-byte local master key.
    #[serde(default)]
    pub kms_key_id: Option<String>,

    /// Base64-encoded service-account JSON for Cloud KMS.
    #[serde(default)]
    pub google_application_credentials_json: Option<String>,

    /// Deadline (milliseconds) for a single KMS call.
    #[serde(default = "default_kms_timeout_ms")]
    pub kms_timeout_ms: u64,

    /// How long (seconds) an unwrapped DEK may be reused. `0` disables caching.
    #[serde(default = "default_dek_cache_ttl")]
    pub dek_cache_ttl_secs: u64,

    /// Upper bound on cached DEKs. `0` disables caching.
    #[serde(default = "default_dek_cache_max_entries")]
    pub dek_cache_max_entries: usize,

    /// How often (seconds) expired cache entries are swept.
    #[serde(default = "default_dek_cache_sweep_interval")]
    pub dek_cache_sweep_interval_secs: u64,
}

fn default_kms_timeout_ms() -> u64 {
    5000
}
fn default_dek_cache_ttl() -> u64 {
    300
}
fn default_dek_cache_max_entries() -> usize {
    1024
}
fn default_dek_cache_sweep_interval() -> u64 {
    60
}

impl Default for KmsConfig {
    fn default() -> Self {
        Self {
            kms_provider: None,
            kms_key_id: None,
            google_application_credentials_json: None,
            kms_timeout_ms: default_kms_timeout_ms(),
            dek_cache_ttl_secs: default_dek_cache_ttl(),
            dek_cache_max_entries: default_dek_cache_max_entries(),
            dek_cache_sweep_interval_secs: default_dek_cache_sweep_interval(),
        }
    }
}

impl std::fmt::Debug for KmsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("KmsConfig")
            .field("kms_provider", &self.kms_provider)
            .field("kms_key_id", &redact(&self.kms_key_id))
            .field(
                "google_application_credentials_json",
                &redact(&self.google_application_credentials_json),
            )
            .field("kms_timeout_ms", &self.kms_timeout_ms)
            .field("dek_cache_ttl_secs", &self.dek_cache_ttl_secs)
            .field("dek_cache_max_entries", &self.dek_cache_max_entries)
            .field(
                "dek_cache_sweep_interval_secs",
                &self.dek_cache_sweep_interval_secs,
            )
            .finish()
    }
}

impl KmsConfig {
    /// Load and validate configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a value cannot be parsed or fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(config::Environment::default())
    }

    /// Load from an explicit environment source (tests pass a fixed map).
    pub fn from_source(env: config::Environment) -> Result<Self, ConfigError> {
        let cfg = config::Config::builder().add_source(env).build()?;
        let c: KmsConfig = cfg.try_deserialize()?;
        c.validate()?;
        Ok(c)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.kms_timeout_ms == 0 {
            return Err(ConfigError::Invalid("KMS_TIMEOUT_MS must be > 0".into()));
        }
        if self.dek_cache_sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "DEK_CACHE_SWEEP_INTERVAL_SECS must be > 0".into(),
            ));
        }
        Ok(())
    }

    pub fn kms_timeout(&self) -> Duration {
        Duration::from_millis(self.kms_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.dek_cache_sweep_interval_secs)
    }

    /// A fresh, empty cache sized by this configuration.
    pub fn dek_cache(&self) -> DekCache {
        DekCache::new(
            Duration::from_secs(self.dek_cache_ttl_secs),
            self.dek_cache_max_entries,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> config::Environment {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        config::Environment::default().source(Some(map))
    }

    #[test]
    fn defaults_are_correct() {
        assert_eq!(default_kms_timeout_ms(), 5000);
        assert_eq!(default_dek_cache_ttl(), 300);
        assert_eq!(default_dek_cache_max_entries(), 1024);
        assert_eq!(default_dek_cache_sweep_interval(), 60);
    }

    #[test]
    fn loads_from_environment_source() {
        let cfg = KmsConfig::from_source(env(&[
            ("KMS_PROVIDER", "gcp"),
            (
                "KMS_KEY_ID",
                "projects/p/locations/l/keyRings/r/cryptoKeys/k",
            ),
            ("KMS_TIMEOUT_MS", "250"),
        ]))
        .unwrap();
        assert_eq!(cfg.kms_provider.as_deref(), Some("gcp"));
        assert_eq!(cfg.kms_timeout(), Duration::from_millis(250));
        assert_eq!(cfg.dek_cache_ttl_secs, 300);
        assert!(cfg.google_application_credentials_json.is_none());
    }

    #[test]
    fn empty_environment_is_valid() {
        let cfg = KmsConfig::from_source(env(&[])).unwrap();
        assert!(cfg.kms_key_id.is_none());
    }

    #[test]
    fn validate_rejects_zero_timeout() {
        let cfg = KmsConfig {
            kms_timeout_ms: 0,
            ..KmsConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_sweep_interval() {
        let cfg = KmsConfig {
            dek_cache_sweep_interval_secs: 0,
            ..KmsConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn debug_redacts_key_material() {
        let cfg = KmsConfig {
            kms_key_id: Some("c2VjcmV0LW1hc3Rlci1rZXktbWF0ZXJpYWwtMzJi".into()),
            google_application_credentials_json: Some("eyJwcml2YXRlX2tleSI6Ii4uLiJ9".into()),
            ..KmsConfig::default()
        };
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("c2VjcmV0"));
        assert!(!rendered.contains("eyJwcml2"));
        assert!(rendered.contains("REDACTED"));
    }
}

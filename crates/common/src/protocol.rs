//! Request and response types for the sidecar's JSON API.
//!
//! Binary values (wrapped DEKs, field ciphertexts) travel as standard base64
//! strings. The caller owns persistence: it stores `key_record` on the org row
//! and the field blobs in their columns, and sends them back as needed.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Key records
// ---------------------------------------------------------------------------

/// One wrapped DEK generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedDekEntry {
    /// DEK generation, starting at 1.
    pub generation: u32,
    /// Base64 of the KMS-wrapped DEK.
    pub blob: String,
}

/// An organisation's wrapped DEKs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    /// The generation new ciphertexts are sealed under.
    pub active: WrappedDekEntry,
    /// Older generations still needed to read existing ciphertexts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retired: Vec<WrappedDekEntry>,
}

/// Request body for `POST /v1/keys`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionRequest {
    pub org_id: String,
}

/// Request body for `POST /v1/keys/rotate` and `POST /v1/keys/rewrap`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyRecordRequest {
    pub org_id: String,
    pub key_record: KeyRecord,
}

/// Response body for every `/v1/keys` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyRecordResponse {
    pub org_id: String,
    pub key_record: KeyRecord,
}

// ---------------------------------------------------------------------------
// Encrypt endpoint
// ---------------------------------------------------------------------------

/// A plaintext value and the context label it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlainField {
    /// Field label bound as associated data, e.g. `"contact:email"`.
    pub context: String,
    pub plaintext: String,
}

/// A sealed value and the context label it was sealed under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedField {
    pub context: String,
    /// Base64 of the versioned blob.
    pub blob: String,
}

/// Request body for `POST /v1/encrypt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptRequest {
    pub org_id: String,
    pub key_record: KeyRecord,
    pub fields: Vec<PlainField>,
}

/// Successful response body for `POST /v1/encrypt`. Fields are returned in
/// request order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptResponse {
    pub fields: Vec<SealedField>,
}

// ---------------------------------------------------------------------------
// Decrypt endpoint
// ---------------------------------------------------------------------------

/// Request body for `POST /v1/decrypt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecryptRequest {
    pub org_id: String,
    pub key_record: KeyRecord,
    pub fields: Vec<SealedField>,
    /// Substituted for any field that cannot be decrypted.
    #[serde(default)]
    pub fallback: String,
}

/// One decrypted field. `ok == false` means `plaintext` is the fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenedField {
    pub context: String,
    pub plaintext: String,
    pub ok: bool,
}

/// Response body for `POST /v1/decrypt`. Always `200` once the request
/// parses; per-field failures are reported through [`OpenedField::ok`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecryptResponse {
    pub fields: Vec<OpenedField>,
}

// ---------------------------------------------------------------------------
// Error response
// ---------------------------------------------------------------------------

/// Standard error response body returned on any non-2xx status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Short machine-readable error code (e.g. `"bad_request"`).
    pub code: String,
    /// Human-readable description safe to expose to callers.
    pub message: String,
}

impl ErrorResponse {
    /// Construct an [`ErrorResponse`] from a code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Response body for `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall service status: `"ok"` or `"degraded"`.
    pub status: String,
    /// Selected KMS backend: `"gcp"`, `"local"`, or `"unconfigured"`.
    pub kms_backend: String,
    /// Number of unwrapped DEKs currently cached.
    pub cached_deks: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decrypt_request_fallback_defaults_to_empty() {
        let req: DecryptRequest = serde_json::from_value(json!({
            "org_id": "org_1",
            "key_record": {"active": {"generation": 1, "blob": "AQID"}},
            "fields": [{"context": "contact:email", "blob": "AQ=="}]
        }))
        .unwrap();
        assert_eq!(req.fallback, "");
        assert!(req.key_record.retired.is_empty());
    }

    #[test]
    fn key_record_omits_empty_retired_list() {
        let record = KeyRecord {
            active: WrappedDekEntry {
                generation: 1,
                blob: "AQID".into(),
            },
            retired: Vec::new(),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert!(value.get("retired").is_none());
    }

    #[test]
    fn error_response_new() {
        let e = ErrorResponse::new("bad_request", "blob is not valid base64");
        assert_eq!(e.code, "bad_request");
        assert!(e.message.contains("base64"));
    }

    #[test]
    fn health_response_serde() {
        let h = HealthResponse {
            status: "ok".into(),
            kms_backend: "local".into(),
            cached_deks: 3,
        };
        let json = serde_json::to_string(&h).unwrap();
        let decoded: HealthResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.cached_deks, 3);
    }
}

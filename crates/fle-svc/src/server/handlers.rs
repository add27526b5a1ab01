//! Axum request handlers for all service endpoints.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::protocol::{
    DecryptRequest, DecryptResponse, EncryptRequest, EncryptResponse, ErrorResponse,
    HealthResponse, KeyRecordRequest, KeyRecordResponse, OpenedField, ProvisionRequest,
    SealedField,
};
use common::ServiceError;
use fle::org::degrade::LossyBatch;
use fle::{ErrorClass, KeyError, KmsBackendKind, OrgKeyRecord};
use serde::Serialize;
use tracing::{info, warn};

use super::middleware::MAX_BATCH_FIELDS;
use super::state::AppState;
use super::wire;

/// `POST /v1/keys` — generate and wrap generation 1 of a new org's DEK.
///
/// The caller persists the returned record; the sidecar keeps no copy.
pub async fn provision(
    State(state): State<AppState>,
    Json(req): Json<ProvisionRequest>,
) -> Response {
    respond(provision_org(&state, req).await)
}

/// `POST /v1/keys/rotate` — add a new DEK generation and make it active.
pub async fn rotate(
    State(state): State<AppState>,
    Json(req): Json<KeyRecordRequest>,
) -> Response {
    respond(rotate_org(&state, req).await)
}

/// `POST /v1/keys/rewrap` — re-wrap every generation under the configured
/// master key. Field ciphertexts are unaffected.
pub async fn rewrap(
    State(state): State<AppState>,
    Json(req): Json<KeyRecordRequest>,
) -> Response {
    respond(rewrap_org(&state, req).await)
}

/// `POST /v1/encrypt` — seal a batch of fields under the org's active DEK.
///
/// Any failure fails the whole request: nothing is returned that could be
/// stored in place of a ciphertext.
pub async fn encrypt(
    State(state): State<AppState>,
    Json(req): Json<EncryptRequest>,
) -> Response {
    respond(encrypt_fields(&state, req).await)
}

/// `POST /v1/decrypt` — open a batch of fields.
///
/// Fields that cannot be decrypted come back as the request's `fallback`
/// with `ok: false`; the rest of the batch is unaffected. A generation whose
/// DEK the KMS could not unwrap is not retried within the same request.
pub async fn decrypt(
    State(state): State<AppState>,
    Json(req): Json<DecryptRequest>,
) -> Response {
    respond(decrypt_fields(&state, req).await)
}

/// `GET /health` — liveness and readiness check.
///
/// Returns `200 OK` when a KMS backend is configured and `503 Service
/// Unavailable` otherwise.
pub async fn health(State(state): State<AppState>) -> Response {
    let backend = state.kms.backend();
    let cached_deks = state.dek_cache.len().await;

    let (status_code, status_str) = if backend == KmsBackendKind::Unconfigured {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    } else {
        (StatusCode::OK, "ok")
    };

    let body = HealthResponse {
        status: status_str.into(),
        kms_backend: backend.as_str().into(),
        cached_deks,
    };
    (status_code, Json(body)).into_response()
}

/// Catch-all 404 handler.
pub async fn not_found() -> impl IntoResponse {
    let err = ErrorResponse::new("not_found", "the requested resource does not exist");
    (StatusCode::NOT_FOUND, Json(err))
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

async fn provision_org(
    state: &AppState,
    req: ProvisionRequest,
) -> Result<KeyRecordResponse, ServiceError> {
    ensure_org_id(&req.org_id)?;
    let manager = state.manager(&req.org_id, None);
    let record = manager
        .provision_org(&req.org_id)
        .await
        .map_err(|e| key_failure(&req.org_id, &e))?;
    Ok(key_record_response(req.org_id, &record))
}

async fn rotate_org(
    state: &AppState,
    req: KeyRecordRequest,
) -> Result<KeyRecordResponse, ServiceError> {
    ensure_org_id(&req.org_id)?;
    let record = wire::record_from_wire(&req.key_record)?;
    let manager = state.manager(&req.org_id, Some(record));
    let record = manager
        .rotate_org_dek(&req.org_id)
        .await
        .map_err(|e| key_failure(&req.org_id, &e))?;
    Ok(key_record_response(req.org_id, &record))
}

async fn rewrap_org(
    state: &AppState,
    req: KeyRecordRequest,
) -> Result<KeyRecordResponse, ServiceError> {
    ensure_org_id(&req.org_id)?;
    let record = wire::record_from_wire(&req.key_record)?;
    let manager = state.manager(&req.org_id, Some(record));
    let record = manager
        .rewrap_org(&req.org_id, state.kms.as_ref())
        .await
        .map_err(|e| key_failure(&req.org_id, &e))?;
    Ok(key_record_response(req.org_id, &record))
}

async fn encrypt_fields(
    state: &AppState,
    req: EncryptRequest,
) -> Result<EncryptResponse, ServiceError> {
    ensure_org_id(&req.org_id)?;
    ensure_batch_size(req.fields.len())?;
    let record = wire::record_from_wire(&req.key_record)?;
    let manager = state.manager(&req.org_id, Some(record));

    let mut fields = Vec::with_capacity(req.fields.len());
    for field in req.fields {
        let blob = manager
            .encrypt_for_org(&req.org_id, &field.plaintext, &field.context)
            .await
            .map_err(|e| key_failure(&req.org_id, &e))?;
        fields.push(SealedField {
            context: field.context,
            blob: wire::encode_blob(&blob),
        });
    }
    Ok(EncryptResponse { fields })
}

async fn decrypt_fields(
    state: &AppState,
    req: DecryptRequest,
) -> Result<DecryptResponse, ServiceError> {
    ensure_org_id(&req.org_id)?;
    ensure_batch_size(req.fields.len())?;
    let record = wire::record_from_wire(&req.key_record)?;
    let manager = state.manager(&req.org_id, Some(record));

    let mut batch = LossyBatch::new(&manager, &req.org_id);
    let mut fields = Vec::with_capacity(req.fields.len());
    let mut failed = 0usize;
    for field in req.fields {
        let opened = match wire::decode_blob(&field.blob) {
            Ok(blob) => batch.decrypt(&blob, &field.context).await,
            Err(_) => {
                warn!(
                    org_id = %req.org_id,
                    context = %field.context,
                    "field blob is not valid base64; substituting fallback"
                );
                None
            }
        };
        fields.push(match opened {
            Some(plaintext) => OpenedField {
                context: field.context,
                plaintext,
                ok: true,
            },
            None => {
                failed += 1;
                OpenedField {
                    context: field.context,
                    plaintext: req.fallback.clone(),
                    ok: false,
                }
            }
        });
    }
    if failed > 0 {
        info!(
            org_id = %req.org_id,
            failed,
            skipped = batch.skipped(),
            total = fields.len(),
            "decrypted batch with fallbacks"
        );
    }
    Ok(DecryptResponse { fields })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn respond<T: Serialize>(result: Result<T, ServiceError>) -> Response {
    match result {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(err) => error_response(&err),
    }
}

fn error_response(err: &ServiceError) -> Response {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = ErrorResponse::new(err.code(), err.to_string());
    (status, Json(body)).into_response()
}

fn key_record_response(org_id: String, record: &OrgKeyRecord) -> KeyRecordResponse {
    KeyRecordResponse {
        org_id,
        key_record: wire::record_to_wire(record),
    }
}

fn ensure_org_id(org_id: &str) -> Result<(), ServiceError> {
    if org_id.trim().is_empty() {
        return Err(ServiceError::BadRequest("org_id must not be empty".into()));
    }
    Ok(())
}

fn ensure_batch_size(len: usize) -> Result<(), ServiceError> {
    if len > MAX_BATCH_FIELDS {
        return Err(ServiceError::BadRequest(format!(
            "at most {MAX_BATCH_FIELDS} fields per request, got {len}"
        )));
    }
    Ok(())
}

/// Log a key-layer failure and map it to the HTTP error taxonomy.
fn key_failure(org_id: &str, err: &KeyError) -> ServiceError {
    warn!(org_id, class = %err.class(), error = %err, "key operation failed");
    service_error(err)
}

fn service_error(err: &KeyError) -> ServiceError {
    let message = err.to_string();
    match err {
        KeyError::AlreadyProvisioned(_)
        | KeyError::ActiveGeneration { .. }
        | KeyError::GenerationsExhausted(_) => {
            return ServiceError::Conflict(message);
        }
        KeyError::Kms(_) if err.class() == ErrorClass::Configuration => {
            return ServiceError::Unavailable(message);
        }
        _ => {}
    }
    match err.class() {
        ErrorClass::NotFound => ServiceError::NotFound(message),
        ErrorClass::Format => ServiceError::BadRequest(message),
        ErrorClass::Transport | ErrorClass::Storage => ServiceError::Unavailable(message),
        ErrorClass::Authentication | ErrorClass::Configuration => {
            ServiceError::EncryptionFailure(message)
        }
    }
}

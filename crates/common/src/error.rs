//! Common error types shared across crates.

use thiserror::Error;

/// Top-level service error type.
///
/// Variants map to HTTP status codes returned to callers:
/// - [`ServiceError::BadRequest`] → 400
/// - [`ServiceError::NotFound`] → 404
/// - [`ServiceError::Conflict`] → 409
/// - [`ServiceError::EncryptionFailure`] → 500
/// - [`ServiceError::Unavailable`] → 503
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request was malformed — bad base64, inconsistent key record, invalid JSON.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The referenced DEK generation does not exist in the supplied key record.
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation conflicts with the key record's current state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Encryption, decryption, or DEK unwrapping failed in the crypto layer.
    #[error("encryption failure: {0}")]
    EncryptionFailure(String),

    /// The KMS is unconfigured, unreachable, or timed out.
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

impl ServiceError {
    /// Returns the HTTP status code that should be sent for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            ServiceError::BadRequest(_) => 400,
            ServiceError::NotFound(_) => 404,
            ServiceError::Conflict(_) => 409,
            ServiceError::EncryptionFailure(_) => 500,
            ServiceError::Unavailable(_) => 503,
        }
    }

    /// Short machine-readable code for [`crate::protocol::ErrorResponse::code`].
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::BadRequest(_) => "bad_request",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::Conflict(_) => "conflict",
            ServiceError::EncryptionFailure(_) => "encryption_failure",
            ServiceError::Unavailable(_) => "service_unavailable",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_codes() {
        assert_eq!(ServiceError::BadRequest("x".into()).http_status(), 400);
        assert_eq!(ServiceError::NotFound("x".into()).http_status(), 404);
        assert_eq!(ServiceError::Conflict("x".into()).http_status(), 409);
        assert_eq!(
            ServiceError::EncryptionFailure("x".into()).http_status(),
            500
        );
        assert_eq!(ServiceError::Unavailable("x".into()).http_status(), 503);
    }

    #[test]
    fn codes_are_snake_case() {
        assert_eq!(ServiceError::Unavailable("x".into()).code(), "service_unavailable");
        assert_eq!(ServiceError::EncryptionFailure("x".into()).code(), "encryption_failure");
    }

    #[test]
    fn display_includes_message() {
        let e = ServiceError::BadRequest("blob is not valid base64".into());
        assert!(e.to_string().contains("blob is not valid base64"));
    }
}

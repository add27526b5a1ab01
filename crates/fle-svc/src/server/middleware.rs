//! Axum middleware layers applied to the router.
//!
//! Includes request tracing, timeout enforcement, and response compression.

use std::time::Duration;

/// Default per-request timeout applied to all routes.
///
/// Each KMS call carries its own shorter timeout; this bounds a whole batch.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Largest number of fields accepted in one encrypt or decrypt batch.
pub const MAX_BATCH_FIELDS: usize = 1000;

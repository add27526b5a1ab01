//! Tracing subscriber and optional OpenTelemetry export.
//!
//! # Telemetry invariants
//!
//! - **No plaintext or key material** in any span attribute or log field.
//!   Org ids, field contexts, DEK generations and error classes are fine.
//! - Log level is configurable via `LOG_LEVEL` (default: `info`), overridden
//!   by `RUST_LOG` when set.

pub mod init;

pub use init::{init_telemetry, shutdown_telemetry};

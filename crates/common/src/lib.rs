//! Wire types and errors shared by the `fle-svc` sidecar and its clients.

pub mod error;
pub mod protocol;

pub use error::ServiceError;

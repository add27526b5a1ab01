//! Failure classes shared by every layer.
//!
//! Each layer has its own `thiserror` enum; [`ErrorClass`] collapses them into
//! the four kinds callers branch on, plus storage and lookup failures.

/// Coarse classification of a crypto-layer failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Missing or invalid key material, unsupported provider.
    Configuration,
    /// Blob too short, unknown version byte.
    Format,
    /// Tag mismatch: wrong context, wrong key, or tampered ciphertext.
    Authentication,
    /// KMS unreachable, denied, or timed out.
    Transport,
    /// The org key store failed.
    Storage,
    /// The organisation or DEK generation does not exist.
    NotFound,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Configuration => "configuration",
            ErrorClass::Format => "format",
            ErrorClass::Authentication => "authentication",
            ErrorClass::Transport => "transport",
            ErrorClass::Storage => "storage",
            ErrorClass::NotFound => "not_found",
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

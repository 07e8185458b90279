//! Error types for warmcache.
//!
//! Loader failures never reach `get` callers; they are absorbed by the
//! refresh policy. The errors below are what the public API can return.

use thiserror::Error;

/// Result type alias using `CacheError`.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Type-erased error returned by loaders.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for all warmcache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    // ═══════════════════════════════════════════════════════════════════════════
    // ACCESSOR ERRORS
    // ═══════════════════════════════════════════════════════════════════════════
    /// Encoding or decoding failed while producing an independent copy.
    #[error("Deep copy failed: {0}")]
    Copy(String),

    // ═══════════════════════════════════════════════════════════════════════════
    // CONFIGURATION ERRORS
    // ═══════════════════════════════════════════════════════════════════════════
    /// A configuration value could not be parsed.
    #[error("Configuration error: {key}: {reason}")]
    Config { key: String, reason: String },

    /// A keyed cache was built without any way to load data.
    #[error("No loader configured: a key loader or a batch loader is required")]
    MissingLoader,

    // ═══════════════════════════════════════════════════════════════════════════
    // LOADER ERRORS
    // ═══════════════════════════════════════════════════════════════════════════
    /// The load callback failed.
    #[error("Load failed: {0}")]
    Load(#[source] BoxError),
}

impl CacheError {
    /// Wraps any loader error.
    pub fn load(err: impl Into<BoxError>) -> Self {
        CacheError::Load(err.into())
    }

    /// Returns true if this error stems from configuration.
    pub fn is_config_error(&self) -> bool {
        matches!(self, CacheError::Config { .. } | CacheError::MissingLoader)
    }
}

impl From<bincode::Error> for CacheError {
    fn from(err: bincode::Error) -> Self {
        CacheError::Copy(err.to_string())
    }
}

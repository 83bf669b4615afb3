//! Error taxonomy for the aggregation engine and its callers
//!
//! Three failure classes with distinct handling rules:
//! - `Validation` - bad trigger parameters, surfaced to the caller, never retried
//! - `Store` - store read/write failure, surfaced to the immediate caller;
//!   a scheduled tick logs it and moves on to the next cadence
//! - `CacheUnavailable` - soft failure; computation proceeds uncached

use std::fmt;

#[derive(Debug)]
pub enum EngineError {
    /// Malformed request parameters (bad date range, unknown node, bad month)
    Validation(String),
    /// Read/write failure against a telemetry, transaction, metadata, or analytics store
    Store(String),
    /// Result cache could not be reached; callers treat this as non-fatal
    CacheUnavailable(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Validation(msg) => write!(f, "Validation error: {}", msg),
            EngineError::Store(msg) => write!(f, "Store error: {}", msg),
            EngineError::CacheUnavailable(msg) => write!(f, "Cache unavailable: {}", msg),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        EngineError::Store(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Store(err.to_string())
    }
}

//! Error types for the presence engine.
//!
//! Per-response outcomes (rejected, flagged) are values, not errors: they
//! surface as [`crate::domain::AttendanceRecord`]s. The variants here cover
//! the residue: fatal configuration problems at init, evidence store
//! unavailability, and override failures.

use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur in the presence engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Bad secret or thresholds. Raised only at init; fatal.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The evidence store could not serve the request.
    ///
    /// Non-critical lookups degrade to "no history"; this escapes only when
    /// a required write or the caller-facing operation itself cannot proceed.
    #[error("evidence store unavailable: {0}")]
    Unavailable(String),

    /// The override actor was refused by the authorisation predicate.
    #[error("override not authorised for actor {actor_id}")]
    OverrideUnauthorized { actor_id: String },

    /// Override target does not exist or has left the store.
    #[error("attendance record not found: {0}")]
    RecordNotFound(Uuid),

    /// An override asked for a transition the outcome rules forbid.
    #[error("invalid override transition: {0}")]
    InvalidOverride(String),

    /// Internal JSON encoding failure.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Serialization(e.to_string())
    }
}

//! Canonical JSON encoding per RFC 8785 (JCS).
//!
//! A signed payload must hash identically on every client and on the server,
//! regardless of key order or whitespace. `serde_json_canonicalizer` gives
//! strict RFC 8785 output: lexicographic key order, no insignificant
//! whitespace, ES6 number serialization.

use crate::infra::{EngineError, Result};

/// Convert a JSON value to its canonical string representation.
///
/// Numbers that RFC 8785 cannot represent (NaN, Infinity) are rejected as a
/// serialization error rather than panicking; signed payloads are
/// attacker-supplied bytes.
pub fn canonicalize_json(value: &serde_json::Value) -> Result<String> {
    serde_json_canonicalizer::to_string(value)
        .map_err(|e| EngineError::Serialization(format!("canonical JSON: {e}")))
}

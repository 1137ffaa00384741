//! Cryptographic utilities for the presence engine.
//!
//! Provides:
//! - Canonical JSON encoding (deterministic, cross-language compatible)
//! - Keyed MAC over canonical payloads (HMAC-SHA256, constant-time verify)

mod canonical;
mod mac;

pub use canonical::*;
pub use mac::*;

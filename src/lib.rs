//! Presence Engine Library
//!
//! Server-side presence verification: issues time-bounded challenges per
//! session, validates signed responses against replay and tampering, scores
//! each response with an anti-proxy analysis, and commits attendance records
//! with an auditable evidence bundle.
//!
//! ## Modules
//!
//! - [`domain`] - Core domain types (challenges, responses, records)
//! - [`infra`] - Infrastructure (evidence store trait, in-memory store, keys)
//! - [`crypto`] - Cryptographic utilities (canonical JSON, keyed MAC)
//! - [`engine`] - Issuer, verifier, analyzer, compositor, reports
//! - [`config`] - Engine configuration
//! - [`clock`] - Injected time source
//! - [`metrics`] - Observability counters
//! - [`telemetry`] - Logging setup

pub mod clock;
pub mod config;
pub mod crypto;
pub mod domain;
pub mod engine;
pub mod infra;
pub mod metrics;
pub mod telemetry;

// Re-export commonly used types
pub use domain::{
    Analysis, AntiProxyFlags, AttendanceRecord, Challenge, DeviceId, Evidence, GeoLocation,
    OrganiserId, Outcome, ParticipantId, RiskBand, SessionId, SignalClass, SignedResponse,
    StructuralVerdict, VerdictKind,
};

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use engine::{OverrideAuthorizer, PresenceEngine, SessionReport};
pub use infra::{EngineError, EvidenceStore, MemoryEvidenceStore, Result};

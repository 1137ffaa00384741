//! Core domain types for the presence engine.

mod challenge;
mod record;
mod response;
mod types;

pub use challenge::Challenge;
pub use record::{
    Analysis, AntiProxyFlags, AttendanceRecord, BehavioralBaseline, EvidenceSummary,
    OverrideState, StructuralVerdict, VerdictKind, FLAG_WEIGHTS,
};
pub use response::{Evidence, GeoLocation, ResponsePayload, SignedResponse};
pub use types::{
    DeviceId, OrganiserId, Outcome, ParticipantId, ProximityFacts, RiskBand, SessionId,
    SignalClass,
};

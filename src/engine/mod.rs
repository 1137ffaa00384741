//! The presence verification engine's active components.
//!
//! Data flow per response: verifier -> analyzer -> compositor, with the
//! issuer running independently when a session is opened and the reporter
//! reading what the analyzer wrote.

mod analyzer;
mod compositor;
#[allow(clippy::module_inception)]
mod engine;
mod issuer;
mod report;
mod verifier;

pub use analyzer::AntiProxyAnalyzer;
pub use compositor::{OverrideAuthorizer, VerdictCompositor};
pub use engine::PresenceEngine;
pub use issuer::ChallengeIssuer;
pub use report::{RiskDistribution, SessionReport, SessionReporter};
pub use verifier::{ResponseVerifier, Verification, VerifiedIdentity};

//! Analysis output types: flags, risk weights, attendance records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{DeviceId, OrganiserId, ParticipantId, RiskBand, SessionId, SignalClass};

/// Fixed weight per flag. The risk score divides by the sum of the whole
/// table (not just tripped weights), preserving upstream client behaviour;
/// the score is monotone in the number of tripped flags by construction.
pub const FLAG_WEIGHTS: &[(&str, f64)] = &[
    ("weakSignal", 0.20),
    ("duplicateDevice", 0.30),
    ("invalidLocation", 0.25),
    ("suspiciousWifi", 0.15),
    ("lateResponse", 0.10),
    ("invalidChallenge", 0.40),
    ("rootedDevice", 0.35),
    ("mockedLocation", 0.30),
    ("unusualPattern", 0.20),
];

/// Closed set of anti-proxy flags, one per sub-analysis, plus an opaque
/// diagnostics map that is carried but never branched on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AntiProxyFlags {
    pub weak_signal: bool,
    pub duplicate_device: bool,
    pub invalid_location: bool,
    pub suspicious_wifi: bool,
    pub late_response: bool,
    pub invalid_challenge: bool,
    pub rooted_device: bool,
    pub mocked_location: bool,
    pub unusual_pattern: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, serde_json::Value>,
}

impl AntiProxyFlags {
    /// Flags paired with their wire names, in weight-table order.
    pub fn named(&self) -> [(&'static str, bool); 9] {
        [
            ("weakSignal", self.weak_signal),
            ("duplicateDevice", self.duplicate_device),
            ("invalidLocation", self.invalid_location),
            ("suspiciousWifi", self.suspicious_wifi),
            ("lateResponse", self.late_response),
            ("invalidChallenge", self.invalid_challenge),
            ("rootedDevice", self.rooted_device),
            ("mockedLocation", self.mocked_location),
            ("unusualPattern", self.unusual_pattern),
        ]
    }

    /// Names of tripped flags.
    pub fn tripped(&self) -> Vec<&'static str> {
        self.named()
            .into_iter()
            .filter(|(_, tripped)| *tripped)
            .map(|(name, _)| name)
            .collect()
    }

    pub fn any(&self) -> bool {
        self.named().into_iter().any(|(_, tripped)| tripped)
    }

    /// Normalised weighted score in [0, 100].
    pub fn risk_score(&self) -> u8 {
        let total: f64 = FLAG_WEIGHTS.iter().map(|(_, w)| w).sum();
        let tripped: f64 = self
            .named()
            .into_iter()
            .zip(FLAG_WEIGHTS.iter())
            .filter(|((_, tripped), _)| *tripped)
            .map(|(_, (_, weight))| weight)
            .sum();
        let score = (100.0 * tripped / total).round();
        score.clamp(0.0, 100.0) as u8
    }

    /// Attach a diagnostic detail. Details never influence flag decisions.
    pub fn detail(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        self.details.insert(key.to_string(), value.into());
    }
}

/// Verifier's pre-analyzer judgement of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictKind {
    /// Cryptographically sound and inside the validity window.
    Ok,
    /// Sound but stamped after the window closed.
    Expired,
    /// Structurally invalid: bad encoding, bad MAC, unknown or mismatched
    /// challenge.
    Fail,
}

/// Structural verdict plus the timing fact the verifier derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuralVerdict {
    pub kind: VerdictKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// `respondedAt - issuedAt`; absent when the challenge never resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_latency_ms: Option<i64>,
}

impl StructuralVerdict {
    pub fn ok(response_latency_ms: i64) -> Self {
        Self {
            kind: VerdictKind::Ok,
            reason: None,
            response_latency_ms: Some(response_latency_ms),
        }
    }

    pub fn expired(response_latency_ms: i64) -> Self {
        Self {
            kind: VerdictKind::Expired,
            reason: Some("response stamped after challenge expiry".to_string()),
            response_latency_ms: Some(response_latency_ms),
        }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            kind: VerdictKind::Fail,
            reason: Some(reason.into()),
            response_latency_ms: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.kind == VerdictKind::Ok
    }
}

/// Echoed, non-sensitive summary of the evidence an analysis was based on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceSummary {
    pub rssi: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal_class: Option<SignalClass>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_distance_m: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_latency_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wifi_network_count: Option<usize>,
    pub had_location: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attestation: Vec<String>,
}

/// Per-response analysis, persisted for seven days.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub analysis_id: Uuid,
    pub participant_id: ParticipantId,
    pub session_id: SessionId,
    pub timestamp_ms: i64,
    pub flags: AntiProxyFlags,
    pub risk_score: u8,
    pub risk_band: RiskBand,
    pub evidence: EvidenceSummary,
}

/// Human override decision recorded against a flagged record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverrideState {
    pub actor_id: OrganiserId,
    pub reason: String,
    pub new_outcome: super::Outcome,
    pub decided_at_ms: i64,
}

/// Committed attendance outcome, handed to the external durable store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub record_id: Uuid,
    pub session_id: SessionId,
    pub participant_id: ParticipantId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<DeviceId>,
    pub outcome: super::Outcome,
    pub risk_score: u8,
    pub flags: AntiProxyFlags,
    pub timestamp_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_state: Option<OverrideState>,
}

/// Rolling latency baseline per participant. An exponentially weighted
/// moving average, not unbounded history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BehavioralBaseline {
    pub mean_latency_ms: f64,
    pub variance_ms2: f64,
    pub samples: u64,
}

impl BehavioralBaseline {
    pub fn first(latency_ms: f64) -> Self {
        Self {
            mean_latency_ms: latency_ms,
            variance_ms2: 0.0,
            samples: 1,
        }
    }

    /// Fold in a new observation with smoothing factor `alpha`.
    pub fn observe(&mut self, latency_ms: f64, alpha: f64) {
        let delta = latency_ms - self.mean_latency_ms;
        self.variance_ms2 = (1.0 - alpha) * (self.variance_ms2 + alpha * delta * delta);
        self.mean_latency_ms += alpha * delta;
        self.samples = self.samples.saturating_add(1);
    }

    /// Deviation beyond half the baseline mean counts as unusual.
    pub fn is_unusual(&self, latency_ms: f64) -> bool {
        (latency_ms - self.mean_latency_ms).abs() > 0.5 * self.mean_latency_ms
    }
}

//! Core identifier and classification types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Session identifier (one scheduled gathering).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

/// Participant identifier, already authenticated by the external identity
/// provider. The engine never authenticates users.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub String);

/// Device identifier as reported by the participant client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub String);

/// Organiser identifier (the party that opened the session).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrganiserId(pub String);

macro_rules! string_id {
    ($name:ident) => {
        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(SessionId);
string_id!(ParticipantId);
string_id!(DeviceId);
string_id!(OrganiserId);

/// Radio signal strength classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalClass {
    Weak,
    Medium,
    Strong,
}

impl fmt::Display for SignalClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SignalClass::Weak => "weak",
            SignalClass::Medium => "medium",
            SignalClass::Strong => "strong",
        };
        write!(f, "{s}")
    }
}

/// Derived radio proximity facts. Computed per response, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProximityFacts {
    pub signal_class: SignalClass,
    /// Log-distance path loss estimate, metres. Informational only.
    pub estimated_distance_m: f64,
}

/// Final attendance outcome for a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Present,
    Flagged,
    Rejected,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Outcome::Present => "present",
            Outcome::Flagged => "flagged",
            Outcome::Rejected => "rejected",
        };
        write!(f, "{s}")
    }
}

/// Risk score classification band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskBand {
    Low,
    Medium,
    High,
}

impl RiskBand {
    /// Band boundaries: `< 30` low, `< 70` medium, else high.
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=29 => RiskBand::Low,
            30..=69 => RiskBand::Medium,
            _ => RiskBand::High,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_display_and_from() {
        let session = SessionId::from("sess-1");
        assert_eq!(session.as_str(), "sess-1");
        assert_eq!(session.to_string(), "sess-1");

        let participant = ParticipantId::new(String::from("stu-1"));
        assert_eq!(participant.0, "stu-1");
    }

    #[test]
    fn id_serde_is_transparent() {
        let device = DeviceId::from("dev-7");
        assert_eq!(serde_json::to_string(&device).unwrap(), "\"dev-7\"");
        let back: DeviceId = serde_json::from_str("\"dev-7\"").unwrap();
        assert_eq!(back, device);
    }

    #[test]
    fn outcome_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Outcome::Present).unwrap(), "\"present\"");
        assert_eq!(serde_json::to_string(&Outcome::Flagged).unwrap(), "\"flagged\"");
        assert_eq!(serde_json::to_string(&Outcome::Rejected).unwrap(), "\"rejected\"");
    }

    #[test]
    fn risk_bands() {
        assert_eq!(RiskBand::from_score(0), RiskBand::Low);
        assert_eq!(RiskBand::from_score(29), RiskBand::Low);
        assert_eq!(RiskBand::from_score(30), RiskBand::Medium);
        assert_eq!(RiskBand::from_score(69), RiskBand::Medium);
        assert_eq!(RiskBand::from_score(70), RiskBand::High);
        assert_eq!(RiskBand::from_score(100), RiskBand::High);
    }
}

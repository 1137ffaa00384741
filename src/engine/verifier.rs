//! Response verification.
//!
//! The verifier owns cryptography and challenge timing only; it never
//! inspects radio, location, or wireless evidence. Checks run in a fixed
//! order and short-circuit on the first fatal failure:
//!
//! 1. decode the outer wrapper
//! 2. MAC-verify the payload as received
//! 3. load the stored challenge (fail-closed)
//! 4. constant-time challenge code equality
//! 5. constant-time nonce equality
//! 6. expiry classification (expired responses continue to analysis)

use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::crypto::{tokens_equal, KeyedMac};
use crate::domain::{
    Challenge, DeviceId, ParticipantId, SessionId, SignedResponse, StructuralVerdict,
};
use crate::infra::{keys, EvidenceStore};

/// Identity fields extracted from a response payload.
///
/// `trusted` is set once the MAC has been verified; an untrusted identity is
/// carried for observability but never committed to an attendance slot.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedIdentity {
    pub participant_id: ParticipantId,
    pub device_id: DeviceId,
    pub session_id: SessionId,
    pub responded_at_ms: i64,
    pub trusted: bool,
}

/// Outcome of structural verification.
#[derive(Debug, Clone)]
pub struct Verification {
    pub verdict: StructuralVerdict,
    pub identity: Option<VerifiedIdentity>,
    pub challenge: Option<Challenge>,
}

impl Verification {
    fn fail(reason: &str, identity: Option<VerifiedIdentity>) -> Self {
        Self {
            verdict: StructuralVerdict::fail(reason),
            identity,
            challenge: None,
        }
    }
}

/// Decodes and structurally verifies signed responses.
pub struct ResponseVerifier {
    mac: KeyedMac,
    config: Arc<EngineConfig>,
    store: Arc<dyn EvidenceStore>,
    clock: Arc<dyn Clock>,
}

impl ResponseVerifier {
    pub fn new(
        mac: KeyedMac,
        config: Arc<EngineConfig>,
        store: Arc<dyn EvidenceStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            mac,
            config,
            store,
            clock,
        }
    }

    pub async fn verify(&self, blob: &str) -> Verification {
        // 1. Outer wrapper.
        let response = match SignedResponse::decode(blob) {
            Ok(response) => response,
            Err(reason) => {
                tracing::info!(%reason, "response blob rejected");
                return Verification::fail("malformed response blob", None);
            }
        };
        let payload = match response.parse_payload() {
            Ok(payload) => payload,
            Err(reason) => {
                tracing::info!(%reason, "response payload rejected");
                return Verification::fail("malformed payload", None);
            }
        };

        let mut identity = VerifiedIdentity {
            participant_id: payload.participant_id.clone(),
            device_id: payload.device_id.clone(),
            session_id: payload.session_id.clone(),
            responded_at_ms: payload.responded_at_ms,
            trusted: false,
        };

        // 2. MAC over the payload exactly as received.
        if !self.mac.verify(&response.payload, &response.signature) {
            tracing::info!(
                participant_id = %identity.participant_id,
                session_id = %identity.session_id,
                "response signature mismatch"
            );
            return Verification::fail("signature mismatch", Some(identity));
        }
        identity.trusted = true;

        // 3. Stored challenge; absence and store failure are both fatal.
        let challenge = match self.load_challenge(&identity.session_id).await {
            Some(challenge) => challenge,
            None => {
                return Verification::fail("no active challenge for session", Some(identity))
            }
        };

        // 4–5. Echoed secrets.
        if !tokens_equal(&payload.challenge_code, &challenge.challenge_code) {
            return Verification::fail("challenge code mismatch", Some(identity));
        }
        if !tokens_equal(&payload.nonce, &challenge.nonce) {
            return Verification::fail("nonce mismatch", Some(identity));
        }

        // 6. Timing relative to the challenge window.
        let response_latency_ms = payload.responded_at_ms - challenge.issued_at_ms;
        let verdict = if payload.responded_at_ms > challenge.expires_at_ms {
            StructuralVerdict::expired(response_latency_ms)
        } else {
            StructuralVerdict::ok(response_latency_ms)
        };

        Verification {
            verdict,
            identity: Some(identity),
            challenge: Some(challenge),
        }
    }

    /// Fail-closed challenge lookup: a missing challenge is a rejection, and
    /// so is a store that cannot answer within the validity window.
    async fn load_challenge(&self, session_id: &SessionId) -> Option<Challenge> {
        let key = keys::challenge(session_id);
        let deadline = Duration::from_millis(self.config.challenge_validity_ms as u64);
        let value = match tokio::time::timeout(deadline, self.store.get(&key)).await {
            Ok(Ok(value)) => value?,
            Ok(Err(e)) => {
                tracing::warn!(session_id = %session_id, error = %e, "challenge lookup failed");
                return None;
            }
            Err(_) => {
                tracing::warn!(session_id = %session_id, "challenge lookup timed out");
                return None;
            }
        };
        match serde_json::from_value(value) {
            Ok(challenge) => Some(challenge),
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "stored challenge unreadable");
                None
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn mac(&self) -> &KeyedMac {
        &self.mac
    }
}

//! Challenge issuing.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::domain::{Challenge, OrganiserId, SessionId};
use crate::infra::{keys, EvidenceStore, Result};

/// Mints time-bounded challenges and persists them for verification.
pub struct ChallengeIssuer {
    config: Arc<EngineConfig>,
    store: Arc<dyn EvidenceStore>,
    clock: Arc<dyn Clock>,
}

impl ChallengeIssuer {
    pub fn new(
        config: Arc<EngineConfig>,
        store: Arc<dyn EvidenceStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            store,
            clock,
        }
    }

    /// Issue a challenge for a session.
    ///
    /// Reissuing for the same session overwrites the prior challenge: any
    /// response signed against the old code will no longer verify.
    pub async fn issue(
        &self,
        session_id: SessionId,
        organiser_id: OrganiserId,
        metadata: Option<serde_json::Value>,
    ) -> Result<Challenge> {
        let key = keys::challenge(&session_id);
        if let Ok(Some(_)) = self.store.get(&key).await {
            tracing::warn!(
                session_id = %session_id,
                organiser_id = %organiser_id,
                "reissuing challenge; prior challenge is invalidated"
            );
        }

        let issued_at_ms = self.clock.now_ms();
        let challenge = Challenge {
            session_id: session_id.clone(),
            challenge_code: random_token(self.config.challenge_code_len),
            nonce: random_token(self.config.nonce_len),
            issued_at_ms,
            expires_at_ms: issued_at_ms + self.config.challenge_validity_ms,
            organiser_id,
            metadata,
        };

        let ttl = Duration::from_millis(self.config.challenge_ttl_ms() as u64);
        self.store
            .put_with_ttl(&key, serde_json::to_value(&challenge)?, ttl)
            .await?;

        tracing::info!(
            session_id = %session_id,
            expires_at_ms = challenge.expires_at_ms,
            "challenge issued"
        );
        Ok(challenge)
    }
}

/// URL-safe base64 text over `len` bytes from the OS entropy source.
fn random_token(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(&bytes)
}

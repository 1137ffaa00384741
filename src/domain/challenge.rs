//! Challenge entity.

use serde::{Deserialize, Serialize};

use super::{OrganiserId, SessionId};

/// Server-minted, time-bounded secret that a participant's signed response
/// must echo exactly. Immutable once issued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    pub session_id: SessionId,
    /// URL-safe base64 of >= 32 random bytes.
    pub challenge_code: String,
    /// URL-safe base64 of >= 16 random bytes; defeats replay across reissues.
    pub nonce: String,
    pub issued_at_ms: i64,
    pub expires_at_ms: i64,
    pub organiser_id: OrganiserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Challenge {
    /// Whether a response stamped at `responded_at_ms` falls inside the
    /// validity window. The boundary is inclusive on both ends.
    pub fn in_window(&self, responded_at_ms: i64) -> bool {
        responded_at_ms >= self.issued_at_ms && responded_at_ms <= self.expires_at_ms
    }

    /// Remaining validity at `now_ms`, in milliseconds; zero once expired.
    pub fn remaining_validity_ms(&self, now_ms: i64) -> i64 {
        (self.expires_at_ms - now_ms).max(0)
    }
}

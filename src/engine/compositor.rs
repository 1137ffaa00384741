//! Verdict composition and attendance commit.
//!
//! Merges the structural verdict and anti-proxy flags into a final outcome
//! and commits the record with compare-and-set semantics so two simultaneous
//! responses for the same (session, participant) pair cannot both win.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use super::verifier::VerifiedIdentity;
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::domain::{
    Analysis, AttendanceRecord, OrganiserId, Outcome, OverrideState, StructuralVerdict,
    VerdictKind,
};
use crate::infra::{keys, EngineError, EvidenceStore, Result};
use crate::metrics::EngineMetrics;

/// Authorisation predicate for human overrides, supplied by the caller at
/// engine construction.
pub trait OverrideAuthorizer: Send + Sync {
    fn authorize(&self, actor_id: &OrganiserId, record: &AttendanceRecord) -> bool;
}

impl<F> OverrideAuthorizer for F
where
    F: Fn(&OrganiserId, &AttendanceRecord) -> bool + Send + Sync,
{
    fn authorize(&self, actor_id: &OrganiserId, record: &AttendanceRecord) -> bool {
        self(actor_id, record)
    }
}

pub struct VerdictCompositor {
    config: Arc<EngineConfig>,
    store: Arc<dyn EvidenceStore>,
    clock: Arc<dyn Clock>,
    authorizer: Arc<dyn OverrideAuthorizer>,
    metrics: Arc<EngineMetrics>,
}

impl VerdictCompositor {
    pub fn new(
        config: Arc<EngineConfig>,
        store: Arc<dyn EvidenceStore>,
        clock: Arc<dyn Clock>,
        authorizer: Arc<dyn OverrideAuthorizer>,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            config,
            store,
            clock,
            authorizer,
            metrics,
        }
    }

    /// Merge verdict and analysis into the final record and commit it.
    pub async fn compose(
        &self,
        identity: &VerifiedIdentity,
        verdict: &StructuralVerdict,
        analysis: &Analysis,
    ) -> AttendanceRecord {
        let outcome = match verdict.kind {
            VerdictKind::Fail => Outcome::Rejected,
            VerdictKind::Expired => Outcome::Flagged,
            VerdictKind::Ok if analysis.flags.any() => Outcome::Flagged,
            VerdictKind::Ok => Outcome::Present,
        };
        let risk_score = match verdict.kind {
            VerdictKind::Fail => 100,
            _ => analysis.risk_score,
        };

        let record = AttendanceRecord {
            record_id: Uuid::new_v4(),
            session_id: identity.session_id.clone(),
            participant_id: identity.participant_id.clone(),
            device_id: Some(identity.device_id.clone()),
            outcome,
            risk_score,
            flags: analysis.flags.clone(),
            timestamp_ms: self.clock.now_ms(),
            override_state: None,
        };

        // Only structurally authenticated responses contend for the
        // attendance slot; a forged submission must not squat it.
        if identity.trusted && verdict.kind != VerdictKind::Fail {
            self.commit(record).await
        } else {
            record
        }
    }

    /// Compare-and-set commit. The first writer wins; a losing writer gets
    /// the stored record back, refreshed only if it was flagged.
    async fn commit(&self, record: AttendanceRecord) -> AttendanceRecord {
        let pair_key = keys::attendance(&record.session_id, &record.participant_id);
        let ttl = Duration::from_secs(self.config.analysis_ttl_sec);

        let value = match serde_json::to_value(&record) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(record_id = %record.record_id, error = %e, "record not serializable");
                return record;
            }
        };

        match self.store.put_if_absent(&pair_key, value, ttl).await {
            Ok(true) => {
                self.mirror_by_id(&record, ttl).await;
                record
            }
            Ok(false) => self.merge_duplicate(record, &pair_key, ttl).await,
            Err(e) => {
                // Degraded commit: the record still reaches the caller, the
                // uniqueness guarantee resumes when the store does.
                tracing::warn!(record_id = %record.record_id, error = %e, "attendance commit degraded");
                record
            }
        }
    }

    /// A second submission for an already-committed pair. The stored record
    /// stays canonical; if it was flagged, the fresh evidence replaces its
    /// flags and risk so a review sees the latest picture.
    async fn merge_duplicate(
        &self,
        fresh: AttendanceRecord,
        pair_key: &str,
        ttl: Duration,
    ) -> AttendanceRecord {
        let existing = match self.store.get(pair_key).await {
            Ok(Some(value)) => serde_json::from_value::<AttendanceRecord>(value).ok(),
            _ => None,
        };
        let Some(mut existing) = existing else {
            tracing::warn!(pair_key, "duplicate commit but stored record unreadable");
            return fresh;
        };

        self.metrics.record_duplicate_submission();
        tracing::info!(
            canonical_record_id = %existing.record_id,
            duplicate_record_id = %fresh.record_id,
            session_id = %existing.session_id,
            participant_id = %existing.participant_id,
            "duplicate submission for committed pair"
        );

        if existing.outcome == Outcome::Flagged && existing.override_state.is_none() {
            existing.flags = fresh.flags;
            existing.risk_score = fresh.risk_score;
            existing.timestamp_ms = fresh.timestamp_ms;
            if let Ok(value) = serde_json::to_value(&existing) {
                if let Err(e) = self.store.put_with_ttl(pair_key, value, ttl).await {
                    tracing::warn!(pair_key, error = %e, "evidence refresh write failed");
                }
                self.mirror_by_id(&existing, ttl).await;
            }
        }
        existing
    }

    async fn mirror_by_id(&self, record: &AttendanceRecord, ttl: Duration) {
        let key = keys::attendance_by_id(record.record_id);
        if let Ok(value) = serde_json::to_value(record) {
            if let Err(e) = self.store.put_with_ttl(&key, value, ttl).await {
                tracing::warn!(record_id = %record.record_id, error = %e, "record mirror write failed");
            }
        }
    }

    /// Apply a human override to a flagged record.
    ///
    /// Only `flagged -> present | rejected` transitions are allowed, and only
    /// for actors the authorisation predicate accepts.
    pub async fn apply_override(
        &self,
        record_id: Uuid,
        actor_id: OrganiserId,
        reason: String,
        new_outcome: Outcome,
    ) -> Result<AttendanceRecord> {
        let key = keys::attendance_by_id(record_id);
        let value = self
            .store
            .get(&key)
            .await
            .map_err(|e| EngineError::Unavailable(e.to_string()))?
            .ok_or(EngineError::RecordNotFound(record_id))?;
        let mut record: AttendanceRecord = serde_json::from_value(value)?;

        if record.outcome != Outcome::Flagged {
            return Err(EngineError::InvalidOverride(format!(
                "record is {}, only flagged records can be overridden",
                record.outcome
            )));
        }
        if new_outcome == Outcome::Flagged {
            return Err(EngineError::InvalidOverride(
                "override must resolve to present or rejected".to_string(),
            ));
        }
        if !self.authorizer.authorize(&actor_id, &record) {
            return Err(EngineError::OverrideUnauthorized {
                actor_id: actor_id.to_string(),
            });
        }

        record.override_state = Some(OverrideState {
            actor_id: actor_id.clone(),
            reason,
            new_outcome,
            decided_at_ms: self.clock.now_ms(),
        });
        record.outcome = new_outcome;

        let ttl = Duration::from_secs(self.config.analysis_ttl_sec);
        let value = serde_json::to_value(&record)?;
        self.store.put_with_ttl(&key, value.clone(), ttl).await?;
        let pair_key = keys::attendance(&record.session_id, &record.participant_id);
        self.store.put_with_ttl(&pair_key, value, ttl).await?;

        self.metrics.record_override();
        tracing::info!(
            record_id = %record.record_id,
            actor_id = %actor_id,
            outcome = %record.outcome,
            "override applied"
        );
        Ok(record)
    }
}

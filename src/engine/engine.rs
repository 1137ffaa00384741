//! Engine facade.
//!
//! An explicit value constructed once at process init and passed by
//! reference to handlers. Holds the only copies of the configuration, the
//! MAC, and the evidence store handle; there is no per-request global state.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretVec};
use uuid::Uuid;

use super::analyzer::AntiProxyAnalyzer;
use super::compositor::{OverrideAuthorizer, VerdictCompositor};
use super::issuer::ChallengeIssuer;
use super::report::{SessionReport, SessionReporter};
use super::verifier::ResponseVerifier;
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::crypto::KeyedMac;
use crate::domain::{
    AntiProxyFlags, AttendanceRecord, Challenge, Evidence, OrganiserId, Outcome, ParticipantId,
    SessionId, StructuralVerdict,
};
use crate::infra::{EvidenceStore, Result};
use crate::metrics::EngineMetrics;

/// Presence verification engine.
pub struct PresenceEngine {
    issuer: ChallengeIssuer,
    verifier: ResponseVerifier,
    analyzer: AntiProxyAnalyzer,
    compositor: VerdictCompositor,
    reporter: SessionReporter,
    clock: Arc<dyn Clock>,
    metrics: Arc<EngineMetrics>,
}

impl PresenceEngine {
    /// Construct the engine. Validates configuration; the returned error is
    /// the only fatal error the engine ever raises.
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn EvidenceStore>,
        clock: Arc<dyn Clock>,
        authorizer: Arc<dyn OverrideAuthorizer>,
    ) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let metrics = Arc::new(EngineMetrics::new());
        let mac = KeyedMac::new(SecretVec::new(config.secret.expose_secret().clone()));

        Ok(Self {
            issuer: ChallengeIssuer::new(config.clone(), store.clone(), clock.clone()),
            verifier: ResponseVerifier::new(mac, config.clone(), store.clone(), clock.clone()),
            analyzer: AntiProxyAnalyzer::new(config.clone(), store.clone(), clock.clone()),
            compositor: VerdictCompositor::new(
                config,
                store.clone(),
                clock.clone(),
                authorizer,
                metrics.clone(),
            ),
            reporter: SessionReporter::new(store),
            clock,
            metrics,
        })
    }

    /// Construct with the operating-system clock.
    pub fn with_system_clock(
        config: EngineConfig,
        store: Arc<dyn EvidenceStore>,
        authorizer: Arc<dyn OverrideAuthorizer>,
    ) -> Result<Self> {
        Self::new(config, store, Arc::new(SystemClock), authorizer)
    }

    /// Open a challenge for a session.
    pub async fn issue_challenge(
        &self,
        session_id: SessionId,
        organiser_id: OrganiserId,
        metadata: Option<serde_json::Value>,
    ) -> Result<Challenge> {
        let challenge = self.issuer.issue(session_id, organiser_id, metadata).await?;
        self.metrics.record_challenge_issued();
        Ok(challenge)
    }

    /// Verify one signed response with its evidence bundle.
    ///
    /// Every per-response outcome is a record: structural rejections come
    /// back as `rejected`, not as errors.
    pub async fn verify_response(
        &self,
        blob: &str,
        evidence: &Evidence,
    ) -> Result<AttendanceRecord> {
        let verification = self.verifier.verify(blob).await;

        let record = match &verification.identity {
            Some(identity) => {
                let analysis = self
                    .analyzer
                    .analyze(
                        identity,
                        evidence,
                        &verification.verdict,
                        verification.challenge.as_ref(),
                    )
                    .await;
                let record = self
                    .compositor
                    .compose(identity, &verification.verdict, &analysis)
                    .await;

                tracing::info!(
                    analysis_id = %analysis.analysis_id,
                    participant_id = %identity.participant_id,
                    session_id = %identity.session_id,
                    outcome = %record.outcome,
                    risk_score = record.risk_score,
                    "response verified"
                );
                record
            }
            None => self.rejected_without_identity(&verification.verdict),
        };

        self.metrics.record_response(record.outcome);
        Ok(record)
    }

    /// A blob that never yielded a payload carries no identity to key a
    /// record by; the rejection is returned but not committed anywhere.
    fn rejected_without_identity(&self, verdict: &StructuralVerdict) -> AttendanceRecord {
        let mut flags = AntiProxyFlags::default();
        flags.invalid_challenge = true;
        if let Some(reason) = &verdict.reason {
            flags.detail("structuralReason", reason.clone());
        }

        tracing::info!(
            reason = verdict.reason.as_deref().unwrap_or("unknown"),
            "undecodable response rejected"
        );
        AttendanceRecord {
            record_id: Uuid::new_v4(),
            session_id: SessionId::new(""),
            participant_id: ParticipantId::new(""),
            device_id: None,
            outcome: Outcome::Rejected,
            risk_score: 100,
            flags,
            timestamp_ms: self.clock.now_ms(),
            override_state: None,
        }
    }

    /// Aggregate report over every analysis recorded for a session.
    pub async fn session_report(&self, session_id: SessionId) -> Result<SessionReport> {
        self.reporter.report(session_id).await
    }

    /// Apply an authorised human override to a flagged record.
    pub async fn apply_override(
        &self,
        record_id: Uuid,
        actor_id: OrganiserId,
        reason: String,
        new_outcome: Outcome,
    ) -> Result<AttendanceRecord> {
        self.compositor
            .apply_override(record_id, actor_id, reason, new_outcome)
            .await
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }
}

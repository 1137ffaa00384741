//! Anti-proxy analysis.
//!
//! Runs a fixed battery of sub-analyses over the evidence bundle of a
//! structurally authenticated response: radio signal, response timing,
//! location plausibility, wireless environment, device binding, behavioral
//! deviation. Each contributes flags to an accumulator; the flags fold into
//! a bounded risk score.
//!
//! History lookups are fail-open under a deadline derived from the
//! challenge's remaining validity: a store that cannot answer in time is
//! treated as "no prior data". Only the verifier's challenge lookup is
//! fail-closed.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use super::verifier::VerifiedIdentity;
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::domain::{
    Analysis, AntiProxyFlags, BehavioralBaseline, Challenge, Evidence, EvidenceSummary,
    GeoLocation, ProximityFacts, RiskBand, SignalClass, StructuralVerdict, VerdictKind,
};
use crate::infra::{keys, EvidenceStore};

/// Mean Earth radius for great-circle distances, metres.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Floor for history-lookup deadlines so a near-expiry response can still
/// consult the store.
const MIN_DEADLINE_MS: i64 = 250;

pub struct AntiProxyAnalyzer {
    config: Arc<EngineConfig>,
    store: Arc<dyn EvidenceStore>,
    clock: Arc<dyn Clock>,
}

impl AntiProxyAnalyzer {
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

    /// Analyze one response and persist the resulting [`Analysis`].
    pub async fn analyze(
        &self,
        identity: &VerifiedIdentity,
        evidence: &Evidence,
        verdict: &StructuralVerdict,
        challenge: Option<&Challenge>,
    ) -> Analysis {
        let now_ms = self.clock.now_ms();
        let deadline = self.deadline(challenge, now_ms);

        let mut flags = AntiProxyFlags::default();
        if !identity.trusted {
            flags.detail("identityTrusted", false);
        }

        let analysis = if verdict.kind == VerdictKind::Fail {
            // Structurally invalid: the evidence is unauthenticated noise, so
            // the battery is skipped and only the rejection itself is scored.
            flags.invalid_challenge = true;
            if let Some(reason) = &verdict.reason {
                flags.detail("structuralReason", reason.clone());
            }
            self.build(identity, evidence, verdict, flags, now_ms, 100)
        } else {
            if verdict.kind == VerdictKind::Expired {
                flags.late_response = true;
            }

            let proximity = self.analyze_signal(evidence, &mut flags);
            self.analyze_timing(verdict, &mut flags);
            self.analyze_location(identity, evidence, now_ms, deadline, &mut flags)
                .await;
            self.analyze_wifi(evidence, &mut flags);
            self.analyze_device(identity, evidence, deadline, &mut flags)
                .await;
            self.analyze_behavior(identity, verdict, deadline, &mut flags)
                .await;

            let risk_score = flags.risk_score();
            let mut analysis =
                self.build(identity, evidence, verdict, flags, now_ms, risk_score);
            analysis.evidence.signal_class = Some(proximity.signal_class);
            analysis.evidence.estimated_distance_m =
                Some(round2(proximity.estimated_distance_m));
            analysis
        };

        self.persist(&analysis, deadline).await;
        analysis
    }

    fn deadline(&self, challenge: Option<&Challenge>, now_ms: i64) -> Duration {
        let budget = challenge
            .map(|c| c.remaining_validity_ms(now_ms))
            .unwrap_or(MIN_DEADLINE_MS)
            .clamp(MIN_DEADLINE_MS, self.config.challenge_validity_ms);
        Duration::from_millis(budget as u64)
    }

    /// (a) Radio proximity. The distance estimate is log-distance path loss
    /// with a -69 dBm reference at one metre; informational only.
    fn analyze_signal(&self, evidence: &Evidence, flags: &mut AntiProxyFlags) -> ProximityFacts {
        let signal_class = if evidence.rssi <= self.config.rssi_weak_threshold {
            SignalClass::Weak
        } else if evidence.rssi <= self.config.rssi_medium_threshold {
            SignalClass::Medium
        } else {
            SignalClass::Strong
        };
        flags.weak_signal = signal_class == SignalClass::Weak;

        let estimated_distance_m = 10f64.powf((-69.0 - evidence.rssi as f64) / 20.0);
        ProximityFacts {
            signal_class,
            estimated_distance_m,
        }
    }

    /// (b) Response timing against the challenge issue time.
    fn analyze_timing(&self, verdict: &StructuralVerdict, flags: &mut AntiProxyFlags) {
        let Some(latency_ms) = verdict.response_latency_ms else {
            return;
        };
        if latency_ms > self.config.response_max_reasonable_ms {
            flags.late_response = true;
        }
        if latency_ms < self.config.response_suspicious_fast_ms {
            flags.unusual_pattern = true;
        }
        // Between suspicious-fast and minimum-human is noted but not flagged.
        if latency_ms >= self.config.response_suspicious_fast_ms
            && latency_ms < self.config.response_min_human_ms
        {
            flags.detail("fasterThanTypicalHuman", true);
        }
    }

    /// (c) Location plausibility and jump detection against the stored last
    /// location; the current fix is stored afterwards either way.
    async fn analyze_location(
        &self,
        identity: &VerifiedIdentity,
        evidence: &Evidence,
        now_ms: i64,
        deadline: Duration,
        flags: &mut AntiProxyFlags,
    ) {
        let Some(location) = evidence.location else {
            return;
        };

        if location.lat == 0.0 && location.lon == 0.0 {
            flags.invalid_location = true;
            flags.detail("locationReason", "null island coordinates");
        }
        if location.accuracy_m < 1.0 {
            flags.mocked_location = true;
            flags.detail("reportedAccuracyM", location.accuracy_m);
        }
        if location.timestamp_ms > now_ms + self.config.challenge_validity_ms {
            flags.invalid_location = true;
            flags.detail("locationReason", "timestamp in the future");
        }

        let key = keys::last_location(&identity.participant_id);
        if let Some(value) = self.load(&key, deadline).await {
            if let Ok(last) = serde_json::from_value::<GeoLocation>(value) {
                let distance_m =
                    haversine_m(last.lat, last.lon, location.lat, location.lon);
                let elapsed_ms = (location.timestamp_ms - last.timestamp_ms).max(0);
                if distance_m > self.config.location_jump_distance_m
                    && elapsed_ms < self.config.location_min_movement_time_ms
                {
                    flags.invalid_location = true;
                    flags.detail("locationJumpM", round2(distance_m));
                    flags.detail("locationJumpElapsedMs", elapsed_ms);
                }
            }
        }

        let ttl = Duration::from_secs(self.config.location_ttl_sec);
        if let Ok(value) = serde_json::to_value(location) {
            self.save(&key, value, ttl, deadline).await;
        }
    }

    /// (d) Wireless environment. Only runs when the client scanned at all;
    /// a supplied empty list is itself suspicious.
    fn analyze_wifi(&self, evidence: &Evidence, flags: &mut AntiProxyFlags) {
        let Some(networks) = &evidence.wifi_networks else {
            return;
        };

        let count = networks.len();
        if count < self.config.wifi_min_expected || count > self.config.wifi_max_reasonable {
            flags.suspicious_wifi = true;
            flags.detail("wifiNetworkCount", count);
        }

        // Case-insensitive substring match so decorated SSIDs still hit.
        for ssid in networks {
            let upper = ssid.to_uppercase();
            if let Some(hit) = self
                .config
                .wifi_blacklist
                .iter()
                .find(|entry| upper.contains(entry.as_str()))
            {
                flags.suspicious_wifi = true;
                flags.detail("wifiBlacklistHit", hit.clone());
                break;
            }
        }
    }

    /// (e) Device binding and attestation.
    async fn analyze_device(
        &self,
        identity: &VerifiedIdentity,
        evidence: &Evidence,
        deadline: Duration,
        flags: &mut AntiProxyFlags,
    ) {
        let key = keys::device_usage(&identity.device_id);
        let users = self.members(&key, deadline).await;
        let others: Vec<&String> = users
            .iter()
            .filter(|user| user.as_str() != identity.participant_id.as_str())
            .collect();
        if !others.is_empty() {
            flags.duplicate_device = true;
            flags.detail(
                "deviceSharedWith",
                serde_json::json!(others.iter().map(|s| s.as_str()).collect::<Vec<_>>()),
            );
        }

        if let Some(attestation) = &evidence.device_attestation {
            let hit: Vec<&String> = attestation
                .iter()
                .filter(|token| {
                    self.config
                        .attestation_blacklist
                        .iter()
                        .any(|bad| bad.eq_ignore_ascii_case(token))
                })
                .collect();
            if !hit.is_empty() {
                flags.rooted_device = true;
                flags.detail(
                    "attestationTokens",
                    serde_json::json!(hit.iter().map(|s| s.as_str()).collect::<Vec<_>>()),
                );
            }
        }

        let ttl = Duration::from_secs(self.config.device_usage_ttl_sec);
        self.append(&key, identity.participant_id.as_str(), ttl, deadline)
            .await;
    }

    /// (f) Behavioral deviation against the rolling latency baseline.
    async fn analyze_behavior(
        &self,
        identity: &VerifiedIdentity,
        verdict: &StructuralVerdict,
        deadline: Duration,
        flags: &mut AntiProxyFlags,
    ) {
        let Some(latency_ms) = verdict.response_latency_ms else {
            return;
        };
        let latency = latency_ms as f64;
        let key = keys::behavioral_baseline(&identity.participant_id);

        let baseline = self
            .load(&key, deadline)
            .await
            .and_then(|value| serde_json::from_value::<BehavioralBaseline>(value).ok());

        if let Some(baseline) = &baseline {
            if baseline.is_unusual(latency) {
                flags.unusual_pattern = true;
                flags.detail("baselineMeanMs", round2(baseline.mean_latency_ms));
                flags.detail("observedLatencyMs", latency_ms);
            }
        }

        // Only verified-in-window responses feed the baseline; expired
        // latencies would drag the mean toward the timeout ceiling.
        if verdict.is_ok() {
            let updated = match baseline {
                Some(mut baseline) => {
                    baseline.observe(latency, self.config.behavioral_alpha);
                    baseline
                }
                None => BehavioralBaseline::first(latency),
            };
            let ttl = Duration::from_secs(self.config.analysis_ttl_sec);
            if let Ok(value) = serde_json::to_value(updated) {
                self.save(&key, value, ttl, deadline).await;
            }
        }
    }

    fn build(
        &self,
        identity: &VerifiedIdentity,
        evidence: &Evidence,
        verdict: &StructuralVerdict,
        flags: AntiProxyFlags,
        now_ms: i64,
        risk_score: u8,
    ) -> Analysis {
        Analysis {
            analysis_id: Uuid::new_v4(),
            participant_id: identity.participant_id.clone(),
            session_id: identity.session_id.clone(),
            timestamp_ms: now_ms,
            risk_band: RiskBand::from_score(risk_score),
            risk_score,
            flags,
            evidence: EvidenceSummary {
                rssi: evidence.rssi,
                signal_class: None,
                estimated_distance_m: None,
                response_latency_ms: verdict.response_latency_ms,
                wifi_network_count: evidence.wifi_networks.as_ref().map(Vec::len),
                had_location: evidence.location.is_some(),
                attestation: evidence.device_attestation.clone().unwrap_or_default(),
            },
        }
    }

    /// Write the analysis and its session-index member. Best effort: a store
    /// outage loses observability, never the verdict.
    async fn persist(&self, analysis: &Analysis, deadline: Duration) {
        let ttl = Duration::from_secs(self.config.analysis_ttl_sec);
        let key = keys::analysis(&analysis.participant_id, analysis.timestamp_ms);
        match serde_json::to_value(analysis) {
            Ok(value) => {
                self.save(&key, value, ttl, deadline).await;
                self.append(
                    &keys::analyses_by_session(&analysis.session_id),
                    &key,
                    ttl,
                    deadline,
                )
                .await;
            }
            Err(e) => {
                tracing::warn!(analysis_id = %analysis.analysis_id, error = %e, "analysis not serializable");
            }
        }
    }

    async fn load(&self, key: &str, deadline: Duration) -> Option<serde_json::Value> {
        match tokio::time::timeout(deadline, self.store.get(key)).await {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                tracing::debug!(key, error = %e, "history read degraded to no prior data");
                None
            }
            Err(_) => {
                tracing::debug!(key, "history read deadline missed");
                None
            }
        }
    }

    async fn save(&self, key: &str, value: serde_json::Value, ttl: Duration, deadline: Duration) {
        match tokio::time::timeout(deadline, self.store.put_with_ttl(key, value, ttl)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(key, error = %e, "history write failed"),
            Err(_) => tracing::warn!(key, "history write deadline missed"),
        }
    }

    async fn append(&self, key: &str, member: &str, ttl: Duration, deadline: Duration) {
        match tokio::time::timeout(deadline, self.store.append_set_member(key, member, ttl))
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(key, error = %e, "set append failed"),
            Err(_) => tracing::warn!(key, "set append deadline missed"),
        }
    }

    async fn members(&self, key: &str, deadline: Duration) -> Vec<String> {
        match tokio::time::timeout(deadline, self.store.set_members(key)).await {
            Ok(Ok(members)) => members,
            Ok(Err(e)) => {
                tracing::debug!(key, error = %e, "set read degraded to empty");
                Vec::new()
            }
            Err(_) => {
                tracing::debug!(key, "set read deadline missed");
                Vec::new()
            }
        }
    }
}

/// Great-circle distance between two coordinates, metres.
fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

//! Per-session reporting.
//!
//! Reports read the `analyses:by-session:{sessionId}` index written at
//! analysis time, then load each analysis by key. No keyspace scan.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::{Analysis, RiskBand, SessionId};
use crate::infra::{keys, EngineError, EvidenceStore, Result};

/// Flagged share above which attendance policies deserve a review.
const FLAGGED_RATIO_THRESHOLD: f64 = 0.10;

/// Weak-signal count above which the radio deployment deserves a check.
const WEAK_SIGNAL_COUNT_THRESHOLD: u64 = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskDistribution {
    pub low: u64,
    pub medium: u64,
    pub high: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: SessionId,
    pub total_responses: u64,
    pub flagged_responses: u64,
    pub risk_distribution: RiskDistribution,
    pub flag_type_counts: BTreeMap<String, u64>,
    pub recommendations: Vec<String>,
}

pub struct SessionReporter {
    store: Arc<dyn EvidenceStore>,
}

impl SessionReporter {
    pub fn new(store: Arc<dyn EvidenceStore>) -> Self {
        Self { store }
    }

    pub async fn report(&self, session_id: SessionId) -> Result<SessionReport> {
        let index_key = keys::analyses_by_session(&session_id);
        let analysis_keys = self
            .store
            .set_members(&index_key)
            .await
            .map_err(|e| EngineError::Unavailable(e.to_string()))?;

        let mut analyses = Vec::with_capacity(analysis_keys.len());
        for key in &analysis_keys {
            match self.store.get(key).await {
                Ok(Some(value)) => {
                    match serde_json::from_value::<Analysis>(value) {
                        Ok(analysis) => analyses.push(analysis),
                        Err(e) => {
                            tracing::warn!(key, error = %e, "stored analysis unreadable")
                        }
                    }
                }
                Ok(None) => {} // analysis expired ahead of its index member
                Err(e) => tracing::warn!(key, error = %e, "analysis read failed"),
            }
        }

        Ok(build_report(session_id, &analyses))
    }
}

fn build_report(session_id: SessionId, analyses: &[Analysis]) -> SessionReport {
    let total_responses = analyses.len() as u64;
    let flagged_responses = analyses.iter().filter(|a| a.flags.any()).count() as u64;

    let mut risk_distribution = RiskDistribution::default();
    for analysis in analyses {
        match analysis.risk_band {
            RiskBand::Low => risk_distribution.low += 1,
            RiskBand::Medium => risk_distribution.medium += 1,
            RiskBand::High => risk_distribution.high += 1,
        }
    }

    let mut flag_type_counts: BTreeMap<String, u64> = BTreeMap::new();
    for analysis in analyses {
        for (name, tripped) in analysis.flags.named() {
            if tripped {
                *flag_type_counts.entry(name.to_string()).or_default() += 1;
            }
        }
    }

    let mut recommendations = Vec::new();
    if total_responses > 0
        && flagged_responses as f64 / total_responses as f64 > FLAGGED_RATIO_THRESHOLD
    {
        recommendations.push("review attendance policies".to_string());
    }
    if flag_type_counts.get("duplicateDevice").copied().unwrap_or(0) > 0 {
        recommendations.push("enforce device binding".to_string());
    }
    if flag_type_counts.get("weakSignal").copied().unwrap_or(0) > WEAK_SIGNAL_COUNT_THRESHOLD {
        recommendations.push("check short-range radio range".to_string());
    }

    SessionReport {
        session_id,
        total_responses,
        flagged_responses,
        risk_distribution,
        flag_type_counts,
        recommendations,
    }
}

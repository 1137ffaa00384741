//! Metrics for the presence engine.
//!
//! Monotonic counters over the engine's hot paths, cheap enough to update on
//! every response. Rendered as Prometheus text for whatever scrape surface
//! the host process exposes.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct EngineMetrics {
    challenges_issued: AtomicU64,
    responses_total: AtomicU64,
    responses_present: AtomicU64,
    responses_flagged: AtomicU64,
    responses_rejected: AtomicU64,
    duplicate_submissions: AtomicU64,
    overrides_applied: AtomicU64,
}

/// Point-in-time snapshot of all counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub challenges_issued: u64,
    pub responses_total: u64,
    pub responses_present: u64,
    pub responses_flagged: u64,
    pub responses_rejected: u64,
    pub duplicate_submissions: u64,
    pub overrides_applied: u64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_challenge_issued(&self) {
        self.challenges_issued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_response(&self, outcome: crate::domain::Outcome) {
        self.responses_total.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            crate::domain::Outcome::Present => &self.responses_present,
            crate::domain::Outcome::Flagged => &self.responses_flagged,
            crate::domain::Outcome::Rejected => &self.responses_rejected,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate_submission(&self) {
        self.duplicate_submissions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_override(&self) {
        self.overrides_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            challenges_issued: self.challenges_issued.load(Ordering::Relaxed),
            responses_total: self.responses_total.load(Ordering::Relaxed),
            responses_present: self.responses_present.load(Ordering::Relaxed),
            responses_flagged: self.responses_flagged.load(Ordering::Relaxed),
            responses_rejected: self.responses_rejected.load(Ordering::Relaxed),
            duplicate_submissions: self.duplicate_submissions.load(Ordering::Relaxed),
            overrides_applied: self.overrides_applied.load(Ordering::Relaxed),
        }
    }

    /// Render in Prometheus exposition format.
    pub fn render_prometheus(&self) -> String {
        let s = self.snapshot();
        let mut out = String::new();
        for (name, value) in [
            ("presence_challenges_issued_total", s.challenges_issued),
            ("presence_responses_total", s.responses_total),
            ("presence_responses_present_total", s.responses_present),
            ("presence_responses_flagged_total", s.responses_flagged),
            ("presence_responses_rejected_total", s.responses_rejected),
            (
                "presence_duplicate_submissions_total",
                s.duplicate_submissions,
            ),
            ("presence_overrides_applied_total", s.overrides_applied),
        ] {
            out.push_str(&format!("# TYPE {name} counter\n{name} {value}\n"));
        }
        out
    }
}

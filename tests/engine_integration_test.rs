//! End-to-end tests of the presence verification flow:
//! challenge issue -> signed response -> anti-proxy analysis -> record.

mod common;

use common::*;
use presence_engine::{EvidenceStore, GeoLocation, Outcome};

// ============================================================================
// Scenario 1: happy path
// ============================================================================

#[tokio::test]
async fn happy_path_is_present_with_zero_risk() {
    let h = harness();
    let challenge = h
        .engine
        .issue_challenge(SESSION.into(), ORGANISER.into(), None)
        .await
        .unwrap();

    h.clock.set(4_200);
    let blob = signed_blob(&challenge, PARTICIPANT, DEVICE, 4_200);
    let record = h
        .engine
        .verify_response(&blob, &clean_evidence())
        .await
        .unwrap();

    assert_eq!(record.outcome, Outcome::Present);
    assert_eq!(record.risk_score, 0);
    assert!(!record.flags.any());
    assert_eq!(record.participant_id.as_str(), PARTICIPANT);
    assert_eq!(record.session_id.as_str(), SESSION);

    let snapshot = h.engine.metrics().snapshot();
    assert_eq!(snapshot.responses_present, 1);
    assert_eq!(snapshot.challenges_issued, 1);
}

// ============================================================================
// Scenario 2: replay of the same signed response
// ============================================================================

#[tokio::test]
async fn replayed_response_does_not_displace_the_record() {
    let h = harness();
    let challenge = h
        .engine
        .issue_challenge(SESSION.into(), ORGANISER.into(), None)
        .await
        .unwrap();

    h.clock.set(4_200);
    let blob = signed_blob(&challenge, PARTICIPANT, DEVICE, 4_200);
    let first = h
        .engine
        .verify_response(&blob, &clean_evidence())
        .await
        .unwrap();
    assert_eq!(first.outcome, Outcome::Present);

    // Same blob again, a moment later.
    h.clock.advance(500);
    let second = h
        .engine
        .verify_response(&blob, &clean_evidence())
        .await
        .unwrap();

    // The canonical record is unchanged.
    assert_eq!(second.record_id, first.record_id);
    assert_eq!(second.outcome, Outcome::Present);
    assert_eq!(h.engine.metrics().snapshot().duplicate_submissions, 1);

    // Both analyses were still stored.
    let report = h.engine.session_report(SESSION.into()).await.unwrap();
    assert_eq!(report.total_responses, 2);
}

// ============================================================================
// Scenario 3: weak signal plus implausible location jump
// ============================================================================

#[tokio::test]
async fn weak_signal_and_location_jump_flags_at_risk_twenty() {
    let h = harness();

    // Last known fix ~1.5 km south, 10 s before the response.
    let prior = GeoLocation {
        lat: 52.5065,
        lon: 13.4050,
        accuracy_m: 8.0,
        timestamp_ms: -5_800,
    };
    h.store
        .put_with_ttl(
            &format!("location:{PARTICIPANT}:last"),
            serde_json::to_value(prior).unwrap(),
            std::time::Duration::from_secs(3_600),
        )
        .await
        .unwrap();

    let challenge = h
        .engine
        .issue_challenge(SESSION.into(), ORGANISER.into(), None)
        .await
        .unwrap();

    h.clock.set(4_200);
    let mut evidence = clean_evidence();
    evidence.rssi = -82;
    let blob = signed_blob(&challenge, PARTICIPANT, DEVICE, 4_200);
    let record = h.engine.verify_response(&blob, &evidence).await.unwrap();

    assert_eq!(record.outcome, Outcome::Flagged);
    assert!(record.flags.weak_signal);
    assert!(record.flags.invalid_location);
    // (0.20 + 0.25) / 2.25 of 100, rounded.
    assert_eq!(record.risk_score, 20);
}

// ============================================================================
// Scenario 4: expired challenge
// ============================================================================

#[tokio::test]
async fn late_response_is_flagged_not_rejected() {
    let h = harness();
    let challenge = h
        .engine
        .issue_challenge(SESSION.into(), ORGANISER.into(), None)
        .await
        .unwrap();
    assert_eq!(challenge.expires_at_ms, 15_000);

    h.clock.set(16_000);
    let blob = signed_blob(&challenge, PARTICIPANT, DEVICE, 16_000);
    let record = h
        .engine
        .verify_response(&blob, &clean_evidence())
        .await
        .unwrap();

    assert_eq!(record.outcome, Outcome::Flagged);
    assert!(record.flags.late_response);

    // The record was still committed.
    let stored = h
        .store
        .get(&format!("attendance:{SESSION}:{PARTICIPANT}"))
        .await
        .unwrap();
    assert!(stored.is_some());
}

// ============================================================================
// Scenario 5: device shared across participants
// ============================================================================

#[tokio::test]
async fn second_participant_on_same_device_is_flagged() {
    let h = harness();
    let challenge = h
        .engine
        .issue_challenge(SESSION.into(), ORGANISER.into(), None)
        .await
        .unwrap();

    h.clock.set(3_000);
    let blob = signed_blob(&challenge, PARTICIPANT, DEVICE, 3_000);
    let first = h
        .engine
        .verify_response(&blob, &clean_evidence())
        .await
        .unwrap();
    assert_eq!(first.outcome, Outcome::Present);

    // Different participant, same device, same session.
    h.clock.set(5_000);
    let blob = signed_blob(&challenge, "stu-beta", DEVICE, 5_000);
    let mut evidence = clean_evidence();
    evidence.location = None; // avoid inheriting stu-alpha's stored fix
    let second = h.engine.verify_response(&blob, &evidence).await.unwrap();

    assert_eq!(second.outcome, Outcome::Flagged);
    assert!(second.flags.duplicate_device);
    assert!(!first.flags.duplicate_device);
}

// ============================================================================
// Scenario 6: mocked location on a rooted device
// ============================================================================

#[tokio::test]
async fn mocked_location_and_rooted_device_flags_within_bounds() {
    let h = harness();
    let challenge = h
        .engine
        .issue_challenge(SESSION.into(), ORGANISER.into(), None)
        .await
        .unwrap();

    h.clock.set(4_200);
    let mut evidence = clean_evidence();
    evidence.location = Some(GeoLocation {
        lat: 52.5200,
        lon: 13.4050,
        accuracy_m: 0.5,
        timestamp_ms: 4_200,
    });
    evidence.device_attestation = Some(vec!["rooted".to_string()]);

    let blob = signed_blob(&challenge, PARTICIPANT, DEVICE, 4_200);
    let record = h.engine.verify_response(&blob, &evidence).await.unwrap();

    assert_eq!(record.outcome, Outcome::Flagged);
    assert!(record.flags.mocked_location);
    assert!(record.flags.rooted_device);
    assert!(record.risk_score <= 100);
    // (0.30 + 0.35) / 2.25 of 100, rounded.
    assert_eq!(record.risk_score, 29);
}

// ============================================================================
// Tampering and structural rejection
// ============================================================================

#[tokio::test]
async fn tampered_signature_is_rejected_at_full_risk() {
    let h = harness();
    let challenge = h
        .engine
        .issue_challenge(SESSION.into(), ORGANISER.into(), None)
        .await
        .unwrap();

    h.clock.set(2_000);
    let blob = signed_blob(&challenge, PARTICIPANT, DEVICE, 2_000);
    let mut decoded = presence_engine::SignedResponse::decode(&blob).unwrap();
    let mut sig = decoded.signature.clone().into_bytes();
    sig[10] = if sig[10] == b'a' { b'b' } else { b'a' };
    decoded.signature = String::from_utf8(sig).unwrap();

    let record = h
        .engine
        .verify_response(&decoded.encode(), &clean_evidence())
        .await
        .unwrap();

    assert_eq!(record.outcome, Outcome::Rejected);
    assert_eq!(record.risk_score, 100);
    assert!(record.flags.invalid_challenge);

    // A forged submission must not squat the participant's attendance slot.
    let slot = h
        .store
        .get(&format!("attendance:{SESSION}:{PARTICIPANT}"))
        .await
        .unwrap();
    assert!(slot.is_none());
}

#[tokio::test]
async fn response_without_issued_challenge_is_rejected() {
    let h = harness();

    // A challenge the engine never stored.
    let ghost = presence_engine::Challenge {
        session_id: SESSION.into(),
        challenge_code: "bm90LWEtcmVhbC1jb2Rl".to_string(),
        nonce: "bm90LWEtbm9uY2U".to_string(),
        issued_at_ms: 0,
        expires_at_ms: 15_000,
        organiser_id: ORGANISER.into(),
        metadata: None,
    };
    let blob = signed_blob(&ghost, PARTICIPANT, DEVICE, 1_000);
    let record = h
        .engine
        .verify_response(&blob, &clean_evidence())
        .await
        .unwrap();

    assert_eq!(record.outcome, Outcome::Rejected);
    assert!(record.flags.invalid_challenge);
}

#[tokio::test]
async fn response_signed_against_superseded_challenge_is_rejected() {
    let h = harness();
    let original = h
        .engine
        .issue_challenge(SESSION.into(), ORGANISER.into(), None)
        .await
        .unwrap();
    // Organiser reopens the session; the old code stops verifying.
    h.engine
        .issue_challenge(SESSION.into(), ORGANISER.into(), None)
        .await
        .unwrap();

    h.clock.set(1_000);
    let blob = signed_blob(&original, PARTICIPANT, DEVICE, 1_000);
    let record = h
        .engine
        .verify_response(&blob, &clean_evidence())
        .await
        .unwrap();
    assert_eq!(record.outcome, Outcome::Rejected);
}

// ============================================================================
// Expiry boundary
// ============================================================================

#[tokio::test]
async fn response_exactly_at_window_close_is_accepted() {
    let h = harness();
    let challenge = h
        .engine
        .issue_challenge(SESSION.into(), ORGANISER.into(), None)
        .await
        .unwrap();

    h.clock.set(15_000);
    let mut evidence = clean_evidence();
    evidence.location = None;
    let blob = signed_blob(&challenge, PARTICIPANT, DEVICE, 15_000);
    let record = h.engine.verify_response(&blob, &evidence).await.unwrap();

    // 15 s latency is within the window but past the reasonable delivery
    // bound, so it stays flagged rather than present.
    assert_ne!(record.outcome, Outcome::Rejected);
    assert!(record.flags.late_response);
}

#[tokio::test]
async fn one_millisecond_past_window_is_expired() {
    let h = harness();
    let challenge = h
        .engine
        .issue_challenge(SESSION.into(), ORGANISER.into(), None)
        .await
        .unwrap();

    h.clock.set(15_001);
    let blob = signed_blob(&challenge, PARTICIPANT, DEVICE, 15_001);
    let record = h
        .engine
        .verify_response(&blob, &clean_evidence())
        .await
        .unwrap();
    assert_eq!(record.outcome, Outcome::Flagged);
    assert!(record.flags.late_response);
}

// ============================================================================
// Session report
// ============================================================================

#[tokio::test]
async fn session_report_aggregates_and_recommends() {
    let h = harness();
    let challenge = h
        .engine
        .issue_challenge(SESSION.into(), ORGANISER.into(), None)
        .await
        .unwrap();

    // One clean response.
    h.clock.set(3_000);
    let blob = signed_blob(&challenge, PARTICIPANT, DEVICE, 3_000);
    let mut evidence = clean_evidence();
    evidence.location = None;
    h.engine.verify_response(&blob, &evidence).await.unwrap();

    // One weak-signal response from a second participant on a shared device.
    h.clock.set(4_000);
    let blob = signed_blob(&challenge, "stu-beta", DEVICE, 4_000);
    let mut weak = clean_evidence();
    weak.location = None;
    weak.rssi = -82;
    h.engine.verify_response(&blob, &weak).await.unwrap();

    let report = h.engine.session_report(SESSION.into()).await.unwrap();
    assert_eq!(report.total_responses, 2);
    assert_eq!(report.flagged_responses, 1);
    assert_eq!(report.risk_distribution.low, 2);
    assert_eq!(report.flag_type_counts.get("weakSignal"), Some(&1));
    assert_eq!(report.flag_type_counts.get("duplicateDevice"), Some(&1));
    // 1 of 2 flagged exceeds the 10% threshold, and a device was shared.
    assert!(report
        .recommendations
        .contains(&"review attendance policies".to_string()));
    assert!(report
        .recommendations
        .contains(&"enforce device binding".to_string()));
}

#[tokio::test]
async fn report_for_silent_session_is_empty() {
    let h = harness();
    let report = h
        .engine
        .session_report("sess-nobody-came".into())
        .await
        .unwrap();
    assert_eq!(report.total_responses, 0);
    assert!(report.recommendations.is_empty());
}

// ============================================================================
// Overrides
// ============================================================================

#[tokio::test]
async fn flagged_record_can_be_overridden_to_present() {
    let h = harness();
    let challenge = h
        .engine
        .issue_challenge(SESSION.into(), ORGANISER.into(), None)
        .await
        .unwrap();

    h.clock.set(4_000);
    let mut evidence = clean_evidence();
    evidence.rssi = -82;
    let blob = signed_blob(&challenge, PARTICIPANT, DEVICE, 4_000);
    let record = h.engine.verify_response(&blob, &evidence).await.unwrap();
    assert_eq!(record.outcome, Outcome::Flagged);

    let updated = h
        .engine
        .apply_override(
            record.record_id,
            ORGANISER.into(),
            "student showed id at the door".to_string(),
            Outcome::Present,
        )
        .await
        .unwrap();

    assert_eq!(updated.outcome, Outcome::Present);
    let state = updated.override_state.unwrap();
    assert_eq!(state.actor_id.as_str(), ORGANISER);
    assert_eq!(h.engine.metrics().snapshot().overrides_applied, 1);
}

#[tokio::test]
async fn unauthorized_override_is_refused() {
    use presence_engine::{AttendanceRecord, EngineError, OrganiserId};
    use std::sync::Arc;

    let h = harness_with_authorizer(Arc::new(
        |actor: &OrganiserId, _: &AttendanceRecord| actor.as_str() == "org-dean",
    ));
    let challenge = h
        .engine
        .issue_challenge(SESSION.into(), ORGANISER.into(), None)
        .await
        .unwrap();

    h.clock.set(4_000);
    let mut evidence = clean_evidence();
    evidence.rssi = -82;
    let blob = signed_blob(&challenge, PARTICIPANT, DEVICE, 4_000);
    let record = h.engine.verify_response(&blob, &evidence).await.unwrap();

    let refused = h
        .engine
        .apply_override(
            record.record_id,
            ORGANISER.into(),
            "not my call".to_string(),
            Outcome::Present,
        )
        .await;
    assert!(matches!(
        refused,
        Err(EngineError::OverrideUnauthorized { .. })
    ));

    let allowed = h
        .engine
        .apply_override(
            record.record_id,
            "org-dean".into(),
            "reviewed evidence".to_string(),
            Outcome::Rejected,
        )
        .await
        .unwrap();
    assert_eq!(allowed.outcome, Outcome::Rejected);
}

// ============================================================================
// Concurrency: one canonical record per (session, participant)
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submissions_commit_exactly_once() {
    use std::sync::Arc;

    let h = harness();
    let challenge = h
        .engine
        .issue_challenge(SESSION.into(), ORGANISER.into(), None)
        .await
        .unwrap();
    h.clock.set(4_000);

    let engine = Arc::new(h.engine);
    let blob = signed_blob(&challenge, PARTICIPANT, DEVICE, 4_000);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = engine.clone();
        let blob = blob.clone();
        handles.push(tokio::spawn(async move {
            let mut evidence = clean_evidence();
            evidence.location = None;
            engine.verify_response(&blob, &evidence).await.unwrap()
        }));
    }

    let mut record_ids = std::collections::HashSet::new();
    for handle in handles {
        let record = handle.await.unwrap();
        assert_eq!(record.outcome, Outcome::Present);
        record_ids.insert(record.record_id);
    }
    // Every submission resolved to the single canonical record.
    assert_eq!(record_ids.len(), 1);
}

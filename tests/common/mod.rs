//! Common test utilities and fixtures for integration tests

#![allow(dead_code)]

use std::sync::Arc;

use secrecy::SecretVec;
use serde_json::json;

use presence_engine::clock::ManualClock;
use presence_engine::crypto::KeyedMac;
use presence_engine::engine::OverrideAuthorizer;
use presence_engine::{
    AttendanceRecord, Challenge, EngineConfig, Evidence, GeoLocation, MemoryEvidenceStore,
    OrganiserId, PresenceEngine, SignedResponse,
};

/// Shared MAC secret between the engine under test and the signing helper.
pub const TEST_SECRET: &[u8] = b"integration-test-secret-32-bytes!";

pub const SESSION: &str = "sess-math-101";
pub const ORGANISER: &str = "org-lecturer-1";
pub const PARTICIPANT: &str = "stu-alpha";
pub const DEVICE: &str = "dev-alpha-phone";

pub struct TestHarness {
    pub engine: PresenceEngine,
    pub store: Arc<MemoryEvidenceStore>,
    pub clock: Arc<ManualClock>,
}

/// Engine over an in-memory store with a manual clock starting at t=0 and an
/// allow-all override predicate.
pub fn harness() -> TestHarness {
    harness_with_authorizer(Arc::new(
        |_: &OrganiserId, _: &AttendanceRecord| true,
    ))
}

pub fn harness_with_authorizer(authorizer: Arc<dyn OverrideAuthorizer>) -> TestHarness {
    let clock = ManualClock::new(0);
    let store = Arc::new(MemoryEvidenceStore::new(clock.clone()));
    let config = EngineConfig::new(TEST_SECRET.to_vec());
    let engine =
        PresenceEngine::new(config, store.clone(), clock.clone(), authorizer).unwrap();
    TestHarness {
        engine,
        store,
        clock,
    }
}

/// Build a correctly signed wire blob for a challenge, the way a client does.
pub fn signed_blob(
    challenge: &Challenge,
    participant: &str,
    device: &str,
    responded_at_ms: i64,
) -> String {
    let payload = json!({
        "challengeCode": challenge.challenge_code,
        "nonce": challenge.nonce,
        "studentId": participant,
        "deviceId": device,
        "sessionId": challenge.session_id,
        "timestamp": responded_at_ms,
        "additionalData": {}
    });
    let mac = KeyedMac::new(SecretVec::new(TEST_SECRET.to_vec()));
    let signature = mac.sign(&payload).expect("payload canonicalizes");
    SignedResponse { payload, signature }.encode()
}

/// Clean evidence bundle: strong signal, plausible accuracy, benign networks.
pub fn clean_evidence() -> Evidence {
    Evidence {
        rssi: -45,
        location: Some(GeoLocation {
            lat: 52.5200,
            lon: 13.4050,
            accuracy_m: 8.0,
            timestamp_ms: 4_200,
        }),
        wifi_networks: Some(vec![
            "Campus".to_string(),
            "eduroam".to_string(),
            "Library-5G".to_string(),
            "Staff".to_string(),
            "Cafe-Guest".to_string(),
            "Lab".to_string(),
        ]),
        device_attestation: None,
        organiser_session_meta: None,
    }
}

//! Evidence store key scheme.
//!
//! The key layout is a stable contract: session reports and external tooling
//! read these keys directly, so every key is built here and nowhere else.
//!
//! - `challenge:{sessionId}` - active challenge for a session
//! - `analysis:{participantId}:{timestampMs}` - one analysis per response
//! - `analyses:by-session:{sessionId}` - set of analysis keys (report index)
//! - `location:{participantId}:last` - last known location
//! - `device:{deviceId}:usage` - set of participant ids seen on a device
//! - `behavior:{participantId}:pattern` - behavioral latency baseline
//! - `attendance:{sessionId}:{participantId}` - committed attendance record
//! - `attendance:by-id:{recordId}` - record addressed by id (overrides)

use uuid::Uuid;

use crate::domain::{DeviceId, ParticipantId, SessionId};

pub fn challenge(session_id: &SessionId) -> String {
    format!("challenge:{session_id}")
}

pub fn analysis(participant_id: &ParticipantId, timestamp_ms: i64) -> String {
    format!("analysis:{participant_id}:{timestamp_ms}")
}

pub fn analyses_by_session(session_id: &SessionId) -> String {
    format!("analyses:by-session:{session_id}")
}

pub fn last_location(participant_id: &ParticipantId) -> String {
    format!("location:{participant_id}:last")
}

pub fn device_usage(device_id: &DeviceId) -> String {
    format!("device:{device_id}:usage")
}

pub fn behavioral_baseline(participant_id: &ParticipantId) -> String {
    format!("behavior:{participant_id}:pattern")
}

pub fn attendance(session_id: &SessionId, participant_id: &ParticipantId) -> String {
    format!("attendance:{session_id}:{participant_id}")
}

pub fn attendance_by_id(record_id: Uuid) -> String {
    format!("attendance:by-id:{record_id}")
}

//! Signed response wire format and the evidence bundle.
//!
//! A participant client submits one opaque blob:
//!
//! ```text
//! base64url( utf8( json({ "payload": {...}, "signature": "<hex>" }) ) )
//! ```
//!
//! The signature is an HMAC over the RFC 8785 canonical JSON of `payload`,
//! so the MAC is verified against the payload exactly as the client sent it
//! (never against a re-serialized struct). The evidence bundle travels
//! alongside and is not itself authenticated.

use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::{Deserialize, Serialize};

use super::{DeviceId, ParticipantId, SessionId};

/// Outer wrapper of the wire blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedResponse {
    /// Payload as received; MAC verification runs over this value.
    pub payload: serde_json::Value,
    /// Hex MAC over the canonical JSON of `payload`.
    pub signature: String,
}

impl SignedResponse {
    /// Decode the outer blob. Errors are collapsed by the verifier into a
    /// structural failure; the message here is diagnostic only.
    pub fn decode(blob: &str) -> Result<Self, String> {
        let bytes = decode_base64url(blob.trim())
            .ok_or_else(|| "blob is not valid base64url".to_string())?;
        let text =
            String::from_utf8(bytes).map_err(|_| "blob is not valid UTF-8".to_string())?;
        serde_json::from_str(&text).map_err(|e| format!("blob is not a signed response: {e}"))
    }

    /// Encode to the wire form. Used by tests and client tooling.
    pub fn encode(&self) -> String {
        let json = serde_json::to_string(self).expect("wrapper serializes");
        URL_SAFE_NO_PAD.encode(json.as_bytes())
    }

    /// Parse the inner payload into its typed form.
    pub fn parse_payload(&self) -> Result<ResponsePayload, String> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| format!("malformed payload: {e}"))
    }
}

/// Typed view of the signed payload. Wire names are fixed by deployed
/// clients; Rust names stay idiomatic through serde renames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponsePayload {
    #[serde(rename = "challengeCode")]
    pub challenge_code: String,
    pub nonce: String,
    #[serde(rename = "studentId")]
    pub participant_id: ParticipantId,
    #[serde(rename = "deviceId")]
    pub device_id: DeviceId,
    #[serde(rename = "sessionId")]
    pub session_id: SessionId,
    #[serde(rename = "timestamp")]
    pub responded_at_ms: i64,
    #[serde(rename = "additionalData", default)]
    pub additional_data: serde_json::Value,
}

/// Coarse location fix supplied by the client.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub lat: f64,
    pub lon: f64,
    /// Reported accuracy radius, metres.
    pub accuracy_m: f64,
    pub timestamp_ms: i64,
}

/// Everything a client submits alongside the signed response that is not
/// itself cryptographically authenticated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Evidence {
    /// Received signal strength, dBm. More negative means weaker.
    pub rssi: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoLocation>,
    /// Visible network SSIDs. `None` means the client did not scan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wifi_networks: Option<Vec<String>>,
    /// Attestation tokens such as `rooted`, `emulator`, `jailbroken`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_attestation: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organiser_session_meta: Option<serde_json::Value>,
}

fn decode_base64url(input: &str) -> Option<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(input)
        .or_else(|_| URL_SAFE.decode(input))
        .ok()
}

//! Engine configuration.
//!
//! All tunables are captured in one struct-shaped value constructed at process
//! init. Bad values surface as [`EngineError::Configuration`] from
//! [`EngineConfig::validate`] and nowhere else. The MAC secret is held in
//! [`secrecy::SecretVec`] so it is zeroized on drop and redacted from `Debug`.

use secrecy::{ExposeSecret, SecretVec};

use crate::infra::{EngineError, Result};

/// Minimum accepted secret length in bytes.
pub const MIN_SECRET_LEN: usize = 16;

/// SSID substrings that indicate a synthetic wireless environment.
pub const DEFAULT_WIFI_BLACKLIST: &[&str] = &[
    "MOCK_WIFI",
    "TEST_AP",
    "FAKE_NETWORK",
    "EMULATOR_WIFI",
    "SIMULATOR_AP",
    "DEBUG_WIFI",
    "PROXY_NETWORK",
];

/// Attestation tokens that indicate a compromised or synthetic device.
pub const DEFAULT_ATTESTATION_BLACKLIST: &[&str] = &["rooted", "jailbroken", "emulator"];

/// Configuration for the presence verification engine.
pub struct EngineConfig {
    /// Challenge validity window in milliseconds.
    pub challenge_validity_ms: i64,
    /// Random challenge code size in bytes.
    pub challenge_code_len: usize,
    /// Random nonce size in bytes.
    pub nonce_len: usize,

    /// RSSI at or below this is classified weak (dBm).
    pub rssi_weak_threshold: i32,
    /// RSSI at or below this (and above weak) is classified medium (dBm).
    pub rssi_medium_threshold: i32,

    /// Responses observed faster than this are machine-speed suspicious (ms).
    pub response_suspicious_fast_ms: i64,
    /// Fastest plausible human response (ms).
    pub response_min_human_ms: i64,
    /// Slowest reasonable delivery delay before flagging (ms).
    pub response_max_reasonable_ms: i64,

    /// Distance that counts as a location jump (metres).
    pub location_jump_distance_m: f64,
    /// Minimum elapsed time for a jump of that distance to be plausible (ms).
    pub location_min_movement_time_ms: i64,
    /// TTL for the per-participant last-known location (seconds).
    pub location_ttl_sec: u64,

    /// Fewer visible networks than this is suspicious.
    pub wifi_min_expected: usize,
    /// More visible networks than this is suspicious.
    pub wifi_max_reasonable: usize,
    /// Case-insensitive SSID substring blacklist.
    pub wifi_blacklist: Vec<String>,

    /// Device attestation tokens that trip the rooted-device flag.
    pub attestation_blacklist: Vec<String>,

    /// Smoothing factor for the behavioral latency baseline.
    pub behavioral_alpha: f64,
    /// TTL for stored analyses and attendance records (seconds).
    pub analysis_ttl_sec: u64,
    /// TTL for device usage set members (seconds).
    pub device_usage_ttl_sec: u64,

    /// Process MAC secret. Never logged, never echoed in errors.
    pub secret: SecretVec<u8>,
}

impl EngineConfig {
    /// Build a config with default thresholds around the given secret.
    pub fn new(secret: Vec<u8>) -> Self {
        Self {
            challenge_validity_ms: 15_000,
            challenge_code_len: 32,
            nonce_len: 16,
            rssi_weak_threshold: -70,
            rssi_medium_threshold: -50,
            response_suspicious_fast_ms: 200,
            response_min_human_ms: 500,
            response_max_reasonable_ms: 10_000,
            location_jump_distance_m: 1_000.0,
            location_min_movement_time_ms: 30_000,
            location_ttl_sec: 3_600,
            wifi_min_expected: 1,
            wifi_max_reasonable: 20,
            wifi_blacklist: DEFAULT_WIFI_BLACKLIST
                .iter()
                .map(|s| s.to_string())
                .collect(),
            attestation_blacklist: DEFAULT_ATTESTATION_BLACKLIST
                .iter()
                .map(|s| s.to_string())
                .collect(),
            behavioral_alpha: 0.2,
            analysis_ttl_sec: 604_800,
            device_usage_ttl_sec: 604_800,
            secret: SecretVec::new(secret),
        }
    }

    /// Load overrides from the environment on top of defaults.
    ///
    /// The secret comes from `PRESENCE_SECRET` (raw UTF-8 bytes). Numeric
    /// variables fall back to defaults when absent or unparseable.
    pub fn from_env() -> Result<Self> {
        let secret = std::env::var("PRESENCE_SECRET")
            .map(String::into_bytes)
            .map_err(|_| {
                EngineError::Configuration("PRESENCE_SECRET is not set".to_string())
            })?;

        let mut config = Self::new(secret);
        if let Some(v) = env_i64("PRESENCE_CHALLENGE_VALIDITY_MS") {
            config.challenge_validity_ms = v;
        }
        if let Some(v) = env_i64("PRESENCE_RSSI_WEAK_THRESHOLD") {
            config.rssi_weak_threshold = v as i32;
        }
        if let Some(v) = env_i64("PRESENCE_RSSI_MEDIUM_THRESHOLD") {
            config.rssi_medium_threshold = v as i32;
        }
        if let Some(v) = env_i64("PRESENCE_RESPONSE_MAX_REASONABLE_MS") {
            config.response_max_reasonable_ms = v;
        }
        config.validate()?;
        Ok(config)
    }

    /// Validate thresholds. The only source of `Configuration` errors.
    pub fn validate(&self) -> Result<()> {
        if self.secret.expose_secret().len() < MIN_SECRET_LEN {
            return Err(EngineError::Configuration(format!(
                "secret must be at least {MIN_SECRET_LEN} bytes"
            )));
        }
        if self.challenge_validity_ms <= 0 {
            return Err(EngineError::Configuration(
                "challenge_validity_ms must be positive".to_string(),
            ));
        }
        if self.challenge_code_len < 32 || self.nonce_len < 16 {
            return Err(EngineError::Configuration(
                "challenge code must be >= 32 bytes and nonce >= 16 bytes".to_string(),
            ));
        }
        if self.rssi_weak_threshold >= self.rssi_medium_threshold {
            return Err(EngineError::Configuration(
                "rssi_weak_threshold must be below rssi_medium_threshold".to_string(),
            ));
        }
        if !(self.response_suspicious_fast_ms < self.response_min_human_ms
            && self.response_min_human_ms < self.response_max_reasonable_ms)
        {
            return Err(EngineError::Configuration(
                "response timing thresholds must be strictly ordered".to_string(),
            ));
        }
        if self.location_jump_distance_m <= 0.0 || self.location_min_movement_time_ms <= 0 {
            return Err(EngineError::Configuration(
                "location jump thresholds must be positive".to_string(),
            ));
        }
        if self.wifi_min_expected > self.wifi_max_reasonable {
            return Err(EngineError::Configuration(
                "wifi_min_expected must not exceed wifi_max_reasonable".to_string(),
            ));
        }
        if !(0.0 < self.behavioral_alpha && self.behavioral_alpha < 1.0) {
            return Err(EngineError::Configuration(
                "behavioral_alpha must be in (0, 1)".to_string(),
            ));
        }
        Ok(())
    }

    /// TTL under which an issued challenge stays loadable.
    ///
    /// Must exceed the validity window so a late response still finds its
    /// challenge and is classified expired rather than invalid.
    pub fn challenge_ttl_ms(&self) -> i64 {
        self.challenge_validity_ms + self.response_max_reasonable_ms
    }
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("challenge_validity_ms", &self.challenge_validity_ms)
            .field("rssi_weak_threshold", &self.rssi_weak_threshold)
            .field("rssi_medium_threshold", &self.rssi_medium_threshold)
            .field("wifi_blacklist", &self.wifi_blacklist.len())
            .field("secret", &"[redacted]")
            .finish_non_exhaustive()
    }
}

fn env_i64(name: &str) -> Option<i64> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

//! Logging setup for processes embedding the engine.
//!
//! `tracing` with an EnvFilter and a console fmt layer, optionally JSON
//! formatted. Log events carry participant, session and analysis ids; the
//! MAC secret and raw signatures never appear in log output.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Telemetry configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name reported in logs
    pub service_name: String,
    /// Enable console logging
    pub enable_console: bool,
    /// Enable JSON logging format
    pub json_format: bool,
    /// Log level filter
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "presence-engine".to_string(),
            enable_console: true,
            json_format: false,
            log_level: "info".to_string(),
        }
    }
}

impl TelemetryConfig {
    pub fn from_env() -> Self {
        Self {
            service_name: std::env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "presence-engine".to_string()),
            enable_console: std::env::var("LOG_CONSOLE")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
            json_format: std::env::var("LOG_JSON")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            log_level: std::env::var("LOG_LEVEL")
                .or_else(|_| std::env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),
        }
    }
}

/// Initialize the global tracing subscriber.
///
/// Call once at process start; a second call returns an error from the
/// subscriber registry and can be ignored in tests.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    if config.enable_console {
        if config.json_format {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true);
            subscriber.with(fmt_layer).try_init()?;
        } else {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .compact();
            subscriber.with(fmt_layer).try_init()?;
        }
    } else {
        subscriber.try_init()?;
    }

    Ok(())
}

/// Span names for common operations
pub mod spans {
    pub const ISSUE_CHALLENGE: &str = "issue_challenge";
    pub const VERIFY_RESPONSE: &str = "verify_response";
    pub const ANALYZE_RESPONSE: &str = "analyze_response";
    pub const COMPOSE_VERDICT: &str = "compose_verdict";
    pub const SESSION_REPORT: &str = "session_report";
    pub const APPLY_OVERRIDE: &str = "apply_override";

    pub const STORE_GET: &str = "store.get";
    pub const STORE_PUT: &str = "store.put";
    pub const STORE_CAS: &str = "store.put_if_absent";
}

/// Span attribute keys for consistent instrumentation
pub mod attributes {
    pub const SESSION_ID: &str = "session.id";
    pub const PARTICIPANT_ID: &str = "participant.id";
    pub const DEVICE_ID: &str = "device.id";
    pub const ANALYSIS_ID: &str = "analysis.id";
    pub const RECORD_ID: &str = "record.id";
    pub const OUTCOME: &str = "outcome";
    pub const RISK_SCORE: &str = "risk.score";
    pub const ERROR_TYPE: &str = "error.type";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telemetry_config_default() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "presence-engine");
        assert!(config.enable_console);
        assert!(!config.json_format);
        assert_eq!(config.log_level, "info");
    }
}

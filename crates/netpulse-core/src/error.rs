// ── Core error types ──
//
// Domain errors for the monitoring core. Transport details (BER decode
// failures, raw I/O errors, HTTP status codes) never leak past this
// boundary: `From<netpulse_probe::Error>` folds them into the probe and
// SNMP categories the scheduler knows how to contain.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Probe errors (per host, per round) ──────────────────────────
    #[error("Ping to {target} timed out after {timeout_ms}ms")]
    ProbeTimeout { target: String, timeout_ms: u64 },

    #[error("Ping to {target} failed: {message}")]
    ProbeError { target: String, message: String },

    // ── SNMP errors (no traffic data this round) ─────────────────────
    #[error("SNMP request to {target} timed out after {timeout_ms}ms")]
    SnmpTimeout { target: String, timeout_ms: u64 },

    #[error("SNMP authorization failed for {target}")]
    SnmpAuthError { target: String },

    #[error("SNMP agent at {target} does not support {what}")]
    SnmpUnsupported { target: String, what: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    // ── Storage errors ───────────────────────────────────────────────
    #[error("Cannot store sample for host {host_id}: {message}")]
    StorageWrite { host_id: String, message: String },

    // ── Delivery errors ──────────────────────────────────────────────
    #[error("Notifier '{notifier}' failed: {message}")]
    Notification { notifier: String, message: String },

    // ── Lifecycle ────────────────────────────────────────────────────
    #[error("Scheduler has been stopped")]
    SchedulerStopped,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Ping-side failures, recorded as a failed ping for the round.
    pub fn is_probe_failure(&self) -> bool {
        matches!(self, Self::ProbeTimeout { .. } | Self::ProbeError { .. })
    }

    /// SNMP-side failures, which only cost the round its traffic sample.
    pub fn is_snmp(&self) -> bool {
        matches!(
            self,
            Self::SnmpTimeout { .. } | Self::SnmpAuthError { .. } | Self::SnmpUnsupported { .. }
        )
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<netpulse_probe::Error> for CoreError {
    fn from(err: netpulse_probe::Error) -> Self {
        use netpulse_probe::Error as E;

        match err {
            E::ProbeTimeout { target, timeout_ms } => Self::ProbeTimeout { target, timeout_ms },
            E::Probe { target, message } => Self::ProbeError { target, message },
            E::SnmpTimeout { target, timeout_ms } => Self::SnmpTimeout { target, timeout_ms },
            E::SnmpAuth { target } => Self::SnmpAuthError { target },
            E::SnmpUnsupported { target, what } => Self::SnmpUnsupported { target, what },
            E::SnmpAgent {
                target,
                status,
                index,
            } => Self::SnmpUnsupported {
                target,
                what: format!("the request (error-status {status} at index {index})"),
            },
            E::Codec(message) => Self::ProbeError {
                target: "snmp".into(),
                message,
            },
            E::Io(e) => Self::ProbeError {
                target: String::new(),
                message: e.to_string(),
            },
            E::Transport(e) => Self::Notification {
                notifier: "webhook".into(),
                message: e.to_string(),
            },
            E::Webhook { status } => Self::Notification {
                notifier: "webhook".into(),
                message: format!("HTTP {status}"),
            },
            E::InvalidUrl(e) => Self::Configuration {
                message: format!("invalid URL: {e}"),
            },
        }
    }
}

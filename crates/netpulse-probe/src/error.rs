use thiserror::Error;

/// Top-level error type for the `netpulse-probe` crate.
///
/// Covers every failure mode across the probe transports: ICMP ping,
/// SNMP over UDP, and webhook delivery. `netpulse-core` maps these into
/// the monitoring error taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Ping ────────────────────────────────────────────────────────
    /// The probe did not complete within its deadline.
    #[error("Probe to {target} timed out after {timeout_ms}ms")]
    ProbeTimeout { target: String, timeout_ms: u64 },

    /// The probe could not be executed (bad address, missing binary, ...).
    ///
    /// An unreachable host is NOT an error -- it is a normal `alive: false` reply.
    #[error("Probe to {target} failed: {message}")]
    Probe { target: String, message: String },

    // ── SNMP ────────────────────────────────────────────────────────
    /// No SNMP response before the deadline.
    #[error("SNMP request to {target} timed out after {timeout_ms}ms")]
    SnmpTimeout { target: String, timeout_ms: u64 },

    /// Agent rejected the community string.
    #[error("SNMP authorization failed for {target}")]
    SnmpAuth { target: String },

    /// The device does not expose the queried OIDs.
    #[error("SNMP agent at {target} does not support {what}")]
    SnmpUnsupported { target: String, what: String },

    /// Agent answered with a non-zero error-status we do not special-case.
    #[error("SNMP agent at {target} returned error-status {status} (index {index})")]
    SnmpAgent {
        target: String,
        status: i64,
        index: i64,
    },

    /// Malformed BER on the wire.
    #[error("SNMP decode error: {0}")]
    Codec(String),

    // ── Transport ───────────────────────────────────────────────────
    /// Socket / process I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Webhook URL could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Webhook endpoint answered with a non-success status.
    #[error("Webhook returned HTTP {status}")]
    Webhook { status: u16 },
}

impl Error {
    /// Returns `true` if the failure was a deadline expiring.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::ProbeTimeout { .. } | Self::SnmpTimeout { .. } => true,
            Self::Transport(e) => e.is_timeout(),
            _ => false,
        }
    }

    /// Returns `true` if this error came from the SNMP transport.
    pub fn is_snmp(&self) -> bool {
        matches!(
            self,
            Self::SnmpTimeout { .. }
                | Self::SnmpAuth { .. }
                | Self::SnmpUnsupported { .. }
                | Self::SnmpAgent { .. }
                | Self::Codec(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_classification() {
        let err = Error::SnmpTimeout {
            target: "10.0.0.1:161".into(),
            timeout_ms: 500,
        };
        assert!(err.is_timeout());
        assert!(err.is_snmp());

        let err = Error::Probe {
            target: "nowhere".into(),
            message: "unknown host".into(),
        };
        assert!(!err.is_timeout());
        assert!(!err.is_snmp());
    }
}

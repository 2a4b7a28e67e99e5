//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use netpulse_config::ConfigError;
use netpulse_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    #[allow(dead_code)]
    pub const SUCCESS: i32 = 0;
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration file not found")]
    #[diagnostic(
        code(netpulse::no_config),
        help(
            "Create one with: netpulse config init\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error("Configuration file already exists at {path}")]
    #[diagnostic(
        code(netpulse::config_exists),
        help("Pass --force to overwrite it.")
    )]
    ConfigExists { path: String },

    #[error("Could not load configuration: {message}")]
    #[diagnostic(
        code(netpulse::config),
        help("Check the TOML syntax and any NETPULSE_* environment variables.")
    )]
    Config { message: String },

    #[error("Host '{id}' is not in the configuration")]
    #[diagnostic(
        code(netpulse::host_not_found),
        help("Run: netpulse config show")
    )]
    HostNotFound { id: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(netpulse::validation))]
    Validation { field: String, reason: String },

    // ── Credentials ──────────────────────────────────────────────────
    #[error("No SNMP community configured for host '{host}'")]
    #[diagnostic(
        code(netpulse::no_credentials),
        help(
            "Set community_env or community in the host entry, or run:\n\
             netpulse config set-community {host} <community>"
        )
    )]
    NoCredentials { host: String },

    #[error("SNMP agent at {target} rejected the community")]
    #[diagnostic(
        code(netpulse::snmp_auth),
        help("Check the community string and the agent's access list.")
    )]
    SnmpAuth { target: String },

    #[error("Keyring error: {message}")]
    #[diagnostic(code(netpulse::keyring))]
    Keyring { message: String },

    // ── Probes ───────────────────────────────────────────────────────
    #[error("{target} did not answer within {timeout_ms}ms")]
    #[diagnostic(
        code(netpulse::timeout),
        help("Increase the timeout with --timeout or check that the host is reachable.")
    )]
    Timeout { target: String, timeout_ms: u64 },

    #[error("Probe failed: {message}")]
    #[diagnostic(code(netpulse::probe))]
    Probe { message: String },

    #[error("SNMP agent at {target} does not support {what}")]
    #[diagnostic(
        code(netpulse::snmp_unsupported),
        help("List the agent's interfaces with: netpulse snmp interfaces <address>")
    )]
    Unsupported { target: String, what: String },

    #[error("Notifier '{notifier}' failed: {message}")]
    #[diagnostic(code(netpulse::notification))]
    Notification { notifier: String, message: String },

    // ── Internal ─────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    #[diagnostic(code(netpulse::internal))]
    Internal(String),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Could not render output: {0}")]
    #[diagnostic(code(netpulse::serialization))]
    Serialization(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Validation { .. } => exit_code::USAGE,
            Self::NoCredentials { .. } | Self::SnmpAuth { .. } | Self::Keyring { .. } => {
                exit_code::AUTH
            }
            Self::NoConfig { .. } | Self::HostNotFound { .. } | Self::Unsupported { .. } => {
                exit_code::NOT_FOUND
            }
            Self::ConfigExists { .. } => exit_code::CONFLICT,
            Self::Probe { .. } | Self::Notification { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ProbeTimeout { target, timeout_ms }
            | CoreError::SnmpTimeout { target, timeout_ms } => {
                CliError::Timeout { target, timeout_ms }
            }

            CoreError::ProbeError { target, message } => CliError::Probe {
                message: format!("{target}: {message}"),
            },

            CoreError::SnmpAuthError { target } => CliError::SnmpAuth { target },

            CoreError::SnmpUnsupported { target, what } => CliError::Unsupported { target, what },

            CoreError::Configuration { message } => CliError::Validation {
                field: "monitor".into(),
                reason: message,
            },

            CoreError::Notification { notifier, message } => {
                CliError::Notification { notifier, message }
            }

            CoreError::StorageWrite { host_id, message } => {
                CliError::Internal(format!("history for {host_id}: {message}"))
            }

            CoreError::SchedulerStopped => CliError::Internal("scheduler already stopped".into()),

            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}

impl From<netpulse_probe::Error> for CliError {
    fn from(err: netpulse_probe::Error) -> Self {
        CoreError::from(err).into()
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } if field == "keyring" => {
                CliError::Keyring { message: reason }
            }
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::NoCredentials { host } => CliError::NoCredentials { host },
            ConfigError::Serialization(e) => CliError::Serialization(e.to_string()),
            ConfigError::Figment(e) => CliError::Config {
                message: e.to_string(),
            },
            ConfigError::Io(e) => CliError::Io(e),
        }
    }
}

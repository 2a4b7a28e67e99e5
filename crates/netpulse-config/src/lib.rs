//! Configuration for netpulse.
//!
//! TOML file + `NETPULSE_` environment layering, credential resolution
//! (env var, keyring, plaintext), and translation to
//! `netpulse_core::MonitorConfig` and a validated host list. The CLI adds
//! flag-aware wrappers on top.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use netpulse_core::{
    CoreError, CounterLimits, Host, MonitorConfig, RetentionLimits, SnmpSettings, WebhookNotifier,
};
use netpulse_probe::{NameSource, SnmpVersion, WebhookClient};

const KEYRING_SERVICE: &str = "netpulse";
const DEFAULT_WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no SNMP community configured for host '{host}'")]
    NoCredentials { host: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

fn invalid_core(field: impl Into<String>, err: CoreError) -> ConfigError {
    let reason = match err {
        CoreError::Configuration { message } => message,
        other => other.to_string(),
    };
    invalid(field, reason)
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub defaults: Defaults,

    #[serde(default)]
    pub monitor: MonitorSection,

    #[serde(default)]
    pub retention: RetentionSection,

    #[serde(default)]
    pub hosts: Vec<HostEntry>,

    #[serde(default)]
    pub webhooks: Vec<WebhookEntry>,
}

/// Output and credential-lookup defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// Consult the system keyring for secrets.
    #[serde(default = "default_true")]
    pub keyring: bool,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            keyring: true,
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_true() -> bool {
    true
}

/// `[monitor]`: cadence, timeouts and plausibility limits.
///
/// Durations are humantime strings ("30s", "1m 30s", "500ms").
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitorSection {
    #[serde(default = "default_interval")]
    pub interval: String,

    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: String,

    #[serde(default = "default_snmp_timeout")]
    pub snmp_timeout: String,

    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Longest polling gap that still yields a traffic rate.
    #[serde(default = "default_max_gap")]
    pub max_gap: String,

    /// Rate ceiling in Mbit/s; a faster apparent rate is treated as a
    /// counter reset.
    #[serde(default = "default_max_rate_mbps")]
    pub max_rate_mbps: f64,

    /// Path to the `ping` binary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ping_program: Option<String>,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            max_concurrency: default_max_concurrency(),
            ping_timeout: default_ping_timeout(),
            snmp_timeout: default_snmp_timeout(),
            failure_threshold: default_failure_threshold(),
            max_gap: default_max_gap(),
            max_rate_mbps: default_max_rate_mbps(),
            ping_program: None,
        }
    }
}

fn default_interval() -> String {
    "30s".into()
}
fn default_max_concurrency() -> usize {
    64
}
fn default_ping_timeout() -> String {
    "3s".into()
}
fn default_snmp_timeout() -> String {
    "5s".into()
}
fn default_failure_threshold() -> u32 {
    3
}
fn default_max_gap() -> String {
    "5m".into()
}
fn default_max_rate_mbps() -> f64 {
    10_000.0
}

/// `[retention]`: entries kept per host.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetentionSection {
    #[serde(default = "default_ping_retention")]
    pub pings: usize,

    #[serde(default = "default_traffic_retention")]
    pub traffic: usize,

    #[serde(default = "default_status_log_retention")]
    pub status_log: usize,
}

impl Default for RetentionSection {
    fn default() -> Self {
        Self {
            pings: default_ping_retention(),
            traffic: default_traffic_retention(),
            status_log: default_status_log_retention(),
        }
    }
}

fn default_ping_retention() -> usize {
    RetentionLimits::default().pings
}
fn default_traffic_retention() -> usize {
    RetentionLimits::default().traffic
}
fn default_status_log_retention() -> usize {
    RetentionLimits::default().status_log
}

/// One `[[hosts]]` entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HostEntry {
    pub id: String,

    /// Display name; defaults to the id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Hostname or IP literal.
    pub address: String,

    /// Poll interface counters over SNMP.
    #[serde(default)]
    pub snmp: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub if_index: Option<u32>,

    /// Community (plaintext; prefer `community_env` or the keyring).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub community: Option<String>,

    /// Environment variable holding the community.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub community_env: Option<String>,

    #[serde(default)]
    pub snmp_version: SnmpVersion,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snmp_port: Option<u16>,

    /// Interface naming column used by discovery.
    #[serde(default)]
    pub name_source: NameSource,
}

impl HostEntry {
    pub fn new(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            address: address.into(),
            snmp: false,
            if_index: None,
            community: None,
            community_env: None,
            snmp_version: SnmpVersion::default(),
            snmp_port: None,
            name_source: NameSource::default(),
        }
    }
}

/// One `[[webhooks]]` entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebhookEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    /// Bearer token (plaintext; prefer `token_env` or the keyring).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,
}

// ── Translation to core types ───────────────────────────────────────

impl Config {
    /// Starter config written by `netpulse config init`.
    pub fn sample() -> Self {
        let mut router = HostEntry::new("gateway", "192.168.1.1");
        router.name = Some("Gateway".into());
        router.snmp = true;
        router.if_index = Some(1);
        router.community_env = Some("NETPULSE_GATEWAY_COMMUNITY".into());
        router.community = Some("public".into());

        Self {
            hosts: vec![router, HostEntry::new("dns", "1.1.1.1")],
            ..Self::default()
        }
    }

    pub fn monitor_config(&self) -> Result<MonitorConfig, ConfigError> {
        let m = &self.monitor;
        let config = MonitorConfig {
            poll_interval: parse_duration("monitor.interval", &m.interval)?,
            max_concurrency: m.max_concurrency,
            ping_timeout: parse_duration("monitor.ping_timeout", &m.ping_timeout)?,
            snmp_timeout: parse_duration("monitor.snmp_timeout", &m.snmp_timeout)?,
            failure_threshold: m.failure_threshold,
            retention: RetentionLimits {
                pings: self.retention.pings,
                traffic: self.retention.traffic,
                status_log: self.retention.status_log,
            },
            counter_limits: CounterLimits {
                max_gap: parse_duration("monitor.max_gap", &m.max_gap)?,
                max_rate_bps: m.max_rate_mbps * 1_000_000.0,
            },
        };
        config.validate().map_err(|e| invalid_core("monitor", e))?;
        Ok(config)
    }

    /// Build the validated host list, resolving SNMP communities.
    pub fn hosts(&self) -> Result<Vec<Host>, ConfigError> {
        let mut seen = HashSet::new();
        let mut hosts = Vec::with_capacity(self.hosts.len());
        for entry in &self.hosts {
            if !seen.insert(entry.id.as_str()) {
                return Err(invalid(
                    format!("hosts.{}", entry.id),
                    "host id appears more than once",
                ));
            }
            hosts.push(entry_to_host(entry, self.defaults.keyring)?);
        }
        Ok(hosts)
    }

    /// Build one webhook notifier per `[[webhooks]]` entry.
    pub fn notifiers(&self) -> Result<Vec<WebhookNotifier>, ConfigError> {
        self.webhooks
            .iter()
            .enumerate()
            .map(|(i, hook)| webhook_notifier(i, hook, self.defaults.keyring))
            .collect()
    }

    pub fn find_host(&self, id: &str) -> Option<&HostEntry> {
        self.hosts.iter().find(|h| h.id == id)
    }

    /// Run every translation without keeping the results.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.monitor_config()?;
        self.hosts()?;
        self.notifiers()?;
        Ok(())
    }
}

fn parse_duration(field: &str, value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value.trim()).map_err(|e| invalid(field, format!("'{value}': {e}")))
}

fn entry_to_host(entry: &HostEntry, use_keyring: bool) -> Result<Host, ConfigError> {
    let mut host = Host::new(entry.id.as_str(), entry.address.as_str());
    if let Some(ref name) = entry.name {
        host = host.with_name(name.as_str());
    }

    if entry.snmp {
        let if_index = entry.if_index.ok_or_else(|| {
            invalid(
                format!("hosts.{}.if_index", entry.id),
                "required when snmp = true",
            )
        })?;
        let community = resolve_community(entry, use_keyring)?;
        let mut settings = SnmpSettings::new(community, if_index);
        settings.version = entry.snmp_version;
        settings.name_source = entry.name_source;
        if let Some(port) = entry.snmp_port {
            settings.port = port;
        }
        host = host.with_snmp(settings);
    }

    host.validate()
        .map_err(|e| invalid_core(format!("hosts.{}", entry.id), e))?;
    Ok(host)
}

fn webhook_notifier(
    index: usize,
    hook: &WebhookEntry,
    use_keyring: bool,
) -> Result<WebhookNotifier, ConfigError> {
    let field = format!("webhooks[{index}]");
    let timeout = match hook.timeout {
        Some(ref t) => parse_duration(&format!("{field}.timeout"), t)?,
        None => DEFAULT_WEBHOOK_TIMEOUT,
    };
    let token = resolve_webhook_token(hook, index, use_keyring);
    let client = WebhookClient::new(&hook.url, timeout, token.as_ref())
        .map_err(|e| invalid(format!("{field}.url"), e.to_string()))?;

    let notifier = WebhookNotifier::new(client);
    Ok(match hook.name {
        Some(ref name) => notifier.with_name(name.as_str()),
        None => notifier,
    })
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("io", "netpulse", "netpulse").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("netpulse");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Defaults, then the TOML file at `path`, then `NETPULSE_` env vars.
///
/// Nested keys use a double underscore: `NETPULSE_MONITOR__INTERVAL=10s`.
pub fn figment_for(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("NETPULSE_").split("__"))
}

/// Load the full Config from the default path + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let config: Config = figment_for(path).extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve a host's SNMP community: env var, then keyring, then plaintext.
pub fn resolve_community(entry: &HostEntry, use_keyring: bool) -> Result<SecretString, ConfigError> {
    // 1. Entry's community_env → env var lookup
    if let Some(ref env_name) = entry.community_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. System keyring
    if use_keyring {
        if let Some(secret) = keyring_secret(&format!("{}/community", entry.id)) {
            return Ok(secret);
        }
    }

    // 3. Plaintext in config
    if let Some(ref community) = entry.community {
        return Ok(SecretString::from(community.clone()));
    }

    Err(ConfigError::NoCredentials {
        host: entry.id.clone(),
    })
}

/// Resolve a webhook bearer token. Webhooks without one are valid.
fn resolve_webhook_token(hook: &WebhookEntry, index: usize, use_keyring: bool) -> Option<SecretString> {
    if let Some(ref env_name) = hook.token_env {
        if let Ok(val) = std::env::var(env_name) {
            return Some(SecretString::from(val));
        }
    }

    if use_keyring {
        let user = match hook.name {
            Some(ref name) => format!("webhook/{name}/token"),
            None => format!("webhook/{index}/token"),
        };
        if let Some(secret) = keyring_secret(&user) {
            return Some(secret);
        }
    }

    hook.token.clone().map(SecretString::from)
}

fn keyring_secret(user: &str) -> Option<SecretString> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, user).ok()?;
    entry.get_password().ok().map(SecretString::from)
}

/// Store a host's SNMP community in the system keyring.
pub fn store_community(host_id: &str, community: &str) -> Result<(), ConfigError> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{host_id}/community"))
        .and_then(|entry| entry.set_password(community))
        .map_err(|e| invalid("keyring", e.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use figment::Jail;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    use super::*;

    fn no_keyring(mut cfg: Config) -> Config {
        cfg.defaults.keyring = false;
        cfg
    }

    #[test]
    fn defaults_match_core_defaults() {
        let monitor = Config::default().monitor_config().unwrap();
        assert_eq!(monitor, MonitorConfig::default());
    }

    #[test]
    fn file_and_env_are_layered() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "netpulse.toml",
                r#"
                [monitor]
                interval = "10s"
                failure_threshold = 2

                [[hosts]]
                id = "core"
                address = "10.0.0.1"
                name = "Core switch"
                "#,
            )?;
            jail.set_env("NETPULSE_MONITOR__FAILURE_THRESHOLD", "5");

            let cfg = load_config_from(Path::new("netpulse.toml")).map_err(|e| e.to_string())?;
            let monitor = cfg.monitor_config().map_err(|e| e.to_string())?;
            assert_eq!(monitor.poll_interval, Duration::from_secs(10));
            assert_eq!(monitor.failure_threshold, 5);
            assert_eq!(monitor.ping_timeout, Duration::from_secs(3));

            let hosts = cfg.hosts().map_err(|e| e.to_string())?;
            assert_eq!(hosts.len(), 1);
            assert_eq!(hosts[0].name, "Core switch");
            assert!(hosts[0].traffic_target().is_none());
            Ok(())
        });
    }

    #[test]
    fn community_comes_from_env_first() {
        Jail::expect_with(|jail| {
            jail.set_env("CORE_COMMUNITY", "from-env");
            let mut entry = HostEntry::new("core", "10.0.0.1");
            entry.community_env = Some("CORE_COMMUNITY".into());
            entry.community = Some("from-file".into());
            let secret = resolve_community(&entry, false).map_err(|e| e.to_string())?;
            assert_eq!(secret.expose_secret(), "from-env");
            Ok(())
        });
    }

    #[test]
    fn plaintext_community_is_last_resort() {
        let mut entry = HostEntry::new("core", "10.0.0.1");
        entry.community_env = Some("NETPULSE_TEST_UNSET_COMMUNITY".into());
        entry.community = Some("public".into());
        let secret = resolve_community(&entry, false).unwrap();
        assert_eq!(secret.expose_secret(), "public");

        entry.community = None;
        let err = resolve_community(&entry, false).unwrap_err();
        assert!(matches!(err, ConfigError::NoCredentials { .. }));
    }

    #[test]
    fn snmp_host_needs_if_index() {
        let mut entry = HostEntry::new("sw", "10.0.0.2");
        entry.snmp = true;
        entry.community = Some("public".into());
        let cfg = no_keyring(Config {
            hosts: vec![entry],
            ..Config::default()
        });
        match cfg.hosts().unwrap_err() {
            ConfigError::Validation { field, .. } => assert_eq!(field, "hosts.sw.if_index"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn snmp_settings_carry_through() {
        let mut entry = HostEntry::new("sw", "10.0.0.2");
        entry.snmp = true;
        entry.if_index = Some(7);
        entry.community = Some("public".into());
        entry.snmp_version = SnmpVersion::V1;
        entry.snmp_port = Some(1161);
        entry.name_source = NameSource::IfAlias;
        let cfg = no_keyring(Config {
            hosts: vec![entry],
            ..Config::default()
        });

        let hosts = cfg.hosts().unwrap();
        let snmp = hosts[0].traffic_target().unwrap();
        assert_eq!(snmp.if_index, 7);
        assert_eq!(snmp.port, 1161);
        assert_eq!(snmp.version, SnmpVersion::V1);
        assert_eq!(snmp.name_source, NameSource::IfAlias);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let cfg = Config {
            hosts: vec![
                HostEntry::new("dup", "10.0.0.1"),
                HostEntry::new("dup", "10.0.0.2"),
            ],
            ..Config::default()
        };
        assert!(matches!(cfg.hosts(), Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn malformed_values_are_rejected() {
        let mut cfg = Config::default();
        cfg.monitor.interval = "soon".into();
        match cfg.monitor_config().unwrap_err() {
            ConfigError::Validation { field, .. } => assert_eq!(field, "monitor.interval"),
            other => panic!("unexpected error: {other}"),
        }

        let mut cfg = Config::default();
        cfg.monitor.interval = "500ms".into();
        assert!(cfg.monitor_config().is_err());

        let cfg = Config {
            hosts: vec![HostEntry::new("opt", "-f")],
            ..Config::default()
        };
        assert!(cfg.hosts().is_err());
    }

    #[test]
    fn max_rate_is_in_mbps() {
        let mut cfg = Config::default();
        cfg.monitor.max_rate_mbps = 1_000.0;
        let monitor = cfg.monitor_config().unwrap();
        assert_eq!(monitor.counter_limits.max_rate_bps, 1_000_000_000.0);
    }

    #[test]
    fn webhook_entries_build_notifiers() {
        let cfg = no_keyring(Config {
            webhooks: vec![WebhookEntry {
                name: Some("ops".into()),
                url: "https://hooks.example.com/netpulse".into(),
                timeout: Some("3s".into()),
                token: None,
                token_env: None,
            }],
            ..Config::default()
        });
        assert_eq!(cfg.notifiers().unwrap().len(), 1);

        let bad = no_keyring(Config {
            webhooks: vec![WebhookEntry {
                name: None,
                url: "not a url".into(),
                timeout: None,
                token: None,
                token_env: None,
            }],
            ..Config::default()
        });
        assert!(matches!(bad.notifiers(), Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let cfg = no_keyring(Config::sample());
        save_config_to(&cfg, &path).unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.hosts.len(), 2);
        assert_eq!(loaded.hosts[0].id, "gateway");
        assert_eq!(loaded.hosts[0].if_index, Some(1));
        assert!(!loaded.defaults.keyring);
        loaded.validate().unwrap();
    }
}

// ── Hosts ──
//
// `Host` is the configured target; `MonitoredHost` is the published view
// combining it with live status. Only the status engine writes the live
// half.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use netpulse_probe::{NameSource, SnmpEndpoint, SnmpVersion};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::HostStatus;
use crate::error::CoreError;

// ── HostId ──────────────────────────────────────────────────────────

/// Opaque, stable host identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostId(String);

impl HostId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for HostId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_owned()))
    }
}

impl From<String> for HostId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for HostId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ── SNMP target ─────────────────────────────────────────────────────

/// Which interface to read, and how to reach the agent.
#[derive(Debug, Clone)]
pub struct SnmpSettings {
    pub community: SecretString,
    pub version: SnmpVersion,
    pub if_index: u32,
    pub port: u16,
    pub name_source: NameSource,
}

impl SnmpSettings {
    pub fn new(community: SecretString, if_index: u32) -> Self {
        Self {
            community,
            version: SnmpVersion::default(),
            if_index,
            port: netpulse_probe::snmp::DEFAULT_PORT,
            name_source: NameSource::default(),
        }
    }

    /// Build the transport endpoint for `address`.
    pub fn endpoint(&self, address: &str, timeout: Duration) -> SnmpEndpoint {
        SnmpEndpoint::new(address, self.community.clone())
            .with_port(self.port)
            .with_version(self.version)
            .with_timeout(timeout)
    }
}

// ── Host ────────────────────────────────────────────────────────────

/// A monitored target as supplied by configuration.
#[derive(Debug, Clone)]
pub struct Host {
    pub id: HostId,
    /// Display name, used in notifications.
    pub name: String,
    /// Hostname or IP literal.
    pub address: String,
    pub snmp_enabled: bool,
    pub snmp: Option<SnmpSettings>,
}

impl Host {
    pub fn new(id: impl Into<HostId>, address: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.to_string(),
            id,
            address: address.into(),
            snmp_enabled: false,
            snmp: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_snmp(mut self, settings: SnmpSettings) -> Self {
        self.snmp_enabled = true;
        self.snmp = Some(settings);
        self
    }

    /// The SNMP target, if traffic polling is enabled and configured.
    pub fn traffic_target(&self) -> Option<&SnmpSettings> {
        if self.snmp_enabled {
            self.snmp.as_ref()
        } else {
            None
        }
    }

    /// Reject malformed entries before they reach the scheduler.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.id.as_str().trim().is_empty() {
            return Err(CoreError::config("host id must not be empty"));
        }
        let address = self.address.trim();
        if address.is_empty() {
            return Err(CoreError::config(format!("host '{}' has no address", self.id)));
        }
        if address.starts_with('-') || address.chars().any(char::is_whitespace) {
            return Err(CoreError::config(format!(
                "host '{}' has an invalid address '{}'",
                self.id, self.address
            )));
        }

        if self.snmp_enabled {
            let Some(snmp) = &self.snmp else {
                return Err(CoreError::config(format!(
                    "host '{}' enables SNMP but has no SNMP target",
                    self.id
                )));
            };
            if snmp.community.expose_secret().is_empty() {
                return Err(CoreError::config(format!(
                    "host '{}' has an empty SNMP community",
                    self.id
                )));
            }
            if snmp.if_index == 0 {
                return Err(CoreError::config(format!(
                    "host '{}': ifIndex must be at least 1",
                    self.id
                )));
            }
            if snmp.port == 0 {
                return Err(CoreError::config(format!(
                    "host '{}': SNMP port must not be 0",
                    self.id
                )));
            }
        }
        Ok(())
    }
}

// ── Published view ──────────────────────────────────────────────────

/// Point-in-time view of a host and its live state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitoredHost {
    pub id: HostId,
    pub name: String,
    pub address: String,
    pub snmp_enabled: bool,
    pub status: HostStatus,
    pub last_latency_ms: Option<f64>,
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl MonitoredHost {
    pub(crate) fn fresh(host: &Host) -> Self {
        Self {
            id: host.id.clone(),
            name: host.name.clone(),
            address: host.address.clone(),
            snmp_enabled: host.traffic_target().is_some(),
            status: HostStatus::Unknown,
            last_latency_ms: None,
            last_checked_at: None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn snmp_enabled_without_target_is_rejected() {
        let mut host = Host::new("sw1", "10.0.0.2");
        host.snmp_enabled = true;
        let err = host.validate().unwrap_err();
        assert!(matches!(err, CoreError::Configuration { .. }));
    }

    #[test]
    fn option_like_address_is_rejected() {
        assert!(Host::new("evil", "-c 1000").validate().is_err());
        assert!(Host::new("blank", "  ").validate().is_err());
        assert!(Host::new("", "10.0.0.1").validate().is_err());
    }

    #[test]
    fn valid_snmp_host_passes() {
        let host = Host::new("core", "10.0.0.1")
            .with_name("Core switch")
            .with_snmp(SnmpSettings::new(SecretString::from("public"), 3));
        assert!(host.validate().is_ok());
        assert!(host.traffic_target().is_some());
        assert_eq!(host.name, "Core switch");
    }

    #[test]
    fn disabled_snmp_has_no_traffic_target() {
        let mut host =
            Host::new("core", "10.0.0.1").with_snmp(SnmpSettings::new(SecretString::from("x"), 1));
        host.snmp_enabled = false;
        assert!(host.traffic_target().is_none());
        assert!(!MonitoredHost::fresh(&host).snmp_enabled);
    }
}

// ── SNMP v1/v2c client ──
//
// Layers, bottom-up:
//   ber        -- message codec
//   client     -- UDP request/response with request-id matching
//   traffic    -- interface octet counters (HC first, 32-bit fallback)
//   discovery  -- interface table walk
//
// Everything above the codec talks to the agent through `SnmpTransport`,
// so tests can substitute a canned agent.

pub mod ber;
pub mod client;
pub mod discovery;
pub mod oid;
pub mod traffic;

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

pub use ber::{SnmpValue, VarBind};
pub use client::UdpSnmpClient;
pub use discovery::{InterfaceDescriptor, NameSource, discover_interfaces};
pub use oid::Oid;
pub use traffic::{CounterReading, CounterWidth, OperStatus, read_counters};

use crate::error::Error;

/// Standard SNMP agent port.
pub const DEFAULT_PORT: u16 = 161;

/// Protocol version. v3 is not supported.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SnmpVersion {
    #[serde(alias = "1")]
    #[strum(to_string = "v1", serialize = "1")]
    V1,
    #[default]
    #[serde(alias = "2c")]
    #[strum(to_string = "v2c", serialize = "2c")]
    V2c,
}

impl SnmpVersion {
    /// Value of the `version` field on the wire.
    pub fn wire_value(self) -> i64 {
        match self {
            Self::V1 => 0,
            Self::V2c => 1,
        }
    }

    pub fn from_wire_value(v: i64) -> Option<Self> {
        match v {
            0 => Some(Self::V1),
            1 => Some(Self::V2c),
            _ => None,
        }
    }

    /// v1 has no Counter64, so HC counters are never attempted.
    pub fn supports_counter64(self) -> bool {
        matches!(self, Self::V2c)
    }
}

/// Where and how to reach an agent.
#[derive(Debug, Clone)]
pub struct SnmpEndpoint {
    pub address: String,
    pub port: u16,
    pub community: SecretString,
    pub version: SnmpVersion,
    pub timeout: Duration,
}

impl SnmpEndpoint {
    pub fn new(address: impl Into<String>, community: SecretString) -> Self {
        Self {
            address: address.into(),
            port: DEFAULT_PORT,
            community,
            version: SnmpVersion::default(),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_version(mut self, version: SnmpVersion) -> Self {
        self.version = version;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `host:port`, bracketing bare IPv6 literals.
    pub fn target(&self) -> String {
        if self.address.contains(':') && !self.address.starts_with('[') {
            format!("[{}]:{}", self.address, self.port)
        } else {
            format!("{}:{}", self.address, self.port)
        }
    }

    pub(crate) fn community_bytes(&self) -> &[u8] {
        self.community.expose_secret().as_bytes()
    }

    /// Parse `target()` directly when it is already a socket address.
    pub(crate) fn socket_addr(&self) -> Option<SocketAddr> {
        self.target().parse().ok()
    }
}

/// Request/response access to an SNMP agent.
///
/// Implementations translate agent-level error-status values into
/// [`Error`] variants; a successful return carries exactly one varbind per
/// requested OID, in request order. Per-varbind exceptions
/// (`noSuchObject` and friends) are passed through as values.
#[async_trait]
pub trait SnmpTransport: Send + Sync {
    async fn get(&self, endpoint: &SnmpEndpoint, oids: &[Oid]) -> Result<Vec<VarBind>, Error>;

    async fn get_next(&self, endpoint: &SnmpEndpoint, oids: &[Oid])
    -> Result<Vec<VarBind>, Error>;
}

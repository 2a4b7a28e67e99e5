//! Probe transports for netpulse.
//!
//! Everything here performs exactly one network operation per call and
//! knows nothing about hosts, history or status:
//!
//! - [`ping`] -- ICMP reachability via the system `ping` binary, behind the
//!   [`Pinger`] trait.
//! - [`snmp`] -- a small SNMP v1/v2c client (BER codec + UDP), the
//!   interface counter read, and interface discovery, behind
//!   [`SnmpTransport`].
//! - [`webhook`] -- JSON POST delivery for notifications.
//!
//! Failures are reported through the shared [`Error`] type; an unreachable
//! host is a successful [`PingReply`] with `alive == false`.

pub mod error;
pub mod ping;
pub mod snmp;
pub mod webhook;

pub use error::Error;
pub use ping::{PingReply, Pinger, SystemPinger};
pub use snmp::{
    CounterReading, CounterWidth, InterfaceDescriptor, NameSource, Oid, OperStatus, SnmpEndpoint,
    SnmpTransport, SnmpValue, SnmpVersion, UdpSnmpClient, VarBind, discover_interfaces,
    read_counters,
};
pub use webhook::WebhookClient;

// ── Domain model ──

mod host;
mod sample;
mod status;

pub use host::{Host, HostId, MonitoredHost, SnmpSettings};
pub use sample::{PingResult, TrafficReading, TrafficSample};
pub use status::{HostStatus, StatusLogEntry, StatusTransition, TransitionNotice};

// ── History samples ──
//
// Immutable once constructed. The store hands them out behind `Arc`.

use chrono::{DateTime, Utc};
use netpulse_probe::{CounterReading, CounterWidth};
use serde::Serialize;

use super::HostId;

/// One reachability probe outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PingResult {
    pub host_id: HostId,
    pub timestamp: DateTime<Utc>,
    pub alive: bool,
    /// Present only when `alive`.
    pub latency_ms: Option<f64>,
}

impl PingResult {
    pub fn success(host_id: HostId, timestamp: DateTime<Utc>, latency_ms: f64) -> Self {
        Self {
            host_id,
            timestamp,
            alive: true,
            latency_ms: Some(latency_ms),
        }
    }

    pub fn failure(host_id: HostId, timestamp: DateTime<Utc>) -> Self {
        Self {
            host_id,
            timestamp,
            alive: false,
            latency_ms: None,
        }
    }
}

/// Raw counters as read, before rate derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrafficReading {
    pub timestamp: DateTime<Utc>,
    pub in_octets: u64,
    pub out_octets: u64,
    pub width: CounterWidth,
    pub link_speed_bps: Option<u64>,
}

impl TrafficReading {
    pub fn from_counters(reading: &CounterReading, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            in_octets: reading.in_octets,
            out_octets: reading.out_octets,
            width: reading.width,
            link_speed_bps: reading.link_speed_bps,
        }
    }
}

/// A stored traffic sample with rates derived from its predecessor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrafficSample {
    pub host_id: HostId,
    pub timestamp: DateTime<Utc>,
    pub in_octets: u64,
    pub out_octets: u64,
    pub counter_width_bits: u32,
    /// `None` on the first sample, after a gap, reset or width change.
    pub traffic_in_mbps: Option<f64>,
    pub traffic_out_mbps: Option<f64>,
}

impl TrafficSample {
    pub fn width(&self) -> Option<CounterWidth> {
        CounterWidth::from_bits(self.counter_width_bits)
    }
}

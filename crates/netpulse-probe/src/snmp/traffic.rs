// ── Interface traffic counters ──
//
// One read of the octet counters for a single interface. High-capacity
// (64-bit) counters are preferred; agents that lack them, or v1 sessions,
// fall back to the 32-bit ifTable columns. Status, uptime and link speed
// are best-effort extras fetched in a separate request so a missing
// column cannot take the counters down with it.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::{debug, instrument};

use super::oid::known;
use super::{SnmpEndpoint, SnmpTransport, SnmpValue, VarBind};
use crate::error::Error;

/// Which counter family produced a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum CounterWidth {
    #[serde(rename = "32")]
    #[strum(to_string = "32-bit")]
    Bits32,
    #[serde(rename = "64")]
    #[strum(to_string = "64-bit")]
    Bits64,
}

impl CounterWidth {
    pub fn bits(self) -> u32 {
        match self {
            Self::Bits32 => 32,
            Self::Bits64 => 64,
        }
    }

    /// `2^bits`, the value at which the counter wraps to zero.
    pub fn modulus(self) -> u128 {
        1u128 << self.bits()
    }

    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            32 => Some(Self::Bits32),
            64 => Some(Self::Bits64),
            _ => None,
        }
    }
}

/// IF-MIB::ifOperStatus.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum OperStatus {
    Up,
    Down,
    Testing,
    Unknown,
    Dormant,
    NotPresent,
    LowerLayerDown,
}

impl OperStatus {
    pub fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            1 => Self::Up,
            2 => Self::Down,
            3 => Self::Testing,
            4 => Self::Unknown,
            5 => Self::Dormant,
            6 => Self::NotPresent,
            7 => Self::LowerLayerDown,
            _ => return None,
        })
    }
}

/// Raw counters plus whatever context the agent offered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterReading {
    pub if_index: u32,
    pub in_octets: u64,
    pub out_octets: u64,
    pub width: CounterWidth,
    pub oper_status: Option<OperStatus>,
    /// sysUpTime in hundredths of a second.
    pub sys_uptime_ticks: Option<u32>,
    /// Link speed in bits/s, from ifHighSpeed or ifSpeed.
    pub link_speed_bps: Option<u64>,
}

/// Read the octet counters of `if_index`.
///
/// Fails with [`Error::SnmpUnsupported`] only when neither counter family
/// is available for the interface.
#[instrument(skip(transport, endpoint), fields(target = %endpoint.target()))]
pub async fn read_counters(
    transport: &dyn SnmpTransport,
    endpoint: &SnmpEndpoint,
    if_index: u32,
) -> Result<CounterReading, Error> {
    let (in_octets, out_octets, width) = read_octets(transport, endpoint, if_index).await?;

    let mut reading = CounterReading {
        if_index,
        in_octets,
        out_octets,
        width,
        oper_status: None,
        sys_uptime_ticks: None,
        link_speed_bps: None,
    };

    let mut extras = vec![
        known::sys_uptime(),
        known::if_oper_status().child(if_index),
        known::if_speed().child(if_index),
    ];
    if endpoint.version.supports_counter64() {
        extras.push(known::if_high_speed().child(if_index));
    }

    match transport.get(endpoint, &extras).await {
        Ok(vbs) => {
            let value = |i: usize| vbs.get(i).map(|vb| &vb.value);
            if let Some(SnmpValue::TimeTicks(t)) = value(0) {
                reading.sys_uptime_ticks = Some(*t);
            }
            reading.oper_status = value(1)
                .and_then(SnmpValue::as_i64)
                .and_then(OperStatus::from_code);
            reading.link_speed_bps = link_speed(
                value(3).and_then(SnmpValue::as_u64),
                value(2).and_then(SnmpValue::as_u64),
            );
        }
        // A timeout here means the agent went quiet between requests;
        // surface it rather than report a half-read.
        Err(e) if e.is_timeout() => return Err(e),
        Err(e) => debug!(error = %e, "interface extras unavailable"),
    }

    Ok(reading)
}

async fn read_octets(
    transport: &dyn SnmpTransport,
    endpoint: &SnmpEndpoint,
    if_index: u32,
) -> Result<(u64, u64, CounterWidth), Error> {
    if endpoint.version.supports_counter64() {
        let oids = [
            known::if_hc_in_octets().child(if_index),
            known::if_hc_out_octets().child(if_index),
        ];
        match transport.get(endpoint, &oids).await {
            Ok(vbs) => {
                if let Some((i, o)) = octet_pair(&vbs, true) {
                    return Ok((i, o, CounterWidth::Bits64));
                }
                debug!(if_index, "no HC counters, falling back to 32-bit");
            }
            Err(Error::SnmpUnsupported { .. }) => {
                debug!(if_index, "HC counters rejected, falling back to 32-bit");
            }
            Err(e) => return Err(e),
        }
    }

    let oids = [
        known::if_in_octets().child(if_index),
        known::if_out_octets().child(if_index),
    ];
    let vbs = transport.get(endpoint, &oids).await?;
    octet_pair(&vbs, false)
        .map(|(i, o)| (i, o, CounterWidth::Bits32))
        .ok_or_else(|| Error::SnmpUnsupported {
            target: endpoint.target(),
            what: format!("octet counters for ifIndex {if_index}"),
        })
}

fn octet_pair(vbs: &[VarBind], high_capacity: bool) -> Option<(u64, u64)> {
    let pick = |vb: &VarBind| match (&vb.value, high_capacity) {
        (SnmpValue::Counter64(v), true) => Some(*v),
        (SnmpValue::Counter32(v), false) => Some(u64::from(*v)),
        _ => None,
    };
    match vbs {
        [i, o] => Some((pick(i)?, pick(o)?)),
        _ => None,
    }
}

/// ifHighSpeed is in Mbit/s and wins when non-zero; ifSpeed saturates at
/// 2^32-1 on fast links but is still the best we have without it.
fn link_speed(high_speed_mbps: Option<u64>, speed_bps: Option<u64>) -> Option<u64> {
    match (high_speed_mbps, speed_bps) {
        (Some(mbps), _) if mbps > 0 => Some(mbps.saturating_mul(1_000_000)),
        (_, Some(bps)) if bps > 0 => Some(bps),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use secrecy::SecretString;

    use super::*;
    use crate::snmp::{Oid, SnmpVersion};

    /// Canned agent: answers GETs from a map, `NoSuchObject` otherwise.
    #[derive(Default)]
    struct FakeAgent {
        values: HashMap<Oid, SnmpValue>,
        reject_hc: bool,
        requests: Mutex<Vec<Vec<Oid>>>,
    }

    #[async_trait]
    impl SnmpTransport for FakeAgent {
        async fn get(&self, ep: &SnmpEndpoint, oids: &[Oid]) -> Result<Vec<VarBind>, Error> {
            self.requests.lock().unwrap().push(oids.to_vec());
            if self.reject_hc && oids.iter().any(|o| o.is_under(&known::if_hc_in_octets())) {
                return Err(Error::SnmpUnsupported {
                    target: ep.target(),
                    what: oids[0].to_string(),
                });
            }
            Ok(oids
                .iter()
                .map(|oid| VarBind {
                    oid: oid.clone(),
                    value: self
                        .values
                        .get(oid)
                        .cloned()
                        .unwrap_or(SnmpValue::NoSuchObject),
                })
                .collect())
        }

        async fn get_next(&self, _: &SnmpEndpoint, _: &[Oid]) -> Result<Vec<VarBind>, Error> {
            unreachable!("traffic reads never walk")
        }
    }

    fn endpoint(version: SnmpVersion) -> SnmpEndpoint {
        SnmpEndpoint::new("192.0.2.1", SecretString::from("public")).with_version(version)
    }

    #[tokio::test]
    async fn prefers_hc_counters() {
        let mut agent = FakeAgent::default();
        agent.values.insert(known::if_hc_in_octets().child(2), SnmpValue::Counter64(10_000_000_000));
        agent.values.insert(known::if_hc_out_octets().child(2), SnmpValue::Counter64(42));
        agent.values.insert(known::if_in_octets().child(2), SnmpValue::Counter32(1));
        agent.values.insert(known::if_out_octets().child(2), SnmpValue::Counter32(1));
        agent.values.insert(known::if_oper_status().child(2), SnmpValue::Integer(1));
        agent.values.insert(known::if_high_speed().child(2), SnmpValue::Gauge32(1000));
        agent.values.insert(known::sys_uptime(), SnmpValue::TimeTicks(500));

        let r = read_counters(&agent, &endpoint(SnmpVersion::V2c), 2).await.unwrap();
        assert_eq!(r.width, CounterWidth::Bits64);
        assert_eq!(r.in_octets, 10_000_000_000);
        assert_eq!(r.out_octets, 42);
        assert_eq!(r.oper_status, Some(OperStatus::Up));
        assert_eq!(r.link_speed_bps, Some(1_000_000_000));
        assert_eq!(r.sys_uptime_ticks, Some(500));
    }

    #[tokio::test]
    async fn falls_back_to_32_bit_when_hc_missing() {
        let mut agent = FakeAgent::default();
        agent.values.insert(known::if_in_octets().child(1), SnmpValue::Counter32(100));
        agent.values.insert(known::if_out_octets().child(1), SnmpValue::Counter32(200));
        agent.values.insert(known::if_speed().child(1), SnmpValue::Gauge32(100_000_000));

        let r = read_counters(&agent, &endpoint(SnmpVersion::V2c), 1).await.unwrap();
        assert_eq!(r.width, CounterWidth::Bits32);
        assert_eq!((r.in_octets, r.out_octets), (100, 200));
        assert_eq!(r.link_speed_bps, Some(100_000_000));
        assert_eq!(r.oper_status, None);
    }

    #[tokio::test]
    async fn falls_back_when_agent_rejects_hc() {
        let mut agent = FakeAgent {
            reject_hc: true,
            ..FakeAgent::default()
        };
        agent.values.insert(known::if_in_octets().child(1), SnmpValue::Counter32(7));
        agent.values.insert(known::if_out_octets().child(1), SnmpValue::Counter32(8));

        let r = read_counters(&agent, &endpoint(SnmpVersion::V2c), 1).await.unwrap();
        assert_eq!(r.width, CounterWidth::Bits32);
    }

    #[tokio::test]
    async fn v1_never_asks_for_hc() {
        let mut agent = FakeAgent::default();
        agent.values.insert(known::if_in_octets().child(3), SnmpValue::Counter32(1));
        agent.values.insert(known::if_out_octets().child(3), SnmpValue::Counter32(2));

        read_counters(&agent, &endpoint(SnmpVersion::V1), 3).await.unwrap();
        let requests = agent.requests.lock().unwrap();
        assert!(requests.iter().flatten().all(|o| !o.is_under(&known::if_hc_in_octets())
            && !o.is_under(&known::if_high_speed())));
    }

    #[tokio::test]
    async fn no_counters_is_unsupported() {
        let agent = FakeAgent::default();
        let err = read_counters(&agent, &endpoint(SnmpVersion::V2c), 9).await.unwrap_err();
        assert!(matches!(err, Error::SnmpUnsupported { .. }), "got {err:?}");
    }

    #[test]
    fn high_speed_wins_over_saturated_if_speed() {
        assert_eq!(link_speed(Some(10_000), Some(u64::from(u32::MAX))), Some(10_000_000_000));
        assert_eq!(link_speed(Some(0), Some(1_000)), Some(1_000));
        assert_eq!(link_speed(None, Some(0)), None);
    }

    #[test]
    fn width_modulus() {
        assert_eq!(CounterWidth::Bits32.modulus(), 4_294_967_296);
        assert_eq!(CounterWidth::Bits64.modulus(), u128::from(u64::MAX) + 1);
        assert_eq!(CounterWidth::from_bits(64), Some(CounterWidth::Bits64));
        assert_eq!(CounterWidth::from_bits(16), None);
    }
}

// ── Interface discovery ──
//
// A fixed sequence of table walks: names, then operational status, then
// speed. The interface set is defined by the name step; later steps only
// enrich rows it produced, and a failing enrichment step leaves its field
// empty instead of failing discovery.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::{debug, instrument};

use super::oid::known;
use super::traffic::OperStatus;
use super::{Oid, SnmpEndpoint, SnmpTransport, SnmpValue};
use crate::error::Error;

/// Upper bound on rows per walk; protects against agents that loop.
const MAX_WALK_ROWS: usize = 4096;

/// Which IF-MIB column carries the human-meaningful interface name.
///
/// Vendors disagree: some put the useful label in `ifDescr`, some only
/// populate `ifName`, and some expect operators to read `ifAlias`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum NameSource {
    #[default]
    #[serde(alias = "ifDescr")]
    #[strum(to_string = "if-descr", serialize = "ifdescr")]
    IfDescr,
    #[serde(alias = "ifName")]
    #[strum(to_string = "if-name", serialize = "ifname")]
    IfName,
    #[serde(alias = "ifAlias")]
    #[strum(to_string = "if-alias", serialize = "ifalias")]
    IfAlias,
}

impl NameSource {
    fn column(self) -> Oid {
        match self {
            Self::IfDescr => known::if_descr(),
            Self::IfName => known::if_name(),
            Self::IfAlias => known::if_alias(),
        }
    }
}

/// A normalized interface row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceDescriptor {
    pub if_index: u32,
    pub name: String,
    pub name_source: NameSource,
    pub oper_status: Option<OperStatus>,
    pub speed_bps: Option<u64>,
}

/// Walk the interface table of `endpoint`.
///
/// Rows come from `ifDescr`. When `names` selects another column, its
/// non-empty values replace the description; rows where it is empty keep
/// `ifDescr` and report `IfDescr` as their source. An agent without
/// `ifDescr` is still discovered when the selected column answers, with
/// one row per non-empty value.
#[instrument(skip(transport, endpoint), fields(target = %endpoint.target()))]
pub async fn discover_interfaces(
    transport: &dyn SnmpTransport,
    endpoint: &SnmpEndpoint,
    names: NameSource,
) -> Result<Vec<InterfaceDescriptor>, Error> {
    // Step 1: names. This is the only step allowed to fail discovery.
    let descr = match walk(transport, endpoint, &known::if_descr()).await {
        Ok(descr) => Some(descr),
        Err(e @ Error::SnmpUnsupported { .. }) if names != NameSource::IfDescr => {
            debug!(error = %e, source = %names, "ifDescr unavailable");
            None
        }
        Err(e) => return Err(e),
    };
    let has_descr = descr.is_some();
    let mut rows: BTreeMap<u32, InterfaceDescriptor> = descr
        .unwrap_or_default()
        .into_iter()
        .map(|(idx, value)| {
            let name = value.as_text().unwrap_or_default();
            (idx, blank_row(idx, name, NameSource::IfDescr))
        })
        .collect();

    if names != NameSource::IfDescr {
        match walk(transport, endpoint, &names.column()).await {
            Ok(preferred) => {
                for (idx, value) in preferred {
                    let Some(text) = value.as_text().filter(|t| !t.is_empty()) else {
                        continue;
                    };
                    match rows.get_mut(&idx) {
                        Some(row) => {
                            row.name = text;
                            row.name_source = names;
                        }
                        None if !has_descr => {
                            rows.insert(idx, blank_row(idx, text, names));
                        }
                        None => {}
                    }
                }
            }
            Err(e) if e.is_timeout() || !has_descr => return Err(e),
            Err(e) => debug!(error = %e, source = %names, "name column unavailable"),
        }
    }

    if rows.is_empty() {
        return Err(Error::SnmpUnsupported {
            target: endpoint.target(),
            what: names.column().to_string(),
        });
    }

    // Step 2: operational status.
    match walk(transport, endpoint, &known::if_oper_status()).await {
        Ok(statuses) => {
            for (idx, value) in statuses {
                if let Some(row) = rows.get_mut(&idx) {
                    row.oper_status = value.as_i64().and_then(OperStatus::from_code);
                }
            }
        }
        Err(e) => debug!(error = %e, "ifOperStatus unavailable"),
    }

    // Step 3: speed. ifHighSpeed (Mbit/s) first, ifSpeed for the rest.
    if endpoint.version.supports_counter64() {
        match walk(transport, endpoint, &known::if_high_speed()).await {
            Ok(speeds) => {
                for (idx, value) in speeds {
                    if let (Some(row), Some(mbps)) = (rows.get_mut(&idx), value.as_u64()) {
                        if mbps > 0 {
                            row.speed_bps = Some(mbps.saturating_mul(1_000_000));
                        }
                    }
                }
            }
            Err(e) => debug!(error = %e, "ifHighSpeed unavailable"),
        }
    }
    if rows.values().any(|r| r.speed_bps.is_none()) {
        match walk(transport, endpoint, &known::if_speed()).await {
            Ok(speeds) => {
                for (idx, value) in speeds {
                    if let Some(row) = rows.get_mut(&idx) {
                        if row.speed_bps.is_none() {
                            row.speed_bps = value.as_u64().filter(|bps| *bps > 0);
                        }
                    }
                }
            }
            Err(e) => debug!(error = %e, "ifSpeed unavailable"),
        }
    }

    Ok(rows.into_values().collect())
}

fn blank_row(if_index: u32, name: String, name_source: NameSource) -> InterfaceDescriptor {
    InterfaceDescriptor {
        if_index,
        name,
        name_source,
        oper_status: None,
        speed_bps: None,
    }
}

/// GETNEXT through one table column, returning `(row index, value)`.
///
/// Stops at the end of the column, at `endOfMibView`, or when a v1 agent
/// answers `noSuchName`. An agent that does not advance is an error.
pub async fn walk(
    transport: &dyn SnmpTransport,
    endpoint: &SnmpEndpoint,
    column: &Oid,
) -> Result<Vec<(u32, SnmpValue)>, Error> {
    let mut rows = Vec::new();
    let mut cursor = column.clone();

    while rows.len() < MAX_WALK_ROWS {
        let vbs = match transport.get_next(endpoint, std::slice::from_ref(&cursor)).await {
            Ok(vbs) => vbs,
            Err(Error::SnmpUnsupported { .. }) if !rows.is_empty() => break,
            Err(e) => return Err(e),
        };
        let Some(vb) = vbs.into_iter().next() else {
            break;
        };
        if vb.value.is_exception() || !vb.oid.is_under(column) {
            break;
        }
        if vb.oid <= cursor {
            return Err(Error::Codec(format!(
                "agent did not advance past {cursor} during walk"
            )));
        }
        let Some(idx) = vb.oid.last_arc() else { break };
        cursor = vb.oid;
        rows.push((idx, vb.value));
    }

    if rows.is_empty() {
        return Err(Error::SnmpUnsupported {
            target: endpoint.target(),
            what: column.to_string(),
        });
    }
    Ok(rows)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use secrecy::SecretString;

    use super::*;
    use crate::snmp::VarBind;

    /// Ordered MIB view answering GETNEXT lexicographically.
    struct FakeMib(BTreeMap<Oid, SnmpValue>);

    impl FakeMib {
        fn new(entries: Vec<(Oid, SnmpValue)>) -> Self {
            Self(entries.into_iter().collect())
        }
    }

    #[async_trait]
    impl SnmpTransport for FakeMib {
        async fn get(&self, _: &SnmpEndpoint, _: &[Oid]) -> Result<Vec<VarBind>, Error> {
            unreachable!("discovery only walks")
        }

        async fn get_next(&self, _: &SnmpEndpoint, oids: &[Oid]) -> Result<Vec<VarBind>, Error> {
            Ok(oids
                .iter()
                .map(|oid| {
                    self.0
                        .range::<Oid, _>((std::ops::Bound::Excluded(oid), std::ops::Bound::Unbounded))
                        .next()
                        .map_or(
                            VarBind {
                                oid: oid.clone(),
                                value: SnmpValue::EndOfMibView,
                            },
                            |(k, v)| VarBind {
                                oid: k.clone(),
                                value: v.clone(),
                            },
                        )
                })
                .collect())
        }
    }

    fn text(s: &str) -> SnmpValue {
        SnmpValue::OctetString(s.as_bytes().to_vec())
    }

    fn endpoint() -> SnmpEndpoint {
        SnmpEndpoint::new("192.0.2.1", SecretString::from("public"))
    }

    fn switch_mib() -> FakeMib {
        FakeMib::new(vec![
            (known::if_descr().child(1), text("lo")),
            (known::if_descr().child(2), text("GigabitEthernet0/1")),
            (known::if_speed().child(1), SnmpValue::Gauge32(10_000_000)),
            (known::if_speed().child(2), SnmpValue::Gauge32(u32::MAX)),
            (known::if_oper_status().child(1), SnmpValue::Integer(1)),
            (known::if_oper_status().child(2), SnmpValue::Integer(2)),
            (known::if_name().child(1), text("lo")),
            (known::if_name().child(2), text("Gi0/1")),
            (known::if_high_speed().child(2), SnmpValue::Gauge32(10_000)),
            (known::if_alias().child(1), text("")),
            (known::if_alias().child(2), text("uplink to core")),
        ])
    }

    #[tokio::test]
    async fn walks_names_status_and_speed() {
        let rows = discover_interfaces(&switch_mib(), &endpoint(), NameSource::IfDescr)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].name, "GigabitEthernet0/1");
        assert_eq!(rows[1].oper_status, Some(OperStatus::Down));
        assert_eq!(rows[1].speed_bps, Some(10_000_000_000));
        assert_eq!(rows[0].speed_bps, Some(10_000_000));
    }

    #[tokio::test]
    async fn alias_source_falls_back_to_descr_when_empty() {
        let rows = discover_interfaces(&switch_mib(), &endpoint(), NameSource::IfAlias)
            .await
            .unwrap();
        assert_eq!(rows[0].name, "lo");
        assert_eq!(rows[0].name_source, NameSource::IfDescr);
        assert_eq!(rows[1].name, "uplink to core");
        assert_eq!(rows[1].name_source, NameSource::IfAlias);
    }

    #[tokio::test]
    async fn names_from_if_name_when_descr_is_missing() {
        let mib = FakeMib::new(vec![
            (known::if_oper_status().child(3), SnmpValue::Integer(1)),
            (known::if_name().child(3), text("xe-0/0/0")),
            (known::if_name().child(4), text("")),
            (known::if_name().child(5), text("xe-0/0/1")),
        ]);
        let rows = discover_interfaces(&mib, &endpoint(), NameSource::IfName)
            .await
            .unwrap();
        let names: Vec<_> = rows.iter().map(|r| (r.if_index, r.name.as_str())).collect();
        assert_eq!(names, vec![(3, "xe-0/0/0"), (5, "xe-0/0/1")]);
        assert!(rows.iter().all(|r| r.name_source == NameSource::IfName));
        assert_eq!(rows[0].oper_status, Some(OperStatus::Up));

        let err = discover_interfaces(&mib, &endpoint(), NameSource::IfDescr)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SnmpUnsupported { .. }));
    }

    #[tokio::test]
    async fn empty_table_is_unsupported() {
        let mib = FakeMib::new(vec![(known::sys_uptime(), SnmpValue::TimeTicks(1))]);
        let err = discover_interfaces(&mib, &endpoint(), NameSource::IfName)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SnmpUnsupported { .. }));
    }

    #[test]
    fn name_source_parses() {
        assert_eq!("ifName".parse::<NameSource>().unwrap(), NameSource::IfName);
        assert_eq!("if-alias".parse::<NameSource>().unwrap(), NameSource::IfAlias);
    }
}

// ── Object identifiers ──
//
// Dotted-decimal OIDs plus the handful of MIB-II / IF-MIB columns the
// traffic probe and interface discovery read.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// An SNMP object identifier, e.g. `1.3.6.1.2.1.1.3.0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Oid(Vec<u32>);

impl Oid {
    pub fn new(arcs: impl Into<Vec<u32>>) -> Self {
        Self(arcs.into())
    }

    pub fn arcs(&self) -> &[u32] {
        &self.0
    }

    /// Append a sub-identifier (typically an ifIndex).
    pub fn child(&self, arc: u32) -> Self {
        let mut arcs = self.0.clone();
        arcs.push(arc);
        Self(arcs)
    }

    /// `true` if `self` lies strictly below `prefix` in the OID tree.
    pub fn is_under(&self, prefix: &Oid) -> bool {
        self.0.len() > prefix.0.len() && self.0.starts_with(&prefix.0)
    }

    /// The last arc, used to recover the row index during a table walk.
    pub fn last_arc(&self) -> Option<u32> {
        self.0.last().copied()
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for arc in &self.0 {
            if !first {
                f.write_str(".")?;
            }
            write!(f, "{arc}")?;
            first = false;
        }
        Ok(())
    }
}

impl FromStr for Oid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches('.');
        let arcs = trimmed
            .split('.')
            .map(|part| {
                part.parse::<u32>()
                    .map_err(|_| Error::Codec(format!("invalid OID '{s}'")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if arcs.len() < 2 {
            return Err(Error::Codec(format!("OID '{s}' needs at least two arcs")));
        }
        Ok(Self(arcs))
    }
}

impl TryFrom<String> for Oid {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Oid> for String {
    fn from(oid: Oid) -> Self {
        oid.to_string()
    }
}

/// Well-known columns. Table columns take the ifIndex as a child arc.
pub mod known {
    use super::Oid;

    const MIB2: [u32; 6] = [1, 3, 6, 1, 2, 1];

    fn mib2(rest: &[u32]) -> Oid {
        let mut arcs = MIB2.to_vec();
        arcs.extend_from_slice(rest);
        Oid::new(arcs)
    }

    /// SNMPv2-MIB::sysUpTime.0
    pub fn sys_uptime() -> Oid {
        mib2(&[1, 3, 0])
    }

    /// IF-MIB::ifDescr
    pub fn if_descr() -> Oid {
        mib2(&[2, 2, 1, 2])
    }

    /// IF-MIB::ifSpeed (bits/s, saturates at 2^32-1)
    pub fn if_speed() -> Oid {
        mib2(&[2, 2, 1, 5])
    }

    /// IF-MIB::ifOperStatus
    pub fn if_oper_status() -> Oid {
        mib2(&[2, 2, 1, 8])
    }

    /// IF-MIB::ifInOctets (Counter32)
    pub fn if_in_octets() -> Oid {
        mib2(&[2, 2, 1, 10])
    }

    /// IF-MIB::ifOutOctets (Counter32)
    pub fn if_out_octets() -> Oid {
        mib2(&[2, 2, 1, 16])
    }

    /// IF-MIB::ifName
    pub fn if_name() -> Oid {
        mib2(&[31, 1, 1, 1, 1])
    }

    /// IF-MIB::ifHCInOctets (Counter64)
    pub fn if_hc_in_octets() -> Oid {
        mib2(&[31, 1, 1, 1, 6])
    }

    /// IF-MIB::ifHCOutOctets (Counter64)
    pub fn if_hc_out_octets() -> Oid {
        mib2(&[31, 1, 1, 1, 10])
    }

    /// IF-MIB::ifHighSpeed (Mbit/s)
    pub fn if_high_speed() -> Oid {
        mib2(&[31, 1, 1, 1, 15])
    }

    /// IF-MIB::ifAlias
    pub fn if_alias() -> Oid {
        mib2(&[31, 1, 1, 1, 18])
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() {
        let oid: Oid = ".1.3.6.1.2.1.1.3.0".parse().unwrap();
        assert_eq!(oid.to_string(), "1.3.6.1.2.1.1.3.0");
        assert_eq!(oid, known::sys_uptime());
    }

    #[test]
    fn rejects_garbage() {
        assert!("1.3.x".parse::<Oid>().is_err());
        assert!("1".parse::<Oid>().is_err());
        assert!("".parse::<Oid>().is_err());
    }

    #[test]
    fn table_walk_helpers() {
        let column = known::if_descr();
        let row = column.child(7);
        assert!(row.is_under(&column));
        assert!(!column.is_under(&column));
        assert!(!known::if_name().child(7).is_under(&column));
        assert_eq!(row.last_arc(), Some(7));
    }
}

// ── Host registry ──
//
// The configured host set plus the live monitored view. Configuration
// replaces the whole set atomically from the caller's point of view:
// the new list is validated in full before anything changes. Live status
// survives for hosts present in both the old and the new list.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::watch;
use tracing::debug;

use crate::error::CoreError;
use crate::model::{Host, HostId, HostStatus, MonitoredHost};
use crate::stream::{HostStream, Snapshot};

/// Result of a host-list replacement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostChanges {
    pub added: Vec<HostId>,
    pub removed: Vec<HostId>,
}

/// Reactive store of configured hosts and their live state.
pub struct HostRegistry {
    hosts: DashMap<HostId, Arc<Host>>,
    live: DashMap<HostId, Arc<MonitoredHost>>,
    /// Serializes whole-list replacement.
    replace_lock: Mutex<()>,
    version: watch::Sender<u64>,
    snapshot: watch::Sender<Snapshot<MonitoredHost>>,
}

impl Default for HostRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HostRegistry {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            hosts: DashMap::new(),
            live: DashMap::new(),
            replace_lock: Mutex::new(()),
            version,
            snapshot,
        }
    }

    /// Replace the configured host set.
    ///
    /// Fails without changing anything if any host is invalid or an id
    /// appears twice.
    pub fn replace_hosts(&self, hosts: Vec<Host>) -> Result<HostChanges, CoreError> {
        let mut seen = HashSet::with_capacity(hosts.len());
        for host in &hosts {
            host.validate()?;
            if !seen.insert(host.id.clone()) {
                return Err(CoreError::config(format!("duplicate host id '{}'", host.id)));
            }
        }

        let _guard = self
            .replace_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let mut changes = HostChanges::default();
        let stale: Vec<HostId> = self
            .hosts
            .iter()
            .map(|r| r.key().clone())
            .filter(|id| !seen.contains(id))
            .collect();
        for id in stale {
            self.hosts.remove(&id);
            self.live.remove(&id);
            changes.removed.push(id);
        }

        for host in hosts {
            let fresh = MonitoredHost::fresh(&host);
            match self.live.entry(host.id.clone()) {
                Entry::Occupied(mut view) => {
                    let prev = Arc::clone(view.get());
                    view.insert(Arc::new(MonitoredHost {
                        status: prev.status,
                        last_latency_ms: prev.last_latency_ms,
                        last_checked_at: prev.last_checked_at,
                        ..fresh
                    }));
                }
                Entry::Vacant(slot) => {
                    slot.insert(Arc::new(fresh));
                }
            }
            if self.hosts.insert(host.id.clone(), Arc::new(host.clone())).is_none() {
                changes.added.push(host.id);
            }
        }

        changes.added.sort();
        changes.removed.sort();
        debug!(
            added = changes.added.len(),
            removed = changes.removed.len(),
            total = self.hosts.len(),
            "host list replaced"
        );
        self.publish();
        Ok(changes)
    }

    /// Record the outcome of a status evaluation on the live view.
    ///
    /// Ignored for hosts that are no longer configured.
    pub(crate) fn record_check(
        &self,
        id: &HostId,
        status: HostStatus,
        latency_ms: Option<f64>,
        at: DateTime<Utc>,
    ) {
        let updated = match self.live.get_mut(id) {
            Some(mut view) => {
                let next = MonitoredHost {
                    status,
                    last_latency_ms: latency_ms,
                    last_checked_at: Some(at),
                    ..MonitoredHost::clone(&view)
                };
                *view = Arc::new(next);
                true
            }
            None => false,
        };
        if updated {
            self.publish();
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Configured hosts, ordered by id.
    pub fn hosts(&self) -> Vec<Arc<Host>> {
        let mut hosts: Vec<_> = self.hosts.iter().map(|r| Arc::clone(r.value())).collect();
        hosts.sort_by(|a, b| a.id.cmp(&b.id));
        hosts
    }

    pub fn host(&self, id: &HostId) -> Option<Arc<Host>> {
        self.hosts.get(id).map(|r| Arc::clone(r.value()))
    }

    /// Live view of one host.
    pub fn get(&self, id: &HostId) -> Option<Arc<MonitoredHost>> {
        self.live.get(id).map(|r| Arc::clone(r.value()))
    }

    pub fn contains(&self, id: &HostId) -> bool {
        self.hosts.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Current live view of all hosts, ordered by id.
    pub fn snapshot(&self) -> Snapshot<MonitoredHost> {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> HostStream {
        HostStream::new(self.snapshot.subscribe())
    }

    /// Bumped on every published change.
    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    // ── Private helpers ──────────────────────────────────────────────

    /// Rebuild and send the snapshot.
    ///
    /// The live view is read while the snapshot channel is write-locked, so
    /// concurrent publishers are serialized and the last one to send has
    /// seen every write that preceded it. Callers must not hold a `live`
    /// entry guard.
    fn publish(&self) {
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| {
            let mut values: Vec<Arc<MonitoredHost>> =
                self.live.iter().map(|r| Arc::clone(r.value())).collect();
            values.sort_by(|a, b| a.id.cmp(&b.id));
            *snap = Arc::new(values);
            self.version.send_modify(|v| *v += 1);
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap()
    }

    fn ids(list: &[Arc<MonitoredHost>]) -> Vec<&str> {
        list.iter().map(|h| h.id.as_str()).collect()
    }

    #[test]
    fn replace_reports_changes_and_sorts_snapshot() {
        let reg = HostRegistry::new();
        let changes = reg
            .replace_hosts(vec![Host::new("b", "10.0.0.2"), Host::new("a", "10.0.0.1")])
            .unwrap();
        assert_eq!(changes.added, vec![HostId::from("a"), HostId::from("b")]);
        assert_eq!(ids(&reg.snapshot()), vec!["a", "b"]);

        let changes = reg
            .replace_hosts(vec![Host::new("b", "10.0.0.2"), Host::new("c", "10.0.0.3")])
            .unwrap();
        assert_eq!(changes.added, vec![HostId::from("c")]);
        assert_eq!(changes.removed, vec![HostId::from("a")]);
        assert_eq!(ids(&reg.snapshot()), vec!["b", "c"]);
    }

    #[test]
    fn invalid_list_changes_nothing() {
        let reg = HostRegistry::new();
        reg.replace_hosts(vec![Host::new("a", "10.0.0.1")]).unwrap();
        let version = reg.version();

        let err = reg
            .replace_hosts(vec![Host::new("x", "10.0.0.9"), Host::new("x", "10.0.0.8")])
            .unwrap_err();
        assert!(matches!(err, CoreError::Configuration { .. }));
        assert!(reg.replace_hosts(vec![Host::new("y", "")]).is_err());

        assert_eq!(reg.version(), version);
        assert!(reg.contains(&HostId::from("a")));
        assert!(!reg.contains(&HostId::from("x")));
    }

    #[test]
    fn surviving_hosts_keep_live_status() {
        let reg = HostRegistry::new();
        reg.replace_hosts(vec![Host::new("a", "10.0.0.1")]).unwrap();
        reg.record_check(&HostId::from("a"), HostStatus::Online, Some(1.5), at());

        reg.replace_hosts(vec![Host::new("a", "10.0.0.100").with_name("renamed")])
            .unwrap();
        let view = reg.get(&HostId::from("a")).unwrap();
        assert_eq!(view.status, HostStatus::Online);
        assert_eq!(view.last_latency_ms, Some(1.5));
        assert_eq!(view.name, "renamed");
        assert_eq!(view.address, "10.0.0.100");
    }

    #[test]
    fn record_check_ignores_unknown_hosts() {
        let reg = HostRegistry::new();
        let version = reg.version();
        reg.record_check(&HostId::from("ghost"), HostStatus::Offline, None, at());
        assert_eq!(reg.version(), version);
        assert!(reg.get(&HostId::from("ghost")).is_none());
    }

    #[test]
    fn concurrent_checks_all_reach_the_snapshot() {
        const HOSTS: usize = 64;
        for _ in 0..50 {
            let reg = Arc::new(HostRegistry::new());
            reg.replace_hosts(
                (0..HOSTS)
                    .map(|n| Host::new(format!("h{n:02}"), format!("10.0.0.{}", n + 1)))
                    .collect(),
            )
            .unwrap();
            let version = reg.version();

            let workers: Vec<_> = (0..HOSTS)
                .map(|n| {
                    let reg = Arc::clone(&reg);
                    std::thread::spawn(move || {
                        let id = HostId::from(format!("h{n:02}"));
                        reg.record_check(&id, HostStatus::Online, Some(1.0), at());
                    })
                })
                .collect();
            for worker in workers {
                worker.join().unwrap();
            }

            let snap = reg.snapshot();
            assert_eq!(snap.len(), HOSTS);
            for host in snap.iter() {
                assert_eq!(host.status, HostStatus::Online, "{} stale in snapshot", host.id);
                assert_eq!(reg.get(&host.id).unwrap().status, host.status);
            }
            assert_eq!(reg.version(), version + u64::try_from(HOSTS).unwrap());
        }
    }

    #[tokio::test]
    async fn subscribers_see_status_changes() {
        let reg = HostRegistry::new();
        reg.replace_hosts(vec![Host::new("a", "10.0.0.1")]).unwrap();
        let mut stream = reg.subscribe();
        assert_eq!(stream.current()[0].status, HostStatus::Unknown);

        reg.record_check(&HostId::from("a"), HostStatus::Offline, None, at());
        let snap = stream.changed().await.unwrap();
        assert_eq!(snap[0].status, HostStatus::Offline);
        assert_eq!(snap[0].last_checked_at, Some(at()));
    }
}

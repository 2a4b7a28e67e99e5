// ── History store ──
//
// Bounded per-host buffers for ping results, traffic samples and the
// status log. Each host has its own lock: writes for one host are
// serialized, writes for different hosts proceed in parallel. Entries are
// shared as `Arc` and never mutated after they are pushed, so a reader
// sees either the whole entry or nothing.

mod period;

use std::collections::VecDeque;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::trace;

pub use period::Period;

use crate::config::RetentionLimits;
use crate::counter::{self, CounterLimits, CounterPoint};
use crate::error::CoreError;
use crate::model::{
    HostId, HostStatus, PingResult, StatusLogEntry, TrafficReading, TrafficSample,
};

#[derive(Default)]
struct HostHistory {
    pings: VecDeque<Arc<PingResult>>,
    traffic: VecDeque<Arc<TrafficSample>>,
    status_log: VecDeque<StatusLogEntry>,
}

type Slot = Arc<RwLock<HostHistory>>;

/// Time-ordered, bounded sample history for every host.
pub struct HistoryStore {
    retention: RetentionLimits,
    counter_limits: CounterLimits,
    hosts: DashMap<HostId, Slot>,
}

impl HistoryStore {
    pub fn new(retention: RetentionLimits, counter_limits: CounterLimits) -> Self {
        Self {
            retention,
            counter_limits,
            hosts: DashMap::new(),
        }
    }

    pub fn retention(&self) -> RetentionLimits {
        self.retention
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Append a ping result, evicting the oldest past the cap.
    pub fn append_ping(&self, result: PingResult) -> Arc<PingResult> {
        let slot = self.slot(&result.host_id);
        let entry = Arc::new(result);
        let mut h = write(&slot);
        push_bounded(&mut h.pings, Arc::clone(&entry), self.retention.pings);
        entry
    }

    /// Append a fully formed traffic sample.
    ///
    /// Samples must arrive in timestamp order; an older or equal timestamp
    /// is a [`CoreError::StorageWrite`].
    pub fn append_traffic(&self, sample: TrafficSample) -> Result<Arc<TrafficSample>, CoreError> {
        let slot = self.slot(&sample.host_id);
        let mut h = write(&slot);
        if let Some(last) = h.traffic.back() {
            ensure_after(&sample.host_id, last.timestamp, sample.timestamp)?;
        }
        let entry = Arc::new(sample);
        push_bounded(&mut h.traffic, Arc::clone(&entry), self.retention.traffic);
        Ok(entry)
    }

    /// Derive rates from the host's previous sample and append.
    ///
    /// Rate derivation and append happen under one lock, so concurrent
    /// ingests for the same host cannot both compute against the same
    /// predecessor.
    pub fn ingest_traffic(
        &self,
        host_id: &HostId,
        reading: TrafficReading,
    ) -> Result<Arc<TrafficSample>, CoreError> {
        let slot = self.slot(host_id);
        let mut h = write(&slot);

        let previous = h.traffic.back().cloned();
        if let Some(prev) = &previous {
            ensure_after(host_id, prev.timestamp, reading.timestamp)?;
        }

        let limits = self.counter_limits.capped_at_link(reading.link_speed_bps);
        let (traffic_in_mbps, traffic_out_mbps) = match previous.as_deref() {
            Some(prev) => {
                let rate = |prev_value: u64, cur_value: u64| {
                    let prev_point = CounterPoint {
                        value: prev_value,
                        at: prev.timestamp,
                        width: prev.width()?,
                    };
                    let cur_point = CounterPoint {
                        value: cur_value,
                        at: reading.timestamp,
                        width: reading.width,
                    };
                    counter::rate_between(&prev_point, &cur_point, &limits)
                        .map(counter::bps_to_mbps)
                };
                (
                    rate(prev.in_octets, reading.in_octets),
                    rate(prev.out_octets, reading.out_octets),
                )
            }
            None => (None, None),
        };

        let sample = Arc::new(TrafficSample {
            host_id: host_id.clone(),
            timestamp: reading.timestamp,
            in_octets: reading.in_octets,
            out_octets: reading.out_octets,
            counter_width_bits: reading.width.bits(),
            traffic_in_mbps,
            traffic_out_mbps,
        });
        trace!(host = %host_id, in_mbps = ?traffic_in_mbps, out_mbps = ?traffic_out_mbps, "traffic sample");
        push_bounded(&mut h.traffic, Arc::clone(&sample), self.retention.traffic);
        Ok(sample)
    }

    /// Log `status` unless it repeats the host's last logged state.
    ///
    /// A host with no log yet counts as `unknown`. Returns whether an
    /// entry was written.
    pub(crate) fn record_status(&self, host_id: &HostId, status: HostStatus, at: DateTime<Utc>) -> bool {
        let slot = self.slot(host_id);
        let mut h = write(&slot);
        let last = h.status_log.back().map_or(HostStatus::Unknown, |e| e.status);
        if last == status {
            return false;
        }
        push_bounded(
            &mut h.status_log,
            StatusLogEntry { status, at },
            self.retention.status_log,
        );
        true
    }

    /// Drop everything kept for a host that left the configuration.
    pub fn forget(&self, host_id: &HostId) -> bool {
        self.hosts.remove(host_id).is_some()
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// The newest `limit` ping results, oldest first.
    pub fn recent_pings(&self, host_id: &HostId, limit: usize) -> Vec<Arc<PingResult>> {
        self.read_with(host_id, |h| {
            let skip = h.pings.len().saturating_sub(limit);
            h.pings.iter().skip(skip).cloned().collect()
        })
        .unwrap_or_default()
    }

    /// Samples with `from <= timestamp <= to`, oldest first.
    pub fn traffic_in_range(
        &self,
        host_id: &HostId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Vec<Arc<TrafficSample>> {
        if from > to {
            return Vec::new();
        }
        self.read_with(host_id, |h| {
            let start = h.traffic.partition_point(|s| s.timestamp < from);
            let end = h.traffic.partition_point(|s| s.timestamp <= to);
            h.traffic.range(start..end).cloned().collect()
        })
        .unwrap_or_default()
    }

    /// Samples in the named window ending at `now`.
    pub fn traffic_for_period(
        &self,
        host_id: &HostId,
        period: Period,
        now: DateTime<Utc>,
    ) -> Vec<Arc<TrafficSample>> {
        self.traffic_in_range(host_id, period.start(now), now)
    }

    pub fn latest_traffic(&self, host_id: &HostId) -> Option<Arc<TrafficSample>> {
        self.read_with(host_id, |h| h.traffic.back().cloned()).flatten()
    }

    /// The newest `limit` status-log entries, oldest first.
    pub fn status_log(&self, host_id: &HostId, limit: usize) -> Vec<StatusLogEntry> {
        self.read_with(host_id, |h| {
            let skip = h.status_log.len().saturating_sub(limit);
            h.status_log.iter().skip(skip).cloned().collect()
        })
        .unwrap_or_default()
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn slot(&self, host_id: &HostId) -> Slot {
        if let Some(slot) = self.hosts.get(host_id) {
            return Arc::clone(slot.value());
        }
        Arc::clone(self.hosts.entry(host_id.clone()).or_default().value())
    }

    fn read_with<R>(&self, host_id: &HostId, f: impl FnOnce(&HostHistory) -> R) -> Option<R> {
        let slot = self.hosts.get(host_id).map(|s| Arc::clone(s.value()))?;
        let h = read(&slot);
        Some(f(&h))
    }
}

fn push_bounded<T>(buf: &mut VecDeque<T>, item: T, cap: usize) {
    buf.push_back(item);
    while buf.len() > cap {
        buf.pop_front();
    }
}

fn ensure_after(
    host_id: &HostId,
    last: DateTime<Utc>,
    next: DateTime<Utc>,
) -> Result<(), CoreError> {
    if next <= last {
        return Err(CoreError::StorageWrite {
            host_id: host_id.to_string(),
            message: format!("sample at {next} is not after the last stored sample at {last}"),
        });
    }
    Ok(())
}

// A panic while holding a host lock leaves only whole entries behind, so
// a poisoned lock is still safe to use.
fn read(slot: &Slot) -> RwLockReadGuard<'_, HostHistory> {
    slot.read().unwrap_or_else(PoisonError::into_inner)
}

fn write(slot: &Slot) -> RwLockWriteGuard<'_, HostHistory> {
    slot.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use chrono::{TimeDelta, TimeZone};
    use netpulse_probe::CounterWidth;
    use pretty_assertions::assert_eq;

    use super::*;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 8, 0, 0).unwrap() + TimeDelta::seconds(secs)
    }

    fn store() -> HistoryStore {
        HistoryStore::new(
            RetentionLimits {
                pings: 3,
                traffic: 4,
                status_log: 2,
            },
            CounterLimits::default(),
        )
    }

    fn reading(secs: i64, in_octets: u64, out_octets: u64, width: CounterWidth) -> TrafficReading {
        TrafficReading {
            timestamp: t(secs),
            in_octets,
            out_octets,
            width,
            link_speed_bps: None,
        }
    }

    fn host() -> HostId {
        HostId::from("edge-rtr")
    }

    #[test]
    fn ping_history_is_bounded_oldest_first() {
        let store = store();
        for i in 0..5 {
            store.append_ping(PingResult::success(host(), t(i), 1.0));
            assert!(store.recent_pings(&host(), usize::MAX).len() <= 3);
        }
        let kept: Vec<_> = store
            .recent_pings(&host(), 10)
            .iter()
            .map(|p| p.timestamp)
            .collect();
        assert_eq!(kept, vec![t(2), t(3), t(4)]);

        let last_two = store.recent_pings(&host(), 2);
        assert_eq!(last_two[0].timestamp, t(3));
    }

    #[test]
    fn first_sample_has_no_rate() {
        let store = store();
        let s = store
            .ingest_traffic(&host(), reading(0, 1_000, 2_000, CounterWidth::Bits64))
            .unwrap();
        assert_eq!(s.traffic_in_mbps, None);
        assert_eq!(s.traffic_out_mbps, None);
    }

    #[test]
    fn rates_derive_from_predecessor() {
        let store = store();
        store
            .ingest_traffic(&host(), reading(0, 0, 0, CounterWidth::Bits64))
            .unwrap();
        let s = store
            .ingest_traffic(&host(), reading(10, 12_500_000, 1_250_000, CounterWidth::Bits64))
            .unwrap();
        assert_eq!(s.traffic_in_mbps, Some(10.0));
        assert_eq!(s.traffic_out_mbps, Some(1.0));
        assert_eq!(store.latest_traffic(&host()).unwrap().timestamp, t(10));
    }

    #[test]
    fn width_change_nulls_rates() {
        let store = store();
        store
            .ingest_traffic(&host(), reading(0, 100, 100, CounterWidth::Bits32))
            .unwrap();
        let s = store
            .ingest_traffic(&host(), reading(30, 200, 200, CounterWidth::Bits64))
            .unwrap();
        assert_eq!(s.traffic_in_mbps, None);
        assert_eq!(s.counter_width_bits, 64);
    }

    #[test]
    fn reset_on_capped_link_has_no_rate() {
        let store = store();
        store
            .ingest_traffic(&host(), reading(0, 5_000_000, 0, CounterWidth::Bits32))
            .unwrap();
        let mut next = reading(10, 10, 0, CounterWidth::Bits32);
        next.link_speed_bps = Some(1_000_000_000);
        let s = store.ingest_traffic(&host(), next).unwrap();
        assert_eq!(s.traffic_in_mbps, None);
        assert_eq!(s.traffic_out_mbps, Some(0.0));
    }

    #[test]
    fn out_of_order_sample_is_rejected() {
        let store = store();
        store
            .ingest_traffic(&host(), reading(10, 0, 0, CounterWidth::Bits64))
            .unwrap();
        let err = store
            .ingest_traffic(&host(), reading(10, 5, 5, CounterWidth::Bits64))
            .unwrap_err();
        assert!(matches!(err, CoreError::StorageWrite { .. }));
        assert_eq!(store.traffic_in_range(&host(), t(0), t(100)).len(), 1);
    }

    #[test]
    fn range_query_is_inclusive_and_bounded() {
        let store = store();
        for i in 0..6 {
            store
                .ingest_traffic(&host(), reading(i * 60, 0, 0, CounterWidth::Bits64))
                .unwrap();
        }
        // Cap is 4: samples at 120..=300 remain.
        let all = store.traffic_in_range(&host(), t(0), t(1_000));
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].timestamp, t(120));

        let mid = store.traffic_in_range(&host(), t(180), t(240));
        assert_eq!(
            mid.iter().map(|s| s.timestamp).collect::<Vec<_>>(),
            vec![t(180), t(240)]
        );
        assert!(store.traffic_in_range(&host(), t(240), t(180)).is_empty());
    }

    #[test]
    fn period_window_ends_at_now() {
        let store = store();
        store
            .ingest_traffic(&host(), reading(0, 0, 0, CounterWidth::Bits64))
            .unwrap();
        store
            .ingest_traffic(&host(), reading(3_000, 0, 0, CounterWidth::Bits64))
            .unwrap();
        let hour = store.traffic_for_period(&host(), Period::Hour, t(4_000));
        assert_eq!(hour.len(), 1);
        let day = store.traffic_for_period(&host(), Period::Day, t(4_000));
        assert_eq!(day.len(), 2);
    }

    #[test]
    fn status_log_suppresses_repeats() {
        let store = store();
        assert!(!store.record_status(&host(), HostStatus::Unknown, t(0)));
        assert!(store.record_status(&host(), HostStatus::Online, t(1)));
        assert!(!store.record_status(&host(), HostStatus::Online, t(2)));
        assert!(store.record_status(&host(), HostStatus::Offline, t(3)));
        assert!(store.record_status(&host(), HostStatus::Online, t(4)));

        // Cap is 2.
        let log = store.status_log(&host(), 10);
        assert_eq!(
            log.iter().map(|e| e.status).collect::<Vec<_>>(),
            vec![HostStatus::Offline, HostStatus::Online]
        );
    }

    #[test]
    fn forget_drops_host() {
        let store = store();
        store.append_ping(PingResult::failure(host(), t(0)));
        assert!(store.forget(&host()));
        assert!(store.recent_pings(&host(), 10).is_empty());
        assert!(store.latest_traffic(&host()).is_none());
        assert!(!store.forget(&host()));
    }

    #[test]
    fn concurrent_writes_for_one_host_stay_ordered() {
        use std::collections::HashSet;
        use std::sync::atomic::{AtomicI64, Ordering};
        use std::time::Duration;

        const THREADS: usize = 8;
        const PER_THREAD: usize = 250;

        let store = Arc::new(HistoryStore::new(
            RetentionLimits {
                pings: 100_000,
                traffic: 100_000,
                status_log: 2,
            },
            CounterLimits {
                max_gap: Duration::from_secs(86_400),
                ..CounterLimits::default()
            },
        ));
        let ticket = Arc::new(AtomicI64::new(1));

        let workers: Vec<_> = (0..THREADS)
            .map(|_| {
                let store = Arc::clone(&store);
                let ticket = Arc::clone(&ticket);
                std::thread::spawn(move || {
                    let mut accepted = 0usize;
                    for _ in 0..PER_THREAD {
                        let seq = ticket.fetch_add(1, Ordering::SeqCst);
                        store.append_ping(PingResult::success(host(), t(seq), 1.0));
                        // Quadratic counter: the rate depends on which
                        // sample was the predecessor.
                        let octets = u64::try_from(seq * seq * 1_000).unwrap();
                        match store.ingest_traffic(
                            &host(),
                            reading(seq, octets, octets, CounterWidth::Bits64),
                        ) {
                            Ok(_) => accepted += 1,
                            Err(CoreError::StorageWrite { .. }) => {}
                            Err(e) => panic!("unexpected error: {e}"),
                        }
                    }
                    accepted
                })
            })
            .collect();
        let accepted: usize = workers.into_iter().map(|w| w.join().unwrap()).sum();

        let pings = store.recent_pings(&host(), usize::MAX);
        assert_eq!(pings.len(), THREADS * PER_THREAD);
        let distinct: HashSet<_> = pings.iter().map(|p| p.timestamp).collect();
        assert_eq!(distinct.len(), pings.len());

        let samples = store.traffic_in_range(&host(), t(0), t(1_000_000));
        assert_eq!(samples.len(), accepted);
        assert!(accepted > 0);
        assert_eq!(samples[0].traffic_in_mbps, None);
        for pair in samples.windows(2) {
            let (prev, cur) = (&pair[0], &pair[1]);
            assert!(cur.timestamp > prev.timestamp);
            let elapsed = (cur.timestamp - prev.timestamp).num_seconds();
            #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
            let want =
                (cur.in_octets - prev.in_octets) as f64 * 8.0 / elapsed as f64 / 1_000_000.0;
            assert_eq!(cur.traffic_in_mbps, Some(want));
            assert_eq!(cur.traffic_out_mbps, Some(want));
        }
    }

    #[test]
    fn unknown_host_reads_empty() {
        let store = store();
        let ghost = HostId::from("ghost");
        assert!(store.recent_pings(&ghost, 5).is_empty());
        assert!(store.status_log(&ghost, 5).is_empty());
    }
}

// ── Status transition engine ──
//
// Per-host debounce state machine over ping results. A host goes offline
// only after `failure_threshold` consecutive failures and comes back on
// the first success. Only flips between online and offline are broadcast;
// leaving `unknown` is silent.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::history::HistoryStore;
use crate::model::{HostId, HostStatus, PingResult, StatusTransition};
use crate::registry::HostRegistry;

const TRANSITION_CHANNEL_SIZE: usize = 256;

#[derive(Debug, Clone, Copy, Default)]
struct HostState {
    status: HostStatus,
    consecutive_failures: u32,
    consecutive_successes: u32,
}

/// Outcome of feeding one ping result to the engine.
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub status: HostStatus,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    /// Set when the result flipped the host between online and offline.
    pub transition: Option<Arc<StatusTransition>>,
}

pub struct StatusEngine {
    failure_threshold: u32,
    registry: Arc<HostRegistry>,
    history: Arc<HistoryStore>,
    states: DashMap<HostId, HostState>,
    transitions: broadcast::Sender<Arc<StatusTransition>>,
}

impl StatusEngine {
    pub fn new(
        failure_threshold: u32,
        registry: Arc<HostRegistry>,
        history: Arc<HistoryStore>,
    ) -> Self {
        let (transitions, _) = broadcast::channel(TRANSITION_CHANNEL_SIZE);
        Self {
            failure_threshold: failure_threshold.max(1),
            registry,
            history,
            states: DashMap::new(),
            transitions,
        }
    }

    /// Evaluate one ping result.
    ///
    /// Updates the live view and the status log, and broadcasts a
    /// transition if one occurred. Results for hosts that are no longer
    /// configured are dropped and yield `None`.
    pub fn observe(&self, result: &PingResult) -> Option<Evaluation> {
        let id = &result.host_id;
        if !self.registry.contains(id) {
            debug!(host = %id, "ping result for unconfigured host dropped");
            return None;
        }

        // The entry guard serializes evaluations per host, so the log,
        // live view and broadcast order match the result order.
        let mut state = self.states.entry(id.clone()).or_default();
        if result.alive {
            state.consecutive_successes = state.consecutive_successes.saturating_add(1);
            state.consecutive_failures = 0;
        } else {
            state.consecutive_failures = state.consecutive_failures.saturating_add(1);
            state.consecutive_successes = 0;
        }

        let previous = state.status;
        let next = if result.alive {
            HostStatus::Online
        } else if state.consecutive_failures >= self.failure_threshold {
            HostStatus::Offline
        } else {
            previous
        };
        state.status = next;

        self.registry
            .record_check(id, next, result.latency_ms, result.timestamp);
        self.history.record_status(id, next, result.timestamp);

        let transition = if StatusTransition::is_notifiable(previous, next) {
            let transition = Arc::new(StatusTransition {
                host_id: id.clone(),
                from_status: previous,
                to_status: next,
                occurred_at: result.timestamp,
            });
            info!(host = %id, from = %previous, to = %next, "host status changed");
            // No receivers is fine; nobody is listening yet.
            let _ = self.transitions.send(Arc::clone(&transition));
            Some(transition)
        } else {
            if previous != next {
                debug!(host = %id, from = %previous, to = %next, "initial classification");
            }
            None
        };

        Some(Evaluation {
            status: next,
            consecutive_failures: state.consecutive_failures,
            consecutive_successes: state.consecutive_successes,
            transition,
        })
    }

    /// Receive every future online/offline transition.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<StatusTransition>> {
        self.transitions.subscribe()
    }

    pub fn status(&self, id: &HostId) -> HostStatus {
        self.states.get(id).map_or(HostStatus::Unknown, |s| s.status)
    }

    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    /// Drop debounce state for a host that left the configuration.
    pub fn forget(&self, id: &HostId) {
        self.states.remove(id);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};
    use tokio::sync::broadcast::error::TryRecvError;

    use super::*;
    use crate::config::RetentionLimits;
    use crate::counter::CounterLimits;
    use crate::model::Host;

    struct Fixture {
        engine: StatusEngine,
        registry: Arc<HostRegistry>,
        history: Arc<HistoryStore>,
        rx: broadcast::Receiver<Arc<StatusTransition>>,
        tick: i64,
    }

    impl Fixture {
        fn new(threshold: u32) -> Self {
            let registry = Arc::new(HostRegistry::new());
            registry
                .replace_hosts(vec![Host::new("r1", "192.0.2.1").with_name("Router 1")])
                .unwrap();
            let history = Arc::new(HistoryStore::new(
                RetentionLimits::default(),
                CounterLimits::default(),
            ));
            let engine = StatusEngine::new(threshold, Arc::clone(&registry), Arc::clone(&history));
            let rx = engine.subscribe();
            Self {
                engine,
                registry,
                history,
                rx,
                tick: 0,
            }
        }

        fn at(&self) -> DateTime<Utc> {
            Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap() + TimeDelta::seconds(self.tick * 30)
        }

        fn feed(&mut self, alive: bool) -> Evaluation {
            self.tick += 1;
            let id = HostId::from("r1");
            let result = if alive {
                PingResult::success(id, self.at(), 4.2)
            } else {
                PingResult::failure(id, self.at())
            };
            self.engine.observe(&result).unwrap()
        }

        fn transitions(&mut self) -> Vec<(HostStatus, HostStatus)> {
            let mut out = Vec::new();
            loop {
                match self.rx.try_recv() {
                    Ok(t) => out.push((t.from_status, t.to_status)),
                    Err(TryRecvError::Empty) => return out,
                    Err(e) => panic!("unexpected receive error: {e}"),
                }
            }
        }

        fn log(&self) -> Vec<HostStatus> {
            self.history
                .status_log(&HostId::from("r1"), usize::MAX)
                .iter()
                .map(|e| e.status)
                .collect()
        }
    }

    #[test]
    fn debounce_at_threshold() {
        let mut fx = Fixture::new(3);
        fx.feed(true);
        assert_eq!(fx.feed(false).status, HostStatus::Online);
        assert_eq!(fx.feed(false).status, HostStatus::Online);
        let third = fx.feed(false);
        assert_eq!(third.status, HostStatus::Offline);
        assert_eq!(third.consecutive_failures, 3);
        let t = third.transition.unwrap();
        assert_eq!((t.from_status, t.to_status), (HostStatus::Online, HostStatus::Offline));
        assert_eq!(fx.transitions(), vec![(HostStatus::Online, HostStatus::Offline)]);
    }

    #[test]
    fn no_duplicate_notification_while_offline() {
        let mut fx = Fixture::new(3);
        fx.feed(true);
        for _ in 0..3 {
            fx.feed(false);
        }
        assert_eq!(fx.transitions().len(), 1);

        let fourth = fx.feed(false);
        assert_eq!(fourth.status, HostStatus::Offline);
        assert!(fourth.transition.is_none());
        assert!(fx.transitions().is_empty());
        assert_eq!(fx.log(), vec![HostStatus::Online, HostStatus::Offline]);
    }

    #[test]
    fn first_classification_is_silent() {
        let mut fx = Fixture::new(3);
        let first = fx.feed(true);
        assert_eq!(first.status, HostStatus::Online);
        assert!(first.transition.is_none());
        assert!(fx.transitions().is_empty());
        assert_eq!(fx.log(), vec![HostStatus::Online]);

        let mut fx = Fixture::new(3);
        assert_eq!(fx.feed(false).status, HostStatus::Unknown);
        assert_eq!(fx.feed(false).status, HostStatus::Unknown);
        assert_eq!(fx.feed(false).status, HostStatus::Offline);
        assert!(fx.transitions().is_empty());
        assert_eq!(fx.log(), vec![HostStatus::Offline]);
    }

    #[test]
    fn success_resets_failure_streak() {
        let mut fx = Fixture::new(3);
        fx.feed(true);
        fx.feed(false);
        fx.feed(false);
        let reset = fx.feed(true);
        assert_eq!(reset.consecutive_failures, 0);
        assert_eq!(reset.consecutive_successes, 1);
        fx.feed(false);
        assert_eq!(fx.feed(false).status, HostStatus::Online);
        assert!(fx.transitions().is_empty());
    }

    #[test]
    fn recovery_emits_on_first_success() {
        let mut fx = Fixture::new(2);
        fx.feed(true);
        fx.feed(false);
        fx.feed(false);
        let back = fx.feed(true);
        assert_eq!(back.status, HostStatus::Online);
        assert_eq!(
            fx.transitions(),
            vec![
                (HostStatus::Online, HostStatus::Offline),
                (HostStatus::Offline, HostStatus::Online)
            ]
        );
    }

    #[test]
    fn live_view_tracks_latency() {
        let mut fx = Fixture::new(3);
        fx.feed(true);
        let view = fx.registry.get(&HostId::from("r1")).unwrap();
        assert_eq!(view.last_latency_ms, Some(4.2));
        fx.feed(false);
        let view = fx.registry.get(&HostId::from("r1")).unwrap();
        assert_eq!(view.last_latency_ms, None);
        assert_eq!(view.last_checked_at, Some(fx.at()));
    }

    #[test]
    fn unconfigured_host_is_ignored() {
        let fx = Fixture::new(3);
        let result = PingResult::failure(HostId::from("ghost"), fx.at());
        assert!(fx.engine.observe(&result).is_none());
        assert_eq!(fx.engine.status(&HostId::from("ghost")), HostStatus::Unknown);
    }
}

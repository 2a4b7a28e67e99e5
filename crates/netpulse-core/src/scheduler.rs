// ── Polling scheduler ──
//
// One timer task drives rounds. A round snapshots the host list and
// spawns one ping probe per host, plus a traffic probe for SNMP hosts,
// bounded by a shared semaphore. Results are stored and evaluated as each
// probe completes. The round waits at most one interval; probes still
// running after that keep going in the background, and their host/kind
// pair is skipped by later rounds until they finish.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use dashmap::DashSet;
use futures_core::Stream;
use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use netpulse_probe::{Pinger, SnmpTransport, read_counters};
use serde::Serialize;
use strum::Display;
use tokio::sync::{Mutex, Semaphore, broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::{MonitorConfig, validate_interval};
use crate::error::CoreError;
use crate::history::HistoryStore;
use crate::model::{Host, HostId, PingResult, StatusTransition, TrafficReading};
use crate::notify::NotificationDispatcher;
use crate::registry::{HostChanges, HostRegistry};
use crate::status::StatusEngine;
use crate::stream::HostStream;

/// Slack on top of a probe's own timeout before the scheduler gives up on it.
const PROBE_GRACE: Duration = Duration::from_millis(500);

/// A counter read issues at most this many SNMP requests.
const SNMP_REQUESTS_PER_READ: u32 = 3;

// ── Public types ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ProbeKind {
    Ping,
    Traffic,
}

/// A probe not dispatched because the previous one is still running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedProbe {
    pub host_id: HostId,
    pub kind: ProbeKind,
}

/// Summary of one polling round.
#[derive(Debug, Clone, Serialize)]
pub struct RoundReport {
    pub round: u64,
    pub started_at: DateTime<Utc>,
    pub hosts: usize,
    pub dispatched: usize,
    /// Probes that finished before the soft deadline.
    pub completed: usize,
    /// Probes left running past the soft deadline.
    pub outstanding: usize,
    pub skipped: Vec<SkippedProbe>,
}

// ── Scheduler ───────────────────────────────────────────────────────

/// Handle to the polling loop. Cheap to clone.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    config: ArcSwap<MonitorConfig>,
    registry: Arc<HostRegistry>,
    history: Arc<HistoryStore>,
    engine: Arc<StatusEngine>,
    pinger: Arc<dyn Pinger>,
    snmp: Arc<dyn SnmpTransport>,
    permits: Arc<Semaphore>,
    in_flight: Arc<DashSet<(HostId, ProbeKind)>>,
    probes: TaskTracker,
    /// Stops the timer and new rounds.
    cancel: CancellationToken,
    /// Stops background consumers once probes have drained.
    shutdown: CancellationToken,
    interval_tx: watch::Sender<Duration>,
    timer: Mutex<Option<JoinHandle<()>>>,
    background: Mutex<Vec<JoinHandle<()>>>,
    rounds: AtomicU64,
}

impl Scheduler {
    pub fn new(
        config: MonitorConfig,
        pinger: Arc<dyn Pinger>,
        snmp: Arc<dyn SnmpTransport>,
    ) -> Result<Self, CoreError> {
        config.validate()?;

        let registry = Arc::new(HostRegistry::new());
        let history = Arc::new(HistoryStore::new(config.retention, config.counter_limits));
        let engine = Arc::new(StatusEngine::new(
            config.failure_threshold,
            Arc::clone(&registry),
            Arc::clone(&history),
        ));
        let (interval_tx, _) = watch::channel(config.poll_interval);

        Ok(Self {
            inner: Arc::new(SchedulerInner {
                permits: Arc::new(Semaphore::new(config.max_concurrency)),
                config: ArcSwap::from_pointee(config),
                registry,
                history,
                engine,
                pinger,
                snmp,
                in_flight: Arc::new(DashSet::new()),
                probes: TaskTracker::new(),
                cancel: CancellationToken::new(),
                shutdown: CancellationToken::new(),
                interval_tx,
                timer: Mutex::new(None),
                background: Mutex::new(Vec::new()),
                rounds: AtomicU64::new(0),
            }),
        })
    }

    pub fn config(&self) -> Arc<MonitorConfig> {
        self.inner.config.load_full()
    }

    pub fn registry(&self) -> &Arc<HostRegistry> {
        &self.inner.registry
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.inner.history
    }

    pub fn engine(&self) -> &Arc<StatusEngine> {
        &self.inner.engine
    }

    /// Subscribe to the live per-host status view.
    pub fn subscribe(&self) -> HostStream {
        self.inner.registry.subscribe()
    }

    /// Every future online/offline transition.
    pub fn transitions(&self) -> broadcast::Receiver<Arc<StatusTransition>> {
        self.inner.engine.subscribe()
    }

    /// Transitions as a `Stream`. Lagged items are skipped.
    pub fn transition_stream(&self) -> impl Stream<Item = Arc<StatusTransition>> + Send + 'static {
        BroadcastStream::new(self.transitions()).filter_map(|item| async move {
            match item {
                Ok(transition) => Some(transition),
                Err(e) => {
                    warn!(error = %e, "transition stream lagged");
                    None
                }
            }
        })
    }

    // ── Configuration updates ────────────────────────────────────────

    /// Replace the monitored host list.
    ///
    /// History and debounce state for removed hosts are dropped. Probes
    /// already in flight for a removed host finish, but their results are
    /// discarded.
    pub fn set_hosts(&self, hosts: Vec<Host>) -> Result<HostChanges, CoreError> {
        let changes = self.inner.registry.replace_hosts(hosts)?;
        for id in &changes.removed {
            self.inner.history.forget(id);
            self.inner.engine.forget(id);
        }
        if !changes.added.is_empty() || !changes.removed.is_empty() {
            info!(
                added = changes.added.len(),
                removed = changes.removed.len(),
                "monitored hosts updated"
            );
        }
        Ok(changes)
    }

    /// Change the polling interval.
    ///
    /// The running timer restarts with the new period once any round in
    /// progress has finished; the next round starts one new interval later.
    pub fn set_interval(&self, interval_ms: u64) -> Result<(), CoreError> {
        let interval = Duration::from_millis(interval_ms);
        validate_interval(interval)?;
        self.inner.config.rcu(|current| MonitorConfig {
            poll_interval: interval,
            ..MonitorConfig::clone(current)
        });
        self.inner.interval_tx.send_replace(interval);
        Ok(())
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Start the timer. The first round runs immediately.
    ///
    /// Calling `start` on a running scheduler is a no-op; a stopped
    /// scheduler cannot be restarted.
    pub async fn start(&self) -> Result<(), CoreError> {
        if self.inner.cancel.is_cancelled() {
            return Err(CoreError::SchedulerStopped);
        }
        let mut timer = self.inner.timer.lock().await;
        if timer.is_none() {
            let rx = self.inner.interval_tx.subscribe();
            *timer = Some(tokio::spawn(timer_task(
                self.clone(),
                rx,
                self.inner.cancel.clone(),
            )));
            info!(
                interval_ms = self.config().poll_interval.as_millis(),
                hosts = self.inner.registry.len(),
                "scheduler started"
            );
        }
        Ok(())
    }

    /// Stop polling.
    ///
    /// No new round starts after this is called. In-flight probes finish
    /// or time out, their results are recorded, and queued notifications
    /// are delivered before this returns.
    pub async fn stop(&self) {
        self.inner.cancel.cancel();

        if let Some(handle) = self.inner.timer.lock().await.take() {
            let _ = handle.await;
        }

        self.inner.probes.close();
        self.inner.probes.wait().await;

        self.inner.shutdown.cancel();
        let mut handles = self.inner.background.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        info!("scheduler stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Deliver transitions through `dispatcher` until the scheduler stops.
    pub async fn spawn_dispatcher(&self, dispatcher: NotificationDispatcher) {
        let rx = self.transitions();
        let shutdown = self.inner.shutdown.clone();
        self.inner
            .background
            .lock()
            .await
            .push(tokio::spawn(dispatcher.run(rx, shutdown)));
    }

    // ── Rounds ───────────────────────────────────────────────────────

    /// Run one polling round and wait for it up to the soft deadline.
    pub async fn run_round(&self) -> Result<RoundReport, CoreError> {
        let inner = &self.inner;
        if inner.cancel.is_cancelled() {
            return Err(CoreError::SchedulerStopped);
        }

        let config = inner.config.load_full();
        let deadline = Instant::now() + config.poll_interval;
        let hosts = inner.registry.hosts();
        let mut report = RoundReport {
            round: inner.rounds.fetch_add(1, Ordering::Relaxed) + 1,
            started_at: Utc::now(),
            hosts: hosts.len(),
            dispatched: 0,
            completed: 0,
            outstanding: 0,
            skipped: Vec::new(),
        };

        let mut pending = FuturesUnordered::new();
        for host in &hosts {
            let mut kinds = vec![ProbeKind::Ping];
            if host.traffic_target().is_some() {
                kinds.push(ProbeKind::Traffic);
            }
            for kind in kinds {
                let Some(guard) = InFlightGuard::claim(&inner.in_flight, &host.id, kind) else {
                    debug!(host = %host.id, %kind, "previous probe still running, skipped");
                    report.skipped.push(SkippedProbe {
                        host_id: host.id.clone(),
                        kind,
                    });
                    continue;
                };
                pending.push(inner.probes.spawn(probe_task(
                    Arc::clone(inner),
                    Arc::clone(host),
                    kind,
                    guard,
                    Arc::clone(&config),
                )));
                report.dispatched += 1;
            }
        }

        loop {
            tokio::select! {
                biased;
                () = inner.cancel.cancelled() => break,
                next = tokio::time::timeout_at(deadline, pending.next()) => match next {
                    Ok(Some(Ok(()))) => report.completed += 1,
                    Ok(Some(Err(e))) => {
                        warn!(error = %e, "probe task failed");
                        report.completed += 1;
                    }
                    Ok(None) => break,
                    Err(_) => {
                        debug!(outstanding = pending.len(), "round soft deadline reached");
                        break;
                    }
                },
            }
        }
        report.outstanding = pending.len();
        Ok(report)
    }
}

// ── In-flight bookkeeping ───────────────────────────────────────────

/// Marks a host/kind pair busy until dropped.
struct InFlightGuard {
    set: Arc<DashSet<(HostId, ProbeKind)>>,
    key: (HostId, ProbeKind),
}

impl InFlightGuard {
    fn claim(set: &Arc<DashSet<(HostId, ProbeKind)>>, id: &HostId, kind: ProbeKind) -> Option<Self> {
        let key = (id.clone(), kind);
        set.insert(key.clone()).then(|| Self {
            set: Arc::clone(set),
            key,
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.remove(&self.key);
    }
}

// ── Background tasks ────────────────────────────────────────────────

async fn timer_task(
    scheduler: Scheduler,
    mut interval_rx: watch::Receiver<Duration>,
    cancel: CancellationToken,
) {
    let mut period = *interval_rx.borrow_and_update();
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            changed = interval_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let next = *interval_rx.borrow_and_update();
                if next != period {
                    period = next;
                    ticker = tokio::time::interval_at(Instant::now() + period, period);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    info!(interval_ms = period.as_millis(), "polling interval changed");
                }
            }
            _ = ticker.tick() => {
                match scheduler.run_round().await {
                    Ok(report) => debug!(
                        round = report.round,
                        dispatched = report.dispatched,
                        completed = report.completed,
                        outstanding = report.outstanding,
                        skipped = report.skipped.len(),
                        "round finished"
                    ),
                    Err(CoreError::SchedulerStopped) => break,
                    Err(e) => warn!(error = %e, "round failed"),
                }
            }
        }
    }
}

async fn probe_task(
    inner: Arc<SchedulerInner>,
    host: Arc<Host>,
    kind: ProbeKind,
    guard: InFlightGuard,
    config: Arc<MonitorConfig>,
) {
    let _guard = guard;
    let Ok(_permit) = Arc::clone(&inner.permits).acquire_owned().await else {
        return;
    };
    match kind {
        ProbeKind::Ping => inner.ping_host(&host, &config).await,
        ProbeKind::Traffic => inner.poll_traffic(&host, &config).await,
    }
}

impl SchedulerInner {
    async fn ping_host(&self, host: &Host, config: &MonitorConfig) {
        let timeout = config.ping_timeout;
        let outcome =
            tokio::time::timeout(timeout + PROBE_GRACE, self.pinger.ping(&host.address, timeout))
                .await;
        let at = Utc::now();

        let result = match outcome {
            Ok(Ok(reply)) => PingResult {
                host_id: host.id.clone(),
                timestamp: at,
                alive: reply.alive,
                latency_ms: reply.latency_ms.filter(|_| reply.alive),
            },
            Ok(Err(e)) => {
                let e = CoreError::from(e);
                debug!(host = %host.id, error = %e, "ping failed");
                PingResult::failure(host.id.clone(), at)
            }
            Err(_) => {
                let e = CoreError::ProbeTimeout {
                    target: host.address.clone(),
                    timeout_ms: duration_ms(timeout),
                };
                debug!(host = %host.id, error = %e, "ping abandoned");
                PingResult::failure(host.id.clone(), at)
            }
        };

        if !self.registry.contains(&host.id) {
            return;
        }
        let result = self.history.append_ping(result);
        self.engine.observe(&result);
        self.discard_if_removed(&host.id);
    }

    async fn poll_traffic(&self, host: &Host, config: &MonitorConfig) {
        let Some(snmp) = host.traffic_target() else {
            return;
        };
        let endpoint = snmp.endpoint(&host.address, config.snmp_timeout);
        let budget = config.snmp_timeout * SNMP_REQUESTS_PER_READ + PROBE_GRACE;
        let outcome = tokio::time::timeout(
            budget,
            read_counters(self.snmp.as_ref(), &endpoint, snmp.if_index),
        )
        .await;

        let counters = match outcome {
            Ok(Ok(counters)) => counters,
            Ok(Err(e)) => {
                let e = CoreError::from(e);
                warn!(host = %host.id, error = %e, "no traffic sample this round");
                return;
            }
            Err(_) => {
                let e = CoreError::SnmpTimeout {
                    target: endpoint.target(),
                    timeout_ms: duration_ms(budget),
                };
                warn!(host = %host.id, error = %e, "no traffic sample this round");
                return;
            }
        };

        if !self.registry.contains(&host.id) {
            return;
        }
        let reading = TrafficReading::from_counters(&counters, Utc::now());
        if let Err(e) = self.history.ingest_traffic(&host.id, reading) {
            warn!(host = %host.id, error = %e, "traffic sample dropped");
        }
        self.discard_if_removed(&host.id);
    }

    /// Drop state written for a host that `set_hosts` removed between the
    /// membership check and the write.
    fn discard_if_removed(&self, id: &HostId) {
        if self.registry.contains(id) {
            return;
        }
        self.engine.forget(id);
        if self.history.forget(id) {
            debug!(host = %id, "discarded history for removed host");
        }
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

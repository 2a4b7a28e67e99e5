//! Monitoring core for netpulse, between the probe transports in
//! `netpulse-probe` and the CLI.
//!
//! This crate owns the polling loop, the domain model, and the in-memory
//! state that consumers read:
//!
//! - **[`Scheduler`]** -- Central facade. [`start()`](Scheduler::start) spawns
//!   the timer that runs polling rounds; [`run_round()`](Scheduler::run_round)
//!   runs one round directly. Probes are bounded by a semaphore, isolated
//!   from each other, and never re-dispatched while still in flight.
//!
//! - **[`HostRegistry`]** -- Reactive store of configured hosts and their live
//!   status (`DashMap` + `tokio::sync::watch`). Vends [`HostStream`]
//!   subscriptions with `current()` / `latest()` / `changed()`.
//!
//! - **[`StatusEngine`]** -- Debounced online/offline state machine. Emits a
//!   [`StatusTransition`] only when a host flips between confirmed states.
//!
//! - **[`HistoryStore`]** -- Bounded per-host ping, traffic and status-log
//!   history with range and named-period queries.
//!
//! - **[`counter`]** -- Stateless octet-counter rate derivation with wrap,
//!   reset and gap handling.
//!
//! - **[`notify`]** -- [`Notifier`] trait, log and webhook notifiers, and the
//!   [`NotificationDispatcher`] that consumes transitions.
//!
//! The core never touches disk; [`MonitorConfig`] and the host list are
//! handed in by the caller.

pub mod config;
pub mod counter;
pub mod error;
pub mod history;
pub mod model;
pub mod notify;
pub mod registry;
pub mod scheduler;
pub mod status;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{MIN_POLL_INTERVAL, MonitorConfig, RetentionLimits};
pub use counter::{CounterLimits, CounterPoint};
pub use error::CoreError;
pub use history::{HistoryStore, Period};
pub use notify::{
    DeliveryReport, LogNotifier, NotificationDispatcher, Notifier, WebhookNotifier,
};
pub use registry::{HostChanges, HostRegistry};
pub use scheduler::{ProbeKind, RoundReport, Scheduler, SkippedProbe};
pub use status::{Evaluation, StatusEngine};
pub use stream::{HostStream, SnapshotStream};

pub use model::{
    Host, HostId, HostStatus, MonitoredHost, PingResult, SnmpSettings, StatusLogEntry,
    StatusTransition, TrafficReading, TrafficSample, TransitionNotice,
};

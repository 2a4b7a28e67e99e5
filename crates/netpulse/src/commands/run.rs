//! `netpulse run`: poll the configured hosts.
//!
//! Without `--once` the scheduler runs until Ctrl-C, printing one line per
//! status transition. With `--once` a single round runs and the resulting
//! host table is printed.

use std::pin::pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::{Stream, StreamExt};
use netpulse_config::Config;
use netpulse_core::{
    HostId, HostStatus, LogNotifier, MonitoredHost, NotificationDispatcher, Scheduler,
    StatusTransition, TransitionNotice,
};
use netpulse_probe::{Pinger, SystemPinger, UdpSnmpClient};
use owo_colors::OwoColorize;
use serde::Serialize;
use tabled::Tabled;
use tracing::{info, warn};

use crate::cli::{GlobalOpts, OutputFormat, RunArgs};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Status view ─────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct HostView {
    id: HostId,
    name: String,
    address: String,
    status: HostStatus,
    latency_ms: Option<f64>,
    last_checked_at: Option<DateTime<Utc>>,
    traffic_in_mbps: Option<f64>,
    traffic_out_mbps: Option<f64>,
}

#[derive(Tabled)]
struct HostRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Latency")]
    latency: String,
    #[tabled(rename = "In Mbit/s")]
    traffic_in: String,
    #[tabled(rename = "Out Mbit/s")]
    traffic_out: String,
}

fn or_dash(value: Option<f64>, precision: usize) -> String {
    value.map_or_else(|| "-".into(), |v| format!("{v:.precision$}"))
}

impl From<&HostView> for HostRow {
    fn from(h: &HostView) -> Self {
        Self {
            id: h.id.to_string(),
            name: h.name.clone(),
            address: h.address.clone(),
            status: h.status.to_string(),
            latency: h
                .latency_ms
                .map_or_else(|| "-".into(), |ms| format!("{ms:.1} ms")),
            traffic_in: or_dash(h.traffic_in_mbps, 2),
            traffic_out: or_dash(h.traffic_out_mbps, 2),
        }
    }
}

fn host_views(scheduler: &Scheduler) -> Vec<HostView> {
    let history = scheduler.history();
    scheduler
        .registry()
        .snapshot()
        .iter()
        .map(|h: &Arc<MonitoredHost>| {
            let traffic = history.latest_traffic(&h.id);
            HostView {
                id: h.id.clone(),
                name: h.name.clone(),
                address: h.address.clone(),
                status: h.status,
                latency_ms: h.last_latency_ms,
                last_checked_at: h.last_checked_at,
                traffic_in_mbps: traffic.as_ref().and_then(|t| t.traffic_in_mbps),
                traffic_out_mbps: traffic.as_ref().and_then(|t| t.traffic_out_mbps),
            }
        })
        .collect()
}

// ── Transition lines ────────────────────────────────────────────────

fn transition_line(
    notice: &TransitionNotice,
    format: &OutputFormat,
    color: bool,
) -> Result<String, CliError> {
    match format {
        OutputFormat::Json | OutputFormat::JsonCompact => serde_json::to_string(notice)
            .map_err(|e| CliError::Serialization(e.to_string())),
        OutputFormat::Yaml => serde_yaml::to_string(notice)
            .map(|doc| format!("---\n{}", doc.trim_end()))
            .map_err(|e| CliError::Serialization(e.to_string())),
        OutputFormat::Plain => Ok(format!("{} {}", notice.host_id, notice.to_status)),
        OutputFormat::Table => {
            let at = notice.occurred_at.format("%Y-%m-%d %H:%M:%S").to_string();
            let at = if color { at.dimmed().to_string() } else { at };
            Ok(format!(
                "{at}  {}  {} -> {}",
                notice.host_name,
                output::paint_status(notice.from_status, color),
                output::paint_status(notice.to_status, color),
            ))
        }
    }
}

fn notice_for(scheduler: &Scheduler, transition: &StatusTransition) -> TransitionNotice {
    let name = scheduler
        .registry()
        .get(&transition.host_id)
        .map_or_else(|| transition.host_id.to_string(), |h| h.name.clone());
    TransitionNotice::new(transition, name)
}

// ── Handler ─────────────────────────────────────────────────────────

fn build_scheduler(cfg: &Config, args: &RunArgs) -> Result<Scheduler, CliError> {
    let mut monitor = cfg.monitor_config()?;
    if let Some(ref every) = args.interval {
        monitor.poll_interval = util::parse_duration("interval", every)?;
    }

    let hosts = cfg.hosts()?;
    if hosts.is_empty() {
        return Err(CliError::Validation {
            field: "hosts".into(),
            reason: "no hosts configured".into(),
        });
    }

    let pinger: Arc<dyn Pinger> = Arc::new(match cfg.monitor.ping_program {
        Some(ref program) => SystemPinger::with_program(program.as_str()),
        None => SystemPinger::new(),
    });
    let scheduler = Scheduler::new(monitor, pinger, Arc::new(UdpSnmpClient::new()))?;
    let changes = scheduler.set_hosts(hosts)?;
    info!(
        hosts = changes.added.len(),
        interval_ms = util::duration_ms(scheduler.config().poll_interval),
        "hosts loaded"
    );
    Ok(scheduler)
}

pub async fn handle(args: RunArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = util::load_config(global)?;
    let scheduler = build_scheduler(&cfg, &args)?;

    if args.once {
        return run_once(&scheduler, global).await;
    }

    let mut dispatcher =
        NotificationDispatcher::new(Arc::clone(scheduler.registry())).with_notifier(LogNotifier);
    for notifier in cfg.notifiers()? {
        dispatcher.push(Arc::new(notifier));
    }
    info!(notifiers = dispatcher.len(), "notification dispatcher ready");
    scheduler.spawn_dispatcher(dispatcher).await;

    let color = output::should_color(&global.color);
    let transitions = scheduler.transition_stream();
    if let Err(e) = scheduler.start().await {
        scheduler.stop().await;
        return Err(e.into());
    }

    let result = relay_transitions(transitions, shutdown_signal(tokio::signal::ctrl_c()), |t| {
        let notice = notice_for(&scheduler, t);
        let line = transition_line(&notice, &global.output, color)?;
        output::print_output(&line, global.quiet);
        Ok(())
    })
    .await;

    info!("shutting down");
    scheduler.stop().await;
    result
}

/// Resolves when `signal` fires. A listener that cannot be installed never
/// resolves, so monitoring keeps running.
async fn shutdown_signal(signal: impl Future<Output = std::io::Result<()>>) {
    if let Err(e) = signal.await {
        warn!(error = %e, "could not listen for Ctrl-C, monitoring continues");
        std::future::pending::<()>().await;
    }
}

/// Hand each transition to `emit` until `shutdown` resolves, the stream
/// ends, or `emit` fails.
async fn relay_transitions(
    transitions: impl Stream<Item = Arc<StatusTransition>>,
    shutdown: impl Future<Output = ()>,
    mut emit: impl FnMut(&StatusTransition) -> Result<(), CliError>,
) -> Result<(), CliError> {
    let mut transitions = pin!(transitions);
    let mut shutdown = pin!(shutdown);
    loop {
        tokio::select! {
            () = &mut shutdown => return Ok(()),
            next = transitions.next() => {
                let Some(transition) = next else { return Ok(()) };
                emit(&transition)?;
            }
        }
    }
}

async fn run_once(scheduler: &Scheduler, global: &GlobalOpts) -> Result<(), CliError> {
    let report = scheduler.run_round().await?;
    if report.outstanding > 0 {
        warn!(
            outstanding = report.outstanding,
            "round deadline passed with probes still running"
        );
    }
    scheduler.stop().await;

    let views = host_views(scheduler);
    let out = output::render_list(
        &global.output,
        &views,
        |h| HostRow::from(h),
        |h| format!("{} {}", h.id, h.status),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

//! One-off probe commands: `ping`, `snmp counters`, `snmp interfaces`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use netpulse_core::{Host, HostStatus};
use netpulse_probe::{
    CounterReading, InterfaceDescriptor, NameSource, Pinger, SnmpEndpoint, SystemPinger,
    UdpSnmpClient, discover_interfaces, read_counters,
};
use secrecy::SecretString;
use serde::Serialize;
use tabled::Tabled;

use crate::cli::{AgentArgs, GlobalOpts, PingArgs, SnmpArgs, SnmpCommand};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Ping ────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct PingReport {
    address: String,
    alive: bool,
    latency_ms: Option<f64>,
    checked_at: DateTime<Utc>,
}

impl PingReport {
    fn status(&self) -> HostStatus {
        if self.alive {
            HostStatus::Online
        } else {
            HostStatus::Offline
        }
    }
}

pub async fn handle_ping(args: PingArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let timeout = util::parse_duration("timeout", &args.timeout)?;
    let pinger = match args.program {
        Some(program) => SystemPinger::with_program(program),
        None => SystemPinger::new(),
    };

    let reply = pinger.ping(&args.address, timeout).await?;
    let report = PingReport {
        address: args.address,
        alive: reply.alive,
        latency_ms: reply.latency_ms,
        checked_at: Utc::now(),
    };

    let color = output::should_color(&global.color);
    let out = output::render_single(
        &global.output,
        &report,
        |r| {
            output::detail_lines(&[
                ("Address", r.address.clone()),
                ("Status", output::paint_status(r.status(), color)),
                (
                    "Latency",
                    r.latency_ms.map_or_else(|| "-".into(), |ms| format!("{ms:.2} ms")),
                ),
            ])
        },
        |r| r.status().to_string(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

// ── SNMP ────────────────────────────────────────────────────────────

#[derive(Tabled)]
struct InterfaceRow {
    #[tabled(rename = "Index")]
    index: u32,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Speed")]
    speed: String,
}

impl From<&InterfaceDescriptor> for InterfaceRow {
    fn from(i: &InterfaceDescriptor) -> Self {
        Self {
            index: i.if_index,
            name: i.name.clone(),
            source: i.name_source.to_string(),
            status: i.oper_status.map(|s| s.to_string()).unwrap_or_default(),
            speed: i.speed_bps.map(format_speed).unwrap_or_default(),
        }
    }
}

#[allow(clippy::cast_precision_loss, clippy::as_conversions)]
fn format_speed(bps: u64) -> String {
    match bps {
        b if b >= 1_000_000_000 => format!("{} Gbit/s", b as f64 / 1e9),
        b if b >= 1_000_000 => format!("{} Mbit/s", b as f64 / 1e6),
        b => format!("{b} bit/s"),
    }
}

fn counters_detail(r: &CounterReading) -> String {
    let uptime = r.sys_uptime_ticks.map_or_else(
        || "-".into(),
        |ticks| {
            let secs = u64::from(ticks / 100);
            humantime::format_duration(std::time::Duration::from_secs(secs)).to_string()
        },
    );
    output::detail_lines(&[
        ("Interface", r.if_index.to_string()),
        ("In octets", r.in_octets.to_string()),
        ("Out octets", r.out_octets.to_string()),
        ("Width", r.width.to_string()),
        (
            "Oper status",
            r.oper_status.map_or_else(|| "-".into(), |s| s.to_string()),
        ),
        (
            "Link speed",
            r.link_speed_bps.map_or_else(|| "-".into(), format_speed),
        ),
        ("Uptime", uptime),
    ])
}

fn endpoint(agent: &AgentArgs) -> Result<SnmpEndpoint, CliError> {
    let timeout = util::parse_duration("timeout", &agent.timeout)?;
    Ok(
        SnmpEndpoint::new(agent.address.as_str(), SecretString::from(agent.community.clone()))
            .with_port(agent.port)
            .with_version(agent.snmp_version.into())
            .with_timeout(timeout),
    )
}

/// Endpoint and name column for a configured SNMP host.
fn host_target(host: &Host, timeout: Duration) -> Result<(SnmpEndpoint, NameSource), CliError> {
    let settings = host.traffic_target().ok_or_else(|| CliError::Validation {
        field: format!("hosts.{}.snmp", host.id),
        reason: "SNMP is not enabled for this host".into(),
    })?;
    Ok((settings.endpoint(&host.address, timeout), settings.name_source))
}

fn print_interfaces(
    interfaces: &[InterfaceDescriptor],
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let out = output::render_list(
        &global.output,
        interfaces,
        |i| InterfaceRow::from(i),
        |i| i.if_index.to_string(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn handle_snmp(args: SnmpArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let client = UdpSnmpClient::new();

    match args.command {
        SnmpCommand::Counters { agent, if_index } => {
            let endpoint = endpoint(&agent)?;
            let reading = read_counters(&client, &endpoint, if_index).await?;
            let out = output::render_single(&global.output, &reading, counters_detail, |r| {
                format!("{} {}", r.in_octets, r.out_octets)
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        SnmpCommand::Interfaces { agent, name_source } => {
            let endpoint = endpoint(&agent)?;
            let interfaces = discover_interfaces(&client, &endpoint, name_source.into()).await?;
            print_interfaces(&interfaces, global)
        }

        SnmpCommand::Host { id } => {
            let cfg = util::load_config(global)?;
            if cfg.find_host(&id).is_none() {
                return Err(CliError::HostNotFound { id });
            }
            let monitor = cfg.monitor_config()?;
            let host = cfg
                .hosts()?
                .into_iter()
                .find(|h| h.id.as_str() == id)
                .ok_or(CliError::HostNotFound { id })?;
            let (endpoint, name_source) = host_target(&host, monitor.snmp_timeout)?;
            let interfaces = discover_interfaces(&client, &endpoint, name_source).await?;
            print_interfaces(&interfaces, global)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use netpulse_core::SnmpSettings;

    use super::*;

    #[test]
    fn configured_host_uses_its_name_source() {
        let mut settings = SnmpSettings::new(SecretString::from("s3cret"), 4);
        settings.name_source = NameSource::IfAlias;
        settings.port = 1161;
        let host = Host::new("edge", "192.0.2.7").with_snmp(settings);

        let (endpoint, source) = host_target(&host, Duration::from_secs(2)).unwrap();
        assert_eq!(source, NameSource::IfAlias);
        assert_eq!(endpoint.port, 1161);
        assert_eq!(endpoint.address, "192.0.2.7");
    }

    #[test]
    fn host_without_snmp_is_rejected() {
        let err = host_target(&Host::new("plain", "192.0.2.8"), Duration::from_secs(2))
            .unwrap_err();
        assert!(matches!(err, CliError::Validation { .. }));
    }

    #[test]
    fn speeds_use_the_largest_whole_unit() {
        assert_eq!(format_speed(1_000_000_000), "1 Gbit/s");
        assert_eq!(format_speed(100_000_000), "100 Mbit/s");
        assert_eq!(format_speed(2_500_000_000), "2.5 Gbit/s");
        assert_eq!(format_speed(64_000), "64000 bit/s");
    }
}

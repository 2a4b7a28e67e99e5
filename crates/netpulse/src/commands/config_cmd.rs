//! Config subcommand handlers.

use netpulse_config::Config;
use serde::Serialize;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

const REDACTED: &str = "****";

// ── Helpers ─────────────────────────────────────────────────────────

/// Copy of `cfg` with plaintext secrets masked.
fn redacted(cfg: &Config) -> Config {
    let mut cfg = cfg.clone();
    for host in &mut cfg.hosts {
        if host.community.is_some() {
            host.community = Some(REDACTED.into());
        }
    }
    for hook in &mut cfg.webhooks {
        if hook.token.is_some() {
            hook.token = Some(REDACTED.into());
        }
    }
    cfg
}

#[derive(Debug, Serialize)]
struct ValidationSummary {
    path: String,
    hosts: usize,
    snmp_hosts: usize,
    webhooks: usize,
    interval: String,
    failure_threshold: u32,
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let path = util::config_file(global);

    match args.command {
        ConfigCommand::Path => {
            output::print_output(&path.display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = redacted(&util::load_config(global)?);
            let text = toml::to_string_pretty(&cfg)
                .map_err(|e| CliError::Serialization(e.to_string()))?;
            let out = output::render_single(
                &global.output,
                &cfg,
                |_| text.trim_end().to_owned(),
                |c| {
                    c.hosts
                        .iter()
                        .map(|h| h.id.clone())
                        .collect::<Vec<_>>()
                        .join("\n")
                },
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Validate => {
            let cfg = util::load_config(global)?;
            let monitor = cfg.monitor_config()?;
            let hosts = cfg.hosts()?;
            let webhooks = cfg.notifiers()?;

            let summary = ValidationSummary {
                path: path.display().to_string(),
                hosts: hosts.len(),
                snmp_hosts: hosts.iter().filter(|h| h.traffic_target().is_some()).count(),
                webhooks: webhooks.len(),
                interval: humantime::format_duration(monitor.poll_interval).to_string(),
                failure_threshold: monitor.failure_threshold,
            };
            let out = output::render_single(
                &global.output,
                &summary,
                |s| {
                    output::detail_lines(&[
                        ("Config", s.path.clone()),
                        ("Hosts", format!("{} ({} with SNMP)", s.hosts, s.snmp_hosts)),
                        ("Webhooks", s.webhooks.to_string()),
                        ("Interval", s.interval.clone()),
                        ("Threshold", s.failure_threshold.to_string()),
                        ("Status", "ok".into()),
                    ])
                },
                |_| "ok".into(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Init { force } => {
            if path.exists() && !force {
                return Err(CliError::ConfigExists {
                    path: path.display().to_string(),
                });
            }
            netpulse_config::save_config_to(&Config::sample(), &path)?;
            if !global.quiet {
                eprintln!("Config written to {}", path.display());
            }
            Ok(())
        }

        ConfigCommand::SetCommunity { host, community } => {
            let cfg = util::load_config(global)?;
            if cfg.find_host(&host).is_none() {
                return Err(CliError::HostNotFound { id: host });
            }
            netpulse_config::store_community(&host, &community)?;
            if !global.quiet {
                eprintln!("Community for '{host}' stored in the system keyring");
            }
            Ok(())
        }
    }
}

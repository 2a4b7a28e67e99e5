//! `netpulse rate`: run the counter delta engine on two readings.

use chrono::{TimeDelta, Utc};
use netpulse_core::CounterLimits;
use netpulse_core::counter::{self, bps_to_mbps};
use netpulse_probe::CounterWidth;
use serde::Serialize;

use crate::cli::{GlobalOpts, RateArgs};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Debug, Serialize)]
struct RateReport {
    previous: u64,
    current: u64,
    width_bits: u32,
    elapsed_secs: f64,
    ceiling_bps: f64,
    rate_bps: Option<f64>,
    rate_mbps: Option<f64>,
    /// The counter passed 2^width between the readings.
    wrapped: bool,
}

fn detail(r: &RateReport) -> String {
    let rate = match (r.rate_bps, r.rate_mbps) {
        (Some(bps), Some(mbps)) => {
            let note = if r.wrapped { " [wrapped]" } else { "" };
            format!("{bps:.0} bit/s ({mbps:.6} Mbit/s){note}")
        }
        _ => "n/a (gap out of range, counter reset, or above ceiling)".into(),
    };
    output::detail_lines(&[
        ("Previous", r.previous.to_string()),
        ("Current", r.current.to_string()),
        ("Width", format!("{}-bit", r.width_bits)),
        ("Elapsed", format!("{}s", r.elapsed_secs)),
        ("Ceiling", format!("{} Mbit/s", bps_to_mbps(r.ceiling_bps))),
        ("Rate", rate),
    ])
}

pub fn handle(args: &RateArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let elapsed = util::parse_duration("elapsed", &args.elapsed)?;
    let max_gap = util::parse_duration("max-gap", &args.max_gap)?;
    if !args.max_rate_mbps.is_finite() || args.max_rate_mbps <= 0.0 {
        return Err(CliError::Validation {
            field: "max-rate-mbps".into(),
            reason: "must be a positive number".into(),
        });
    }

    let limits = CounterLimits {
        max_gap,
        max_rate_bps: args.max_rate_mbps * 1_000_000.0,
    }
    .capped_at_link(args.link_speed_mbps.map(|m| m.saturating_mul(1_000_000)));

    let span = TimeDelta::from_std(elapsed).map_err(|e| CliError::Validation {
        field: "elapsed".into(),
        reason: e.to_string(),
    })?;
    let now = Utc::now();
    let width = CounterWidth::from(args.width);

    let rate_bps = counter::rate(
        args.previous,
        now - span,
        args.current,
        now,
        width,
        &limits,
    );

    let report = RateReport {
        previous: args.previous,
        current: args.current,
        width_bits: width.bits(),
        elapsed_secs: elapsed.as_secs_f64(),
        ceiling_bps: limits.max_rate_bps,
        rate_bps,
        rate_mbps: rate_bps.map(bps_to_mbps),
        wrapped: rate_bps.is_some() && args.current < args.previous,
    };

    let out = output::render_single(&global.output, &report, detail, |r| {
        r.rate_bps.map_or_else(|| "-".into(), |bps| format!("{bps:.0}"))
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}

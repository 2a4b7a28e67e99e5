// ── Runtime monitoring configuration ──
//
// Describes *how* to monitor: cadence, concurrency, timeouts, debounce
// and retention. Built by the config crate or the CLI and handed in;
// the core never reads files.

use std::time::Duration;

use crate::counter::CounterLimits;
use crate::error::CoreError;

/// Shortest accepted polling interval.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Per-host history bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionLimits {
    /// Ping results kept per host.
    pub pings: usize,
    /// Traffic samples kept per host (about a month at 30 s).
    pub traffic: usize,
    /// Status-log entries kept per host.
    pub status_log: usize,
}

impl Default for RetentionLimits {
    fn default() -> Self {
        Self {
            pings: 100,
            traffic: 90_000,
            status_log: 200,
        }
    }
}

/// Tuning for the scheduler, status engine and history store.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    pub poll_interval: Duration,
    /// Probes in flight at once, across all hosts and kinds.
    pub max_concurrency: usize,
    pub ping_timeout: Duration,
    pub snmp_timeout: Duration,
    /// Consecutive failed pings before a host is declared offline.
    pub failure_threshold: u32,
    pub retention: RetentionLimits,
    pub counter_limits: CounterLimits,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            max_concurrency: 64,
            ping_timeout: Duration::from_secs(3),
            snmp_timeout: Duration::from_secs(5),
            failure_threshold: 3,
            retention: RetentionLimits::default(),
            counter_limits: CounterLimits::default(),
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        validate_interval(self.poll_interval)?;
        if self.max_concurrency == 0 {
            return Err(CoreError::config("max_concurrency must be at least 1"));
        }
        if self.ping_timeout.is_zero() || self.snmp_timeout.is_zero() {
            return Err(CoreError::config("probe timeouts must be non-zero"));
        }
        if self.failure_threshold == 0 {
            return Err(CoreError::config("failure_threshold must be at least 1"));
        }
        let r = &self.retention;
        if r.pings == 0 || r.traffic == 0 || r.status_log == 0 {
            return Err(CoreError::config("retention limits must be at least 1"));
        }
        let c = &self.counter_limits;
        if c.max_gap.is_zero() {
            return Err(CoreError::config("counter max_gap must be non-zero"));
        }
        if !(c.max_rate_bps.is_finite() && c.max_rate_bps > 0.0) {
            return Err(CoreError::config("counter max_rate must be a positive rate"));
        }
        Ok(())
    }
}

/// Reject intervals below [`MIN_POLL_INTERVAL`].
pub fn validate_interval(interval: Duration) -> Result<(), CoreError> {
    if interval < MIN_POLL_INTERVAL {
        return Err(CoreError::config(format!(
            "polling interval must be at least {}ms, got {}ms",
            MIN_POLL_INTERVAL.as_millis(),
            interval.as_millis()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(MonitorConfig::default().validate().is_ok());
    }

    #[test]
    fn interval_floor_is_one_second() {
        assert!(validate_interval(Duration::from_millis(999)).is_err());
        assert!(validate_interval(Duration::from_millis(1000)).is_ok());
    }

    #[test]
    fn zero_threshold_is_rejected() {
        let cfg = MonitorConfig {
            failure_threshold: 0,
            ..MonitorConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(CoreError::Configuration { .. })));
    }
}

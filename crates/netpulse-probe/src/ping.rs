// ── ICMP reachability probe ──
//
// Raw ICMP sockets need elevated privileges, so the default pinger
// shells out to the platform `ping` binary (setuid or capability-enabled
// on every mainstream OS) and parses the round-trip time.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::error::Error;

/// Grace period on top of the probe timeout for process startup/teardown.
const PROCESS_GRACE: Duration = Duration::from_millis(500);

/// Outcome of one reachability probe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PingReply {
    pub alive: bool,
    /// Round-trip time. Only ever `Some` when `alive`.
    pub latency_ms: Option<f64>,
}

impl PingReply {
    pub fn alive(latency_ms: f64) -> Self {
        Self {
            alive: true,
            latency_ms: Some(latency_ms),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            alive: false,
            latency_ms: None,
        }
    }
}

/// A single-shot reachability primitive.
///
/// Implementations must report an unreachable host as
/// `Ok(PingReply::unreachable())`; `Err` is reserved for probes that could
/// not be carried out at all.
#[async_trait]
pub trait Pinger: Send + Sync {
    async fn ping(&self, address: &str, timeout: Duration) -> Result<PingReply, Error>;
}

/// [`Pinger`] backed by the system `ping` binary.
#[derive(Debug, Clone)]
pub struct SystemPinger {
    program: String,
}

impl SystemPinger {
    pub fn new() -> Self {
        Self {
            program: "ping".into(),
        }
    }

    /// Use a specific binary (e.g. `/usr/bin/ping` or `ping6`).
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for SystemPinger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Pinger for SystemPinger {
    #[instrument(skip(self), fields(program = %self.program))]
    async fn ping(&self, address: &str, timeout: Duration) -> Result<PingReply, Error> {
        if address.is_empty() || address.starts_with('-') {
            return Err(Error::Probe {
                target: address.into(),
                message: "invalid address".into(),
            });
        }

        let started = Instant::now();
        let child = Command::new(&self.program)
            .args(ping_args(address, timeout))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(timeout + PROCESS_GRACE, child).await {
            Ok(result) => result.map_err(|e| Error::Probe {
                target: address.into(),
                message: format!("failed to run {}: {e}", self.program),
            })?,
            Err(_) => {
                return Err(Error::ProbeTimeout {
                    target: address.into(),
                    timeout_ms: duration_ms(timeout),
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if output.status.success() {
            let latency = parse_latency_ms(&stdout)
                .unwrap_or_else(|| started.elapsed().as_secs_f64() * 1000.0);
            debug!(latency_ms = latency, "ping reply");
            return Ok(PingReply::alive(latency));
        }

        // Non-zero exit with nothing on stderr means "no reply"; anything on
        // stderr is the binary refusing to probe (bad name, no permission).
        let stderr = stderr.trim();
        if stderr.is_empty() {
            debug!(code = ?output.status.code(), "no ping reply");
            Ok(PingReply::unreachable())
        } else {
            Err(Error::Probe {
                target: address.into(),
                message: stderr.to_owned(),
            })
        }
    }
}

#[cfg(target_os = "windows")]
fn ping_args(address: &str, timeout: Duration) -> Vec<String> {
    vec![
        "-n".into(),
        "1".into(),
        "-w".into(),
        duration_ms(timeout).max(1).to_string(),
        address.into(),
    ]
}

#[cfg(target_os = "macos")]
fn ping_args(address: &str, timeout: Duration) -> Vec<String> {
    vec![
        "-n".into(),
        "-c".into(),
        "1".into(),
        "-t".into(),
        timeout_secs(timeout).to_string(),
        address.into(),
    ]
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn ping_args(address: &str, timeout: Duration) -> Vec<String> {
    vec![
        "-n".into(),
        "-c".into(),
        "1".into(),
        "-W".into(),
        timeout_secs(timeout).to_string(),
        address.into(),
    ]
}

/// Whole seconds, rounded up, never zero (`ping -W 0` means "wait forever").
#[cfg_attr(target_os = "windows", allow(dead_code))]
fn timeout_secs(timeout: Duration) -> u64 {
    let secs = timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0);
    secs.max(1)
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Extract the round-trip time from `ping` output.
///
/// Handles `time=0.045 ms` (Linux/BSD), `time=12ms` and `time<1ms` (Windows).
pub fn parse_latency_ms(output: &str) -> Option<f64> {
    let idx = output.find("time=").or_else(|| output.find("time<"))?;
    let rest = output.get(idx + 5..)?;
    let end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(rest.len());
    rest.get(..end)?.parse().ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn parses_linux_output() {
        let out = "PING 10.0.0.1 (10.0.0.1) 56(84) bytes of data.\n\
                   64 bytes from 10.0.0.1: icmp_seq=1 ttl=64 time=0.045 ms\n\n\
                   --- 10.0.0.1 ping statistics ---\n\
                   1 packets transmitted, 1 received, 0% packet loss, time 0ms\n";
        assert_eq!(parse_latency_ms(out), Some(0.045));
    }

    #[test]
    fn parses_macos_output() {
        let out = "64 bytes from 1.1.1.1: icmp_seq=0 ttl=57 time=12.732 ms";
        assert_eq!(parse_latency_ms(out), Some(12.732));
    }

    #[test]
    fn parses_windows_output() {
        assert_eq!(
            parse_latency_ms("Reply from 8.8.8.8: bytes=32 time=14ms TTL=117"),
            Some(14.0)
        );
        assert_eq!(
            parse_latency_ms("Reply from 127.0.0.1: bytes=32 time<1ms TTL=128"),
            Some(1.0)
        );
    }

    #[test]
    fn no_latency_in_loss_summary() {
        let out = "1 packets transmitted, 0 received, 100% packet loss";
        assert_eq!(parse_latency_ms(out), None);
    }

    #[test]
    fn timeout_secs_rounds_up_and_never_zero() {
        assert_eq!(timeout_secs(Duration::from_millis(0)), 1);
        assert_eq!(timeout_secs(Duration::from_millis(1500)), 2);
        assert_eq!(timeout_secs(Duration::from_secs(3)), 3);
    }

    #[tokio::test]
    async fn rejects_option_like_address() {
        let pinger = SystemPinger::new();
        let err = pinger
            .ping("-f", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Probe { .. }));
    }

    #[tokio::test]
    async fn missing_binary_is_probe_error() {
        let pinger = SystemPinger::with_program("/nonexistent/netpulse-ping");
        let err = pinger
            .ping("127.0.0.1", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Probe { .. }), "got {err:?}");
    }
}

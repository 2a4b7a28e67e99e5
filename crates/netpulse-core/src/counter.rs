// ── Counter delta engine ──
//
// Converts two successive readings of a monotonically increasing octet
// counter into a rate in bits per second. Stateless; the history store
// supplies the previous reading.
//
// A reading that went backwards is either a wrap at 2^width or a reset.
// A wrap is only coherent when the previous value sat in the upper half of
// the counter range and the implied rate stays within the ceiling. Anything
// else is a reset.

use std::time::Duration;

use chrono::{DateTime, Utc};
use netpulse_probe::CounterWidth;

/// Largest polling gap that still yields a rate.
pub const DEFAULT_MAX_GAP: Duration = Duration::from_secs(300);

/// 10 Gbit/s.
pub const DEFAULT_MAX_RATE_BPS: f64 = 10_000_000_000.0;

/// Plausibility bounds for rate derivation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CounterLimits {
    pub max_gap: Duration,
    pub max_rate_bps: f64,
}

impl Default for CounterLimits {
    fn default() -> Self {
        Self {
            max_gap: DEFAULT_MAX_GAP,
            max_rate_bps: DEFAULT_MAX_RATE_BPS,
        }
    }
}

impl CounterLimits {
    /// Lower the ceiling to the reported link speed, if any.
    #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
    pub fn capped_at_link(self, link_speed_bps: Option<u64>) -> Self {
        match link_speed_bps {
            Some(speed) if speed > 0 => Self {
                max_rate_bps: self.max_rate_bps.min(speed as f64),
                ..self
            },
            _ => self,
        }
    }
}

/// One counter value with its timestamp and width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterPoint {
    pub value: u64,
    pub at: DateTime<Utc>,
    pub width: CounterWidth,
}

/// Rate between two points, `None` when their widths differ.
pub fn rate_between(
    previous: &CounterPoint,
    current: &CounterPoint,
    limits: &CounterLimits,
) -> Option<f64> {
    if previous.width != current.width {
        return None;
    }
    rate(
        previous.value,
        previous.at,
        current.value,
        current.at,
        current.width,
        limits,
    )
}

/// Bits per second between two readings of the same counter.
///
/// Returns `None` when the interval is empty, negative or longer than
/// `limits.max_gap`, when either value does not fit `width`, when a
/// backwards step starts from the lower half of the counter range (a
/// reset, not a wrap), or when the result exceeds `limits.max_rate_bps`.
#[allow(clippy::cast_precision_loss, clippy::as_conversions)]
pub fn rate(
    previous: u64,
    previous_at: DateTime<Utc>,
    current: u64,
    current_at: DateTime<Utc>,
    width: CounterWidth,
    limits: &CounterLimits,
) -> Option<f64> {
    let elapsed = (current_at - previous_at).to_std().ok()?;
    if elapsed.is_zero() || elapsed > limits.max_gap {
        return None;
    }

    let modulus = width.modulus();
    let (previous, current) = (u128::from(previous), u128::from(current));
    if previous >= modulus || current >= modulus {
        return None;
    }

    let delta = if current >= previous {
        current - previous
    } else if previous > modulus / 2 {
        modulus - previous + current
    } else {
        return None;
    };

    let bps = delta as f64 * 8.0 / elapsed.as_secs_f64();
    if !bps.is_finite() || bps < 0.0 || bps > limits.max_rate_bps {
        return None;
    }
    Some(bps)
}

pub fn bps_to_mbps(bps: f64) -> f64 {
    bps / 1_000_000.0
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::float_cmp,
    clippy::cast_precision_loss,
    clippy::as_conversions
)]
mod tests {
    use chrono::{TimeDelta, TimeZone};

    use super::*;

    const GBPS: f64 = 1_000_000_000.0;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn after(secs: i64) -> DateTime<Utc> {
        t0() + TimeDelta::seconds(secs)
    }

    fn limits_with_ceiling(max_rate_bps: f64) -> CounterLimits {
        CounterLimits {
            max_rate_bps,
            ..CounterLimits::default()
        }
    }

    #[test]
    fn forward_delta_is_linear() {
        let limits = CounterLimits::default();
        for (prev, cur, secs) in [(1_000, 1_001_000, 10), (0, 0, 30), (7, 1_000_007, 300)] {
            let got = rate(prev, t0(), cur, after(secs), CounterWidth::Bits64, &limits).unwrap();
            let want = (cur - prev) as f64 * 8.0 / secs as f64;
            assert_eq!(got, want);
            assert!(got >= 0.0);
        }
    }

    #[test]
    fn wrap_of_32_bit_counter() {
        let prev = (1u64 << 32) - 100;
        let got = rate(prev, t0(), 50, after(10), CounterWidth::Bits32, &CounterLimits::default());
        // 150 bytes over 10 s.
        assert_eq!(got, Some(120.0));
    }

    #[test]
    fn wrap_of_64_bit_counter() {
        let got = rate(
            u64::MAX - 9,
            t0(),
            10,
            after(1),
            CounterWidth::Bits64,
            &CounterLimits::default(),
        );
        assert_eq!(got, Some(160.0));
    }

    #[test]
    fn reset_is_not_reported_as_spike() {
        // Implied wrap rate is about 3.43 Gbit/s, over a 1 Gbit/s ceiling.
        let got = rate(
            5_000_000,
            t0(),
            10,
            after(10),
            CounterWidth::Bits32,
            &limits_with_ceiling(GBPS),
        );
        assert_eq!(got, None);
    }

    #[test]
    fn reset_under_link_speed_ceiling() {
        let limits = CounterLimits::default().capped_at_link(Some(1_000_000_000));
        assert_eq!(limits.max_rate_bps, GBPS);
        let got = rate(5_000_000, t0(), 10, after(10), CounterWidth::Bits32, &limits);
        assert_eq!(got, None);
    }

    #[test]
    fn reset_at_default_ceiling_has_no_rate() {
        // 5_000_000 sits far below the top of the 32-bit range, so the
        // backwards step is a reboot even though 10 Gbit/s would allow it.
        let got = rate(
            5_000_000,
            t0(),
            10,
            after(10),
            CounterWidth::Bits32,
            &CounterLimits::default(),
        );
        assert_eq!(got, None);
    }

    #[test]
    fn wrap_from_upper_half_is_accepted_at_default_ceiling() {
        let modulus = 1u64 << 32;
        let prev = modulus / 2 + 1;
        let got = rate(prev, t0(), 0, after(10), CounterWidth::Bits32, &CounterLimits::default())
            .unwrap();
        assert_eq!(got, (modulus - prev) as f64 * 8.0 / 10.0);

        let at_half = modulus / 2;
        assert_eq!(
            rate(at_half, t0(), 0, after(10), CounterWidth::Bits32, &CounterLimits::default()),
            None
        );
    }

    #[test]
    fn gap_guard() {
        let limits = CounterLimits::default();
        assert_eq!(rate(0, t0(), 1_000, after(301), CounterWidth::Bits64, &limits), None);
        assert_eq!(rate(10, t0(), 5, after(301), CounterWidth::Bits32, &limits), None);
        assert!(rate(0, t0(), 1_000, after(300), CounterWidth::Bits64, &limits).is_some());
    }

    #[test]
    fn empty_or_negative_interval() {
        let limits = CounterLimits::default();
        assert_eq!(rate(0, t0(), 10, t0(), CounterWidth::Bits64, &limits), None);
        assert_eq!(rate(0, after(5), 10, t0(), CounterWidth::Bits64, &limits), None);
    }

    #[test]
    fn above_ceiling_is_instrumentation_error() {
        // 2 GB in one second is 16 Gbit/s.
        let got = rate(
            0,
            t0(),
            2_000_000_000,
            after(1),
            CounterWidth::Bits64,
            &CounterLimits::default(),
        );
        assert_eq!(got, None);
    }

    #[test]
    fn value_outside_width_is_rejected() {
        let got = rate(
            1u64 << 33,
            t0(),
            (1u64 << 33) + 10,
            after(10),
            CounterWidth::Bits32,
            &CounterLimits::default(),
        );
        assert_eq!(got, None);
    }

    #[test]
    fn width_change_invalidates_delta() {
        let prev = CounterPoint {
            value: 100,
            at: t0(),
            width: CounterWidth::Bits32,
        };
        let cur = CounterPoint {
            value: 200,
            at: after(10),
            width: CounterWidth::Bits64,
        };
        assert_eq!(rate_between(&prev, &cur, &CounterLimits::default()), None);

        let same = CounterPoint {
            width: CounterWidth::Bits32,
            ..cur
        };
        assert_eq!(rate_between(&prev, &same, &CounterLimits::default()), Some(80.0));
    }

    #[test]
    fn link_speed_never_raises_ceiling() {
        let limits = limits_with_ceiling(GBPS).capped_at_link(Some(100_000_000_000));
        assert_eq!(limits.max_rate_bps, GBPS);
        assert_eq!(CounterLimits::default().capped_at_link(None), CounterLimits::default());
        assert_eq!(CounterLimits::default().capped_at_link(Some(0)), CounterLimits::default());
    }
}

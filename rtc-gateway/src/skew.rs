use std::time::{Duration, Instant};

/// Warm-up period before the compensator starts reacting, long enough to
/// ride out ICE/DTLS settle jitter.
pub const WARMUP: Duration = Duration::from_secs(15);
/// Active-delay threshold beyond which the compensator intervenes.
pub const THRESHOLD: Duration = Duration::from_millis(40);
/// Smoothing factor for the exponentially smoothed active delay.
const SMOOTHING_ALPHA: f64 = 0.125;

/// Per-direction, per-media clock-drift detector (§4.3). Compares a
/// packet's RTP timestamp, converted to wall-clock time via the
/// negotiated clock rate, against its actual arrival time; when the two
/// diverge past [`THRESHOLD`] it reports how many silent/dropped sequence
/// numbers the rewrite context should apply.
#[derive(Debug, Clone)]
pub struct SkewCompensator {
    clock_rate: Option<u32>,
    start: Instant,
    reference: Option<(u32, Instant)>,
    active_delay_ms: f64,
}

impl SkewCompensator {
    pub fn new(clock_rate: Option<u32>) -> Self {
        Self {
            clock_rate,
            start: Instant::now(),
            reference: None,
            active_delay_ms: 0.0,
        }
    }

    #[cfg(test)]
    fn with_start(clock_rate: Option<u32>, start: Instant) -> Self {
        Self {
            clock_rate,
            start,
            reference: None,
            active_delay_ms: 0.0,
        }
    }

    fn warmed_up(&self, now: Instant) -> bool {
        now.duration_since(self.start) >= WARMUP
    }

    /// Feeds one packet's RTP timestamp and monotonic arrival time.
    /// Returns the seq-number delta the rewrite context should apply: a
    /// positive N means emit N silent sequence numbers (sender running
    /// slow relative to our clock), negative N means drop this packet
    /// (sender running fast), and 0 means no correction needed. Always 0
    /// during warm-up or when the clock rate is unknown (I4).
    pub fn observe(&mut self, rtp_timestamp: u32, now: Instant) -> i32 {
        let Some(rate) = self.clock_rate else {
            return 0;
        };
        if !self.warmed_up(now) {
            return 0;
        }

        let (ts0, t0) = *self.reference.get_or_insert((rtp_timestamp, now));

        let ticks = rtp_timestamp.wrapping_sub(ts0) as f64;
        let expected_offset_secs = ticks / rate as f64;
        let expected = t0 + Duration::from_secs_f64(expected_offset_secs.max(0.0));

        let delay_ms = now
            .checked_duration_since(expected)
            .map(|d| d.as_secs_f64() * 1000.0)
            .unwrap_or_else(|| -expected.duration_since(now).as_secs_f64() * 1000.0);

        self.active_delay_ms =
            SMOOTHING_ALPHA * delay_ms + (1.0 - SMOOTHING_ALPHA) * self.active_delay_ms;

        let threshold_ms = THRESHOLD.as_secs_f64() * 1000.0;
        if self.active_delay_ms > threshold_ms {
            let n = (self.active_delay_ms / threshold_ms).ceil() as i32;
            n.max(1)
        } else if self.active_delay_ms < -threshold_ms {
            let n = (-self.active_delay_ms / threshold_ms).ceil() as i32;
            -n.max(1)
        } else {
            0
        }
    }
}

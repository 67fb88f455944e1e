use std::ops::Add;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Anchors a monotonic [`Instant`] to wall-clock time so RTCP Sender Reports
/// can carry an NTP timestamp without repeatedly calling `SystemTime::now`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SystemInstant {
    instant: Instant,
    duration_since_unix_epoch: Duration,
}

impl SystemInstant {
    pub fn now() -> Self {
        Self {
            instant: Instant::now(),
            duration_since_unix_epoch: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_else(|_| Duration::from_secs(0)),
        }
    }

    pub fn duration_since_unix_epoch(&self, now: Instant) -> Duration {
        now.duration_since(self.instant)
            .add(self.duration_since_unix_epoch)
    }

    /// Converts a monotonic instant to a 64-bit NTP short format timestamp.
    pub fn ntp(&self, now: Instant) -> u64 {
        SystemInstant::unix2ntp(self.duration_since_unix_epoch(now).as_nanos() as u64)
    }

    pub fn instant(&self, ntp: u64) -> Instant {
        let unix = SystemInstant::ntp2unix(ntp);
        let duration_since_unix_epoch =
            Duration::new(unix / 1_000_000_000, (unix % 1_000_000_000) as u32);
        self.instant + duration_since_unix_epoch - self.duration_since_unix_epoch
    }

    fn unix2ntp(u: u64) -> u64 {
        let mut s = u / 1_000_000_000;
        s += 0x83AA7E80; // offset in seconds between unix epoch and ntp epoch
        let mut f = u % 1_000_000_000;
        f <<= 32;
        f /= 1_000_000_000;
        s <<= 32;

        s | f
    }

    fn ntp2unix(t: u64) -> u64 {
        let mut s = t >> 32;
        let mut f = t & 0xFFFFFFFF;
        f *= 1_000_000_000;
        f >>= 32;
        s -= 0x83AA7E80;
        s * 1_000_000_000 + f
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ntp_roundtrip_is_stable() {
        let anchor = SystemInstant::now();
        let now = Instant::now() + Duration::from_millis(250);
        let ntp = anchor.ntp(now);
        let back = anchor.instant(ntp);
        // sub-second rounding in the fixed-point conversion is acceptable.
        let delta = if back > now { back - now } else { now - back };
        assert!(delta < Duration::from_millis(1));
    }
}

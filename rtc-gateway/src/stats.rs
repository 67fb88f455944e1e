use std::time::{Duration, Instant};

/// Per-direction, per-media packet/byte counters and NACK-rate tracking
/// used for slow-link detection (§4.9, §3 Component "incoming/outgoing
/// stats").
#[derive(Debug)]
pub struct LinkStats {
    packets: u64,
    bytes: u64,
    bytes_this_second: u64,
    second_start: Instant,
    bytes_last_second: u64,

    nacks_window_start: Instant,
    nacks_in_window: u32,
    last_slow_link_notify: Option<Instant>,
}

/// NACKs per second beyond which the link is considered slow.
pub const SLOW_LINK_THRESHOLD: u32 = 10;
/// Minimum spacing between repeated `slow_link` notifications.
const NOTIFY_MIN_INTERVAL: Duration = Duration::from_secs(1);

impl LinkStats {
    pub fn new(now: Instant) -> Self {
        Self {
            packets: 0,
            bytes: 0,
            bytes_this_second: 0,
            second_start: now,
            bytes_last_second: 0,
            nacks_window_start: now,
            nacks_in_window: 0,
            last_slow_link_notify: None,
        }
    }

    pub fn record_packet(&mut self, len: usize, now: Instant) {
        self.packets += 1;
        self.bytes += len as u64;
        self.roll_second(now);
        self.bytes_this_second += len as u64;
    }

    fn roll_second(&mut self, now: Instant) {
        if now.duration_since(self.second_start) >= Duration::from_secs(1) {
            self.bytes_last_second = self.bytes_this_second;
            self.bytes_this_second = 0;
            self.second_start = now;
        }
    }

    pub fn bytes_in_last_second(&self) -> u64 {
        self.bytes_last_second
    }

    pub fn packet_count(&self) -> u64 {
        self.packets
    }

    pub fn byte_count(&self) -> u64 {
        self.bytes
    }

    /// Records one issued NACK and returns true if the plugin's
    /// `slow_link` callback should fire now: the 1-second NACK count
    /// exceeds [`SLOW_LINK_THRESHOLD`] and we haven't already notified
    /// within the last second.
    pub fn record_nack_and_check_slow_link(&mut self, now: Instant) -> bool {
        if now.duration_since(self.nacks_window_start) >= Duration::from_secs(1) {
            self.nacks_window_start = now;
            self.nacks_in_window = 0;
        }
        self.nacks_in_window += 1;

        if self.nacks_in_window > SLOW_LINK_THRESHOLD {
            let should_notify = self
                .last_slow_link_notify
                .is_none_or(|t| now.duration_since(t) >= NOTIFY_MIN_INTERVAL);
            if should_notify {
                self.last_slow_link_notify = Some(now);
                return true;
            }
        }
        false
    }
}

/// No-media timer (§4.10, §9 open question). Tracks the last time any
/// media was received on a handle; on expiry it always produces a
/// notification and, only when `hangup_on_expiry` is set, also a hangup —
/// the decided default is notify-only (`hangup_on_expiry = false`).
#[derive(Debug)]
pub struct NoMediaTimer {
    period: Duration,
    hangup_on_expiry: bool,
    last_media: Instant,
    notified: bool,
}

/// Outcome of [`NoMediaTimer::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoMediaOutcome {
    Ok,
    Notify,
    NotifyAndHangup,
}

impl NoMediaTimer {
    /// `period` of zero disables the timer entirely.
    pub fn new(period: Duration, hangup_on_expiry: bool, now: Instant) -> Self {
        Self {
            period,
            hangup_on_expiry,
            last_media: now,
            notified: false,
        }
    }

    pub fn record_media(&mut self, now: Instant) {
        self.last_media = now;
        self.notified = false;
    }

    /// Call on each watchdog tick. Notifies at most once per silence
    /// episode; `record_media` resets it so a later silence re-notifies.
    pub fn check(&mut self, now: Instant) -> NoMediaOutcome {
        if self.period.is_zero() || self.notified {
            return NoMediaOutcome::Ok;
        }
        if now.duration_since(self.last_media) >= self.period {
            self.notified = true;
            if self.hangup_on_expiry {
                NoMediaOutcome::NotifyAndHangup
            } else {
                NoMediaOutcome::Notify
            }
        } else {
            NoMediaOutcome::Ok
        }
    }
}

use rtc_rtp::Header;
use std::time::Instant;

/// Smallest positive timestamp step used when the negotiated clock rate is
/// unknown, so a rewritten stream's timestamp still strictly rises across
/// an SSRC change.
const DEFAULT_TS_STEP: u32 = 1;

/// Per-media-lane rewrite state (§4.2). Maps an upstream `(ssrc, seq, ts)`
/// run onto a single continuous downstream stream, so a renegotiation,
/// simulcast layer switch, or ICE restart never resets the receiver's
/// jitter buffer.
///
/// Callers must serialize calls to [`RewriteContext::update`] for a given
/// lane — in the engine this means holding the owning Stream's mutex.
#[derive(Debug, Clone, Default)]
pub struct RewriteContext {
    last_ssrc: Option<u32>,
    base_seq: u16,
    base_seq_prev: u16,
    base_ts: u32,
    base_ts_prev: u32,
    seq_offset: u16,
    ts_offset: u32,
    last_seq: u16,
    last_ts: u32,
    last_time: Option<Instant>,
    /// Negotiated RTP clock rate for this lane, if known (48_000 audio,
    /// 90_000 video). `None` degrades the timestamp step to
    /// [`DEFAULT_TS_STEP`].
    pub clock_rate: Option<u32>,
    initialized: bool,
}

impl RewriteContext {
    pub fn new(clock_rate: Option<u32>) -> Self {
        Self {
            clock_rate,
            ..Default::default()
        }
    }

    /// Rewrites `header` in place per the §4.2 contract. `now` is the
    /// monotonic arrival time recorded as `last_time`.
    pub fn update(&mut self, header: &mut Header, now: Instant) {
        let ssrc_changed = self.last_ssrc != Some(header.ssrc);

        if !self.initialized {
            self.initialized = true;
            self.last_ssrc = Some(header.ssrc);
            self.base_seq = header.sequence_number;
            self.base_ts = header.timestamp;
            self.seq_offset = 0;
            self.ts_offset = 0;
            self.last_seq = header.sequence_number;
            self.last_ts = header.timestamp;
            self.last_time = Some(now);
            return;
        }

        if ssrc_changed {
            self.base_ts_prev = self.base_ts;
            self.base_ts = header.timestamp;
            self.base_seq_prev = self.base_seq;
            self.base_seq = header.sequence_number;
            self.last_ssrc = Some(header.ssrc);

            let desired_seq = self.last_seq.wrapping_add(1);
            self.seq_offset = desired_seq.wrapping_sub(header.sequence_number);

            let step = self
                .clock_rate
                .map(|rate| (rate / 50).max(1))
                .unwrap_or(DEFAULT_TS_STEP);
            let desired_ts = self.last_ts.wrapping_add(step);
            self.ts_offset = desired_ts.wrapping_sub(header.timestamp);
        }

        header.sequence_number = header.sequence_number.wrapping_add(self.seq_offset);
        header.timestamp = header.timestamp.wrapping_add(self.ts_offset);

        self.last_seq = header.sequence_number;
        self.last_ts = header.timestamp;
        self.last_time = Some(now);
    }

    /// Advances `base_seq` without touching timestamps, for a peer-side
    /// sequence reset (wraparound recovery) that isn't accompanied by an
    /// SSRC change.
    pub fn seq_reset(&mut self, header: &mut Header) {
        let desired_seq = self.last_seq.wrapping_add(1);
        self.seq_offset = desired_seq.wrapping_sub(header.sequence_number);
        self.base_seq = header.sequence_number;
        header.sequence_number = header.sequence_number.wrapping_add(self.seq_offset);
        self.last_seq = header.sequence_number;
    }

    pub fn last_outbound_seq(&self) -> u16 {
        self.last_seq
    }

    pub fn last_outbound_ts(&self) -> u32 {
        self.last_ts
    }
}

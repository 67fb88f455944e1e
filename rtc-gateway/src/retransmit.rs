use bytes::{BufMut, Bytes, BytesMut};
use rtc_rtcp::transport_feedbacks::transport_layer_nack::NackPair;
use rtc_rtp::Packet;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

const UINT16_SIZE_HALF: u16 = 1 << 15;

/// Sent-packet cache for one outbound media lane (§4.4, invariant d).
/// FIFO of the last `max` packets plus a `seq -> packet` index, so an
/// inbound NACK can retrieve and retransmit a recently sent packet in
/// O(1) without holding the whole history.
pub struct SendBuffer {
    max: usize,
    order: VecDeque<u16>,
    packets: HashMap<u16, Packet>,
}

impl SendBuffer {
    /// `max` defaults to 300 per the engine configuration
    /// (`media.nack_queue`).
    pub fn new(max: usize) -> Self {
        Self {
            max: max.max(1),
            order: VecDeque::with_capacity(max),
            packets: HashMap::with_capacity(max),
        }
    }

    pub fn push(&mut self, packet: Packet) {
        let seq = packet.header.sequence_number;
        if self.packets.insert(seq, packet).is_none() {
            self.order.push_back(seq);
        }
        while self.order.len() > self.max {
            if let Some(evict) = self.order.pop_front() {
                self.packets.remove(&evict);
            }
        }
    }

    pub fn get(&self, seq: u16) -> Option<&Packet> {
        self.packets.get(&seq)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// State of one slot in a [`NackWindow`] (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Not yet seen, still within the promote-to-NACKED deadline.
    Missing { since: Instant },
    /// A NACK was sent requesting this sequence number.
    Nacked { since: Instant },
    /// Giving up: no retransmit arrived within the deadline.
    GivenUp,
    /// Packet has been received; terminal.
    Recved,
}

const WINDOW_SIZE: usize = 160;

/// Default time before a MISSING slot is promoted to NACKED (roughly one
/// RTT estimate in the absence of a live RTT sample).
pub const DEFAULT_RTT_ESTIMATE: Duration = Duration::from_millis(100);
/// Default time before a NACKED slot is given up on.
pub const DEFAULT_GIVEUP: Duration = Duration::from_secs(1);

/// Fixed-size doubly-linked window over the last 160 received sequence
/// numbers for one media lane, tracking each slot's MISSING / NACKED /
/// GIVEUP / RECVED state and driving NACK (re)generation (§4.4).
pub struct NackWindow {
    slots: Box<[Option<SlotState>; WINDOW_SIZE]>,
    seqs: Box<[u16; WINDOW_SIZE]>,
    highest: Option<u16>,
    rtt_estimate: Duration,
    giveup_after: Duration,
}

impl NackWindow {
    pub fn new() -> Self {
        Self {
            slots: Box::new([None; WINDOW_SIZE]),
            seqs: Box::new([0u16; WINDOW_SIZE]),
            highest: None,
            rtt_estimate: DEFAULT_RTT_ESTIMATE,
            giveup_after: DEFAULT_GIVEUP,
        }
    }

    fn slot_index(seq: u16) -> usize {
        (seq as usize) % WINDOW_SIZE
    }

    /// Records that `seq` has arrived, marking any sequence numbers
    /// between the previous highest and `seq` as MISSING.
    pub fn receive(&mut self, seq: u16, now: Instant) {
        let idx = Self::slot_index(seq);
        self.seqs[idx] = seq;
        self.slots[idx] = Some(SlotState::Recved);

        let Some(highest) = self.highest else {
            self.highest = Some(seq);
            return;
        };

        let diff = seq.wrapping_sub(highest);
        if diff == 0 {
            return;
        }
        if diff < UINT16_SIZE_HALF {
            let mut i = highest.wrapping_add(1);
            while i != seq {
                let gap_idx = Self::slot_index(i);
                self.seqs[gap_idx] = i;
                self.slots[gap_idx] = Some(SlotState::Missing { since: now });
                i = i.wrapping_add(1);
            }
            self.highest = Some(seq);
        } else {
            // Out-of-order arrival of a sequence we were tracking as missing/nacked.
        }
    }

    /// Sets the RTT estimate used to promote MISSING -> NACKED.
    pub fn set_rtt_estimate(&mut self, rtt: Duration) {
        self.rtt_estimate = rtt;
    }

    /// Advances slot state machines and returns the sequence numbers that
    /// should be (re-)NACKed this tick: newly promoted MISSING -> NACKED
    /// slots.
    pub fn tick(&mut self, now: Instant) -> Vec<u16> {
        let mut to_nack = Vec::new();
        for idx in 0..WINDOW_SIZE {
            match self.slots[idx] {
                Some(SlotState::Missing { since }) if now.duration_since(since) >= self.rtt_estimate => {
                    self.slots[idx] = Some(SlotState::Nacked { since: now });
                    to_nack.push(self.seqs[idx]);
                }
                Some(SlotState::Nacked { since }) if now.duration_since(since) >= self.giveup_after => {
                    self.slots[idx] = Some(SlotState::GivenUp);
                }
                _ => {}
            }
        }
        to_nack
    }

    pub fn state_of(&self, seq: u16) -> Option<SlotState> {
        let idx = Self::slot_index(seq);
        if self.seqs[idx] == seq {
            self.slots[idx]
        } else {
            None
        }
    }
}

impl Default for NackWindow {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds the minimal set of NACK pairs covering `sequence_numbers`,
/// de-duplicated per (seq, 10ms) request so a retransmit-in-flight isn't
/// re-requested every tick.
#[derive(Debug, Default)]
pub struct NackDedup {
    last_sent: HashMap<u16, Instant>,
}

const DEDUP_WINDOW: Duration = Duration::from_millis(10);

impl NackDedup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filters `sequence_numbers` down to those not already NACKed within
    /// the dedup window, and records the survivors as sent at `now`.
    pub fn filter(&mut self, sequence_numbers: &[u16], now: Instant) -> Vec<u16> {
        let mut out = Vec::new();
        for &seq in sequence_numbers {
            let dup = self
                .last_sent
                .get(&seq)
                .is_some_and(|&t| now.duration_since(t) < DEDUP_WINDOW);
            if !dup {
                self.last_sent.insert(seq, now);
                out.push(seq);
            }
        }
        out
    }
}

/// Resolves an inbound NACK's (PID, BLP) pairs against a [`SendBuffer`],
/// returning the packets that should be retransmitted, unchanged, to the
/// peer (RFC 4588 wrapping happens at a higher layer once RTX is
/// negotiated, since it needs the stream's rtx SSRC/PT).
pub fn resolve_nack_pairs<'a>(buffer: &'a SendBuffer, pairs: &[NackPair]) -> Vec<&'a Packet> {
    let mut out = Vec::new();
    for pair in pairs {
        for seq in pair.packet_list() {
            if let Some(packet) = buffer.get(seq) {
                out.push(packet);
            }
        }
    }
    out
}

/// Rewrites a recovered packet into an RFC 4588 rtx packet: SSRC and
/// payload type swapped for the negotiated rtx pair, a fresh monotonic
/// `rtx_seq_number` in the header, and the original sequence number (OSN)
/// prepended to the payload as a big-endian u16 (§4.4).
pub struct RtxWrapper {
    ssrc: u32,
    payload_type: u8,
    next_seq: u16,
}

impl RtxWrapper {
    pub fn new(ssrc: u32, payload_type: u8) -> Self {
        Self {
            ssrc,
            payload_type,
            next_seq: 0,
        }
    }

    /// Wraps `original` for retransmission. Returns a new packet; the
    /// source is left untouched so it can still serve a later NACK.
    pub fn wrap(&mut self, original: &Packet) -> Packet {
        let osn = original.header.sequence_number;
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);

        let mut payload = BytesMut::with_capacity(2 + original.payload.len());
        payload.put_u16(osn);
        payload.extend_from_slice(&original.payload);

        let mut header = original.header.clone();
        header.ssrc = self.ssrc;
        header.payload_type = self.payload_type;
        header.sequence_number = seq;

        Packet {
            header,
            payload: Bytes::from(payload),
        }
    }
}

/// Strips the OSN prepended by [`RtxWrapper::wrap`] from an inbound rtx
/// packet, returning the original sequence number and the base payload
/// (§4.8 "if rtx, the OSN is stripped and the packet re-presented under
/// the base SSRC").
pub fn strip_rtx_osn(payload: &Bytes) -> Option<(u16, Bytes)> {
    if payload.len() < 2 {
        return None;
    }
    let osn = u16::from_be_bytes([payload[0], payload[1]]);
    Some((osn, payload.slice(2..)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use rtc_rtp::Header;

    fn packet(seq: u16) -> Packet {
        Packet {
            header: Header {
                sequence_number: seq,
                ..Header::default()
            },
            payload: Bytes::from(vec![seq as u8]),
        }
    }

    #[test]
    fn send_buffer_evicts_oldest_beyond_max() {
        let mut buf = SendBuffer::new(3);
        for seq in 0..5u16 {
            buf.push(packet(seq));
        }
        assert_eq!(buf.len(), 3);
        assert!(buf.get(0).is_none());
        assert!(buf.get(1).is_none());
        assert!(buf.get(4).is_some());
    }

    /// PID=42, BLP=0x0005 requests seqs 42 (base), 43 (bit0) and 45
    /// (bit2). With the buffer holding 42, 43, 45 and 47, the first three
    /// are retransmitted and 47 is skipped since it was never requested.
    #[test]
    fn resolves_nack_pairs_against_send_buffer() {
        let mut buf = SendBuffer::new(300);
        for seq in [42u16, 43, 45, 47] {
            buf.push(packet(seq));
        }
        let pairs = vec![NackPair {
            packet_id: 42,
            lost_packets: 0x0005,
        }];
        let resolved = resolve_nack_pairs(&buf, &pairs);
        let seqs: Vec<u16> = resolved.iter().map(|p| p.header.sequence_number).collect();
        assert_eq!(seqs, vec![42, 43, 45]);
    }

    /// Same request against a buffer missing 43 and 45 (only 42 and 47
    /// were actually sent/retained): only the hit is retransmitted.
    #[test]
    fn skips_requested_seqs_not_present_in_buffer() {
        let mut buf = SendBuffer::new(300);
        for seq in [42u16, 47] {
            buf.push(packet(seq));
        }
        let pairs = vec![NackPair {
            packet_id: 42,
            lost_packets: 0x0005,
        }];
        let resolved = resolve_nack_pairs(&buf, &pairs);
        let seqs: Vec<u16> = resolved.iter().map(|p| p.header.sequence_number).collect();
        assert_eq!(seqs, vec![42]);
    }

    #[test]
    fn nack_window_tracks_gap_and_promotes() {
        let mut window = NackWindow::new();
        window.set_rtt_estimate(Duration::from_millis(10));
        let start = Instant::now();
        window.receive(0, start);
        window.receive(3, start); // gap at 1, 2

        assert!(matches!(
            window.state_of(1),
            Some(SlotState::Missing { .. })
        ));
        assert!(matches!(window.state_of(3), Some(SlotState::Recved)));

        let nacked = window.tick(start + Duration::from_millis(20));
        assert_eq!(nacked.len(), 2);
        assert!(nacked.contains(&1));
        assert!(nacked.contains(&2));
        assert!(matches!(window.state_of(1), Some(SlotState::Nacked { .. })));
    }

    #[test]
    fn nack_window_gives_up_after_deadline() {
        let mut window = NackWindow::new();
        window.set_rtt_estimate(Duration::from_millis(1));
        let start = Instant::now();
        window.receive(0, start);
        window.receive(2, start);
        window.tick(start + Duration::from_millis(5));
        assert!(matches!(window.state_of(1), Some(SlotState::Nacked { .. })));
        let giveup_at = start + Duration::from_millis(5) + DEFAULT_GIVEUP + Duration::from_millis(1);
        window.tick(giveup_at);
        assert_eq!(window.state_of(1), Some(SlotState::GivenUp));
    }

    #[test]
    fn rtx_wrap_prepends_osn_and_swaps_ssrc_pt() {
        let mut wrapper = RtxWrapper::new(0xFEED, 99);
        let mut original = packet(42);
        original.header.ssrc = 0xAAA;
        original.header.payload_type = 96;
        original.payload = Bytes::from_static(&[0xAA, 0xBB, 0xCC]);

        let wrapped = wrapper.wrap(&original);
        assert_eq!(wrapped.header.ssrc, 0xFEED);
        assert_eq!(wrapped.header.payload_type, 99);
        assert_eq!(wrapped.header.sequence_number, 0);
        assert_eq!(&wrapped.payload[..2], &[0x00, 0x2A]); // OSN = 42
        assert_eq!(&wrapped.payload[2..], &[0xAA, 0xBB, 0xCC]);

        let next = wrapper.wrap(&original);
        assert_eq!(next.header.sequence_number, 1);
    }

    #[test]
    fn strip_rtx_osn_recovers_original_sequence_and_payload() {
        let mut wrapper = RtxWrapper::new(0xFEED, 99);
        let mut original = packet(7);
        original.payload = Bytes::from_static(&[1, 2, 3]);
        let wrapped = wrapper.wrap(&original);

        let (osn, payload) = strip_rtx_osn(&wrapped.payload).unwrap();
        assert_eq!(osn, 7);
        assert_eq!(&payload[..], &[1, 2, 3]);
    }

    #[test]
    fn dedup_suppresses_repeat_within_window() {
        let mut dedup = NackDedup::new();
        let now = Instant::now();
        let first = dedup.filter(&[1, 2], now);
        assert_eq!(first, vec![1, 2]);
        let second = dedup.filter(&[1, 2], now + Duration::from_millis(5));
        assert!(second.is_empty());
        let third = dedup.filter(&[1, 2], now + Duration::from_millis(15));
        assert_eq!(third, vec![1, 2]);
    }
}

use rtc_rtcp::payload_feedbacks::receiver_estimated_max_bitrate::ReceiverEstimatedMaxBitrate;
use rtc_rtcp::receiver_report::ReceiverReport;
use rtc_rtcp::reception_report::ReceptionReport;
use rtc_rtcp::sender_report::SenderReport;
use rtc_rtcp::transport_feedbacks::transport_layer_cc::TransportLayerCc;
use rtc_rtcp::transport_feedbacks::transport_layer_nack::TransportLayerNack;
use rtc_rtcp::Packet;
use rtc_rtp::Packet as RtpPacket;
use rtc_shared::time::SystemInstant;
use bytes::{BufMut, BytesMut};
use log::warn;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Per-stream, per-direction loss/jitter accounting and RR/SR emission
/// (§4.5, §3 "per-layer RTCP contexts"). One instance tracks what we are
/// receiving from the peer on a given media SSRC.
pub struct ReceiverContext {
    ssrc: u32,
    receiver_ssrc: u32,
    clock_rate: f64,
    received: Vec<u64>,
    bitmap_slots: usize,
    started: bool,
    seq_num_cycles: u16,
    last_seq_num: u16,
    last_report_seq_num: u16,
    last_rtp_time_rtp: u32,
    last_rtp_time_time: Instant,
    jitter: f64,
    last_sender_report_ntp: u32,
    last_sender_report_time: Option<Instant>,
    total_lost: u32,
}

const PACKETS_PER_ENTRY: usize = 64;
const DEFAULT_BITMAP_ENTRIES: usize = 128;

impl ReceiverContext {
    pub fn new(ssrc: u32, clock_rate: u32) -> Self {
        Self {
            ssrc,
            receiver_ssrc: rand::random(),
            clock_rate: clock_rate as f64,
            received: vec![0u64; DEFAULT_BITMAP_ENTRIES],
            bitmap_slots: DEFAULT_BITMAP_ENTRIES,
            started: false,
            seq_num_cycles: 0,
            last_seq_num: 0,
            last_report_seq_num: 0,
            last_rtp_time_rtp: 0,
            last_rtp_time_time: Instant::now(),
            jitter: 0.0,
            last_sender_report_ntp: 0,
            last_sender_report_time: None,
            total_lost: 0,
        }
    }

    fn mark_received(&mut self, seq: u16) {
        let pos = (seq as usize) % (self.bitmap_slots * PACKETS_PER_ENTRY);
        self.received[pos / PACKETS_PER_ENTRY] |= 1 << (pos % PACKETS_PER_ENTRY);
    }

    fn mark_missing(&mut self, seq: u16) {
        let pos = (seq as usize) % (self.bitmap_slots * PACKETS_PER_ENTRY);
        self.received[pos / PACKETS_PER_ENTRY] &= !(1u64 << (pos % PACKETS_PER_ENTRY));
    }

    fn is_received(&self, seq: u16) -> bool {
        let pos = (seq as usize) % (self.bitmap_slots * PACKETS_PER_ENTRY);
        (self.received[pos / PACKETS_PER_ENTRY] & (1 << (pos % PACKETS_PER_ENTRY))) != 0
    }

    /// Folds one inbound RTP packet into the loss/jitter accounting
    /// (RFC 3550 §A.8 jitter formula).
    pub fn on_rtp(&mut self, packet: &RtpPacket, now: Instant) {
        let seq = packet.header.sequence_number;
        if !self.started {
            self.started = true;
            self.mark_received(seq);
            self.last_seq_num = seq;
            self.last_report_seq_num = seq.wrapping_sub(1);
            self.last_rtp_time_rtp = packet.header.timestamp;
            self.last_rtp_time_time = now;
            return;
        }

        self.mark_received(seq);
        let diff = seq.wrapping_sub(self.last_seq_num);
        if diff > 0 && diff < (1 << 15) {
            if seq < self.last_seq_num {
                self.seq_num_cycles = self.seq_num_cycles.wrapping_add(1);
            }
            let mut i = self.last_seq_num.wrapping_add(1);
            while i != seq {
                self.mark_missing(i);
                i = i.wrapping_add(1);
            }
            self.last_seq_num = seq;
        }

        let d = now.duration_since(self.last_rtp_time_time).as_secs_f64() * self.clock_rate
            - (packet.header.timestamp as f64 - self.last_rtp_time_rtp as f64);
        self.jitter += (d.abs() - self.jitter) / 16.0;
        self.last_rtp_time_rtp = packet.header.timestamp;
        self.last_rtp_time_time = now;
    }

    /// Remembers the peer's last Sender Report so DLSR can be computed.
    pub fn on_sender_report(&mut self, sr: &SenderReport, now: Instant) {
        self.last_sender_report_ntp = (sr.ntp_time >> 16) as u32;
        self.last_sender_report_time = Some(now);
    }

    /// Emits one Receiver Report covering the window since the last call.
    pub fn generate_report(&mut self, now: Instant) -> ReceiverReport {
        let total_since_report = self.last_seq_num.wrapping_sub(self.last_report_seq_num);
        let mut lost_since_report = if self.last_seq_num == self.last_report_seq_num {
            0u32
        } else {
            let mut count = 0u32;
            let mut i = self.last_report_seq_num.wrapping_add(1);
            while i != self.last_seq_num {
                if !self.is_received(i) {
                    count += 1;
                }
                i = i.wrapping_add(1);
            }
            count
        };

        self.total_lost += lost_since_report;
        if lost_since_report > 0xFF_FFFF {
            lost_since_report = 0xFF_FFFF;
        }
        if self.total_lost > 0xFF_FFFF {
            self.total_lost = 0xFF_FFFF;
        }

        let delay = match self.last_sender_report_time {
            Some(t) => (now.duration_since(t).as_secs_f64() * 65536.0) as u32,
            None => 0,
        };

        let fraction_lost = if total_since_report > 0 {
            ((lost_since_report * 256) as f64 / total_since_report as f64) as u8
        } else {
            0
        };

        self.last_report_seq_num = self.last_seq_num;

        ReceiverReport {
            ssrc: self.receiver_ssrc,
            reports: vec![ReceptionReport {
                ssrc: self.ssrc,
                fraction_lost,
                total_lost: self.total_lost,
                last_sequence_number: (self.seq_num_cycles as u32) << 16
                    | (self.last_seq_num as u32),
                jitter: self.jitter as u32,
                last_sender_report: self.last_sender_report_ntp,
                delay,
            }],
            profile_extensions: bytes::Bytes::new(),
        }
    }
}

/// Outbound accounting for one media SSRC we are sending: packet/octet
/// counters and last-RTP-time tracking for Sender Report generation.
pub struct SenderContext {
    ssrc: u32,
    clock_rate: f64,
    last_rtp_time_rtp: u32,
    last_rtp_time_time: Instant,
    packets: u32,
    octets: u32,
}

impl SenderContext {
    pub fn new(ssrc: u32, clock_rate: u32) -> Self {
        Self {
            ssrc,
            clock_rate: clock_rate as f64,
            last_rtp_time_rtp: 0,
            last_rtp_time_time: Instant::now(),
            packets: 0,
            octets: 0,
        }
    }

    pub fn on_rtp(&mut self, packet: &RtpPacket, now: Instant) {
        self.last_rtp_time_rtp = packet.header.timestamp;
        self.last_rtp_time_time = now;
        self.packets = self.packets.wrapping_add(1);
        let len: u32 = match packet.payload.len().try_into() {
            Ok(len) => len,
            Err(_) => {
                warn!("packet payload larger than 32 bits");
                u32::MAX
            }
        };
        self.octets = self.octets.wrapping_add(len);
    }

    pub fn generate_report(&self, clock: &SystemInstant, now: Instant) -> SenderReport {
        let extrapolated_rtp_time = self.last_rtp_time_rtp.wrapping_add(
            (now.duration_since(self.last_rtp_time_time).as_secs_f64() * self.clock_rate) as u32,
        );
        SenderReport {
            ssrc: self.ssrc,
            ntp_time: clock.ntp(now),
            rtp_time: extrapolated_rtp_time,
            packet_count: self.packets,
            octet_count: self.octets,
            reports: Vec::new(),
            profile_extensions: bytes::Bytes::new(),
        }
    }
}

/// Pending-received-list threshold past which a TWCC feedback packet is
/// generated even if [`TWCC_MAX_INTERVAL`] hasn't elapsed yet (§4.5).
const TWCC_PENDING_THRESHOLD: usize = 20;
/// Maximum spacing between TWCC feedback packets when traffic is light.
const TWCC_MAX_INTERVAL: Duration = Duration::from_millis(100);

/// Not-received / small-delta / large-delta status-vector symbols (draft
/// transport-wide-cc §3.1.3).
const TWCC_SYMBOL_NOT_RECEIVED: u8 = 0b00;
const TWCC_SYMBOL_SMALL_DELTA: u8 = 0b01;
const TWCC_SYMBOL_LARGE_DELTA: u8 = 0b10;

/// Receive-delta tick size: 250 microseconds.
const TWCC_DELTA_TICK_US: i64 = 250;
/// Reference-time tick size: 64 milliseconds, stored as a 24-bit signed
/// field.
const TWCC_REFERENCE_TICK_US: i64 = 64_000;

/// Accumulates arrival timestamps for transport-wide-cc sequence numbers
/// pulled off inbound RTP header extensions, and builds outbound
/// `TransportLayerCc` feedback packets on the §4.5 schedule: whenever the
/// pending list crosses [`TWCC_PENDING_THRESHOLD`] or every
/// [`TWCC_MAX_INTERVAL`], whichever comes first.
pub struct TwccRecorder {
    sender_ssrc: u32,
    media_ssrc: u32,
    epoch: Instant,
    pending: Vec<(u16, Instant)>,
    fb_pkt_count: u8,
    last_emit: Option<Instant>,
}

impl TwccRecorder {
    pub fn new(sender_ssrc: u32, media_ssrc: u32, now: Instant) -> Self {
        Self {
            sender_ssrc,
            media_ssrc,
            epoch: now,
            pending: Vec::new(),
            fb_pkt_count: 0,
            last_emit: None,
        }
    }

    pub fn set_media_ssrc(&mut self, media_ssrc: u32) {
        self.media_ssrc = media_ssrc;
    }

    /// Records one transport-wide-cc sequence number's arrival, pulled off
    /// an inbound RTP packet's header extension.
    pub fn record_arrival(&mut self, transport_seq: u16, now: Instant) {
        self.pending.push((transport_seq, now));
    }

    pub fn should_emit(&self, now: Instant) -> bool {
        if self.pending.is_empty() {
            return false;
        }
        self.pending.len() >= TWCC_PENDING_THRESHOLD
            || self
                .last_emit
                .is_none_or(|t| now.duration_since(t) >= TWCC_MAX_INTERVAL)
    }

    /// Builds a `TransportLayerCc` covering every pending arrival and
    /// clears the pending list. Returns `None` if there is nothing to
    /// report.
    pub fn generate(&mut self, now: Instant) -> Option<TransportLayerCc> {
        if self.pending.is_empty() {
            return None;
        }
        let mut entries = std::mem::take(&mut self.pending);
        entries.sort_by_key(|(seq, _)| *seq);
        let by_seq: HashMap<u16, Instant> = entries.iter().copied().collect();

        let base_seq = entries[0].0;
        let last_seq = entries[entries.len() - 1].0;
        let packet_status_count = last_seq.wrapping_sub(base_seq).wrapping_add(1);
        let base_time = entries[0].1;

        let reference_ticks =
            base_time.duration_since(self.epoch).as_micros() as i64 / TWCC_REFERENCE_TICK_US;
        let reference_time = sign_extend_24(reference_ticks);

        let mut symbols = Vec::with_capacity(packet_status_count as usize);
        let mut deltas = BytesMut::new();
        let mut seq = base_seq;
        for _ in 0..packet_status_count {
            match by_seq.get(&seq) {
                Some(arrival) => {
                    let ticks =
                        arrival.duration_since(base_time).as_micros() as i64 / TWCC_DELTA_TICK_US;
                    if (0..=255).contains(&ticks) {
                        symbols.push(TWCC_SYMBOL_SMALL_DELTA);
                        deltas.put_u8(ticks as u8);
                    } else {
                        symbols.push(TWCC_SYMBOL_LARGE_DELTA);
                        deltas.put_i16(ticks.clamp(i16::MIN as i64, i16::MAX as i64) as i16);
                    }
                }
                None => symbols.push(TWCC_SYMBOL_NOT_RECEIVED),
            }
            seq = seq.wrapping_add(1);
        }

        let mut payload = BytesMut::new();
        for chunk in symbols.chunks(7) {
            let mut word: u16 = 0b11 << 14;
            for (i, sym) in chunk.iter().enumerate() {
                word |= (*sym as u16) << (12 - 2 * i);
            }
            payload.put_u16(word);
        }
        payload.unsplit(deltas);

        self.fb_pkt_count = self.fb_pkt_count.wrapping_add(1);
        self.last_emit = Some(now);

        Some(TransportLayerCc {
            sender_ssrc: self.sender_ssrc,
            media_ssrc: self.media_ssrc,
            base_sequence_number: base_seq,
            packet_status_count,
            reference_time,
            fb_pkt_count: self.fb_pkt_count,
            payload: payload.freeze(),
        })
    }
}

fn sign_extend_24(ticks: i64) -> i32 {
    let masked = (ticks & 0x00FF_FFFF) as i32;
    if masked & 0x0080_0000 != 0 {
        masked | !0x00FF_FFFFi32
    } else {
        masked
    }
}

/// Result of dispatching one inbound compound RTCP packet: what the
/// caller (the Stream/Component layer) needs to act on, since this
/// module has no access to the plugin or retransmit buffers itself.
#[derive(Debug, Default)]
pub struct InboundEffects {
    pub nacks: Vec<TransportLayerNack>,
    pub request_keyframe: bool,
    pub remb: Option<ReceiverEstimatedMaxBitrate>,
    pub twcc: Vec<TransportLayerCc>,
    pub goodbye: bool,
}

/// Dispatches one compound RTCP packet's parts into this context and a
/// caller-visible effects list, per the §4.5 routing table. `sr`/`rr`
/// update `receiver`'s DLSR bookkeeping; `sdes`/`bye` are left to the
/// caller since the engine only logs/advisories on them.
pub fn dispatch(receiver: &mut ReceiverContext, now: Instant, packets: &[Packet]) -> InboundEffects {
    let mut effects = InboundEffects::default();
    for packet in packets {
        match packet {
            Packet::SenderReport(sr) => receiver.on_sender_report(sr, now),
            Packet::ReceiverReport(_rr) => {}
            Packet::SourceDescription(_sdes) => {}
            Packet::Goodbye(_bye) => effects.goodbye = true,
            Packet::PictureLossIndication(_pli) => effects.request_keyframe = true,
            Packet::FullIntraRequest(_fir) => effects.request_keyframe = true,
            Packet::ReceiverEstimatedMaxBitrate(remb) => effects.remb = Some(remb.clone()),
            Packet::TransportLayerNack(nack) => effects.nacks.push(nack.clone()),
            Packet::TransportLayerCc(cc) => effects.twcc.push(cc.clone()),
        }
    }
    effects
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use rtc_rtcp::goodbye::Goodbye;
    use rtc_rtcp::payload_feedbacks::picture_loss_indication::PictureLossIndication;
    use rtc_rtp::Header;
    use std::time::Duration;

    fn rtp(seq: u16, ts: u32) -> RtpPacket {
        RtpPacket {
            header: Header {
                sequence_number: seq,
                timestamp: ts,
                ssrc: 1,
                ..Header::default()
            },
            payload: Bytes::from_static(&[0u8; 160]),
        }
    }

    #[test]
    fn receiver_report_tracks_gaps_as_lost() {
        let mut ctx = ReceiverContext::new(0xAAAA, 8000);
        let now = Instant::now();
        ctx.on_rtp(&rtp(0, 0), now);
        ctx.on_rtp(&rtp(1, 160), now + Duration::from_millis(20));
        ctx.on_rtp(&rtp(3, 480), now + Duration::from_millis(60)); // skip 2

        let rr = ctx.generate_report(now + Duration::from_millis(60));
        assert_eq!(rr.reports.len(), 1);
        assert_eq!(rr.reports[0].total_lost, 1);
        assert!(rr.reports[0].fraction_lost > 0);
    }

    #[test]
    fn receiver_report_is_clean_with_no_loss() {
        let mut ctx = ReceiverContext::new(0xAAAA, 8000);
        let now = Instant::now();
        for i in 0..5u16 {
            ctx.on_rtp(&rtp(i, i as u32 * 160), now + Duration::from_millis(i as u64 * 20));
        }
        let rr = ctx.generate_report(now + Duration::from_millis(100));
        assert_eq!(rr.reports[0].total_lost, 0);
        assert_eq!(rr.reports[0].fraction_lost, 0);
    }

    #[test]
    fn sender_context_counts_packets_and_octets() {
        let mut ctx = SenderContext::new(0xBEEF, 90_000);
        let now = Instant::now();
        ctx.on_rtp(&rtp(1, 0), now);
        ctx.on_rtp(&rtp(2, 3000), now + Duration::from_millis(33));
        let clock = SystemInstant::now();
        let sr = ctx.generate_report(&clock, now + Duration::from_millis(33));
        assert_eq!(sr.packet_count, 2);
        assert_eq!(sr.octet_count, 320);
        assert_eq!(sr.ssrc, 0xBEEF);
    }

    #[test]
    fn dispatch_routes_pli_and_nack_and_bye() {
        let mut receiver = ReceiverContext::new(1, 90_000);
        let now = Instant::now();
        let packets = vec![
            Packet::PictureLossIndication(PictureLossIndication {
                sender_ssrc: 1,
                media_ssrc: 2,
            }),
            Packet::TransportLayerNack(TransportLayerNack {
                sender_ssrc: 1,
                media_ssrc: 2,
                nacks: vec![],
            }),
            Packet::Goodbye(Goodbye {
                sources: vec![2],
                reason: Bytes::new(),
            }),
        ];
        let effects = dispatch(&mut receiver, now, &packets);
        assert!(effects.request_keyframe);
        assert_eq!(effects.nacks.len(), 1);
        assert!(effects.goodbye);
    }

    #[test]
    fn twcc_recorder_waits_for_threshold_or_interval() {
        let now = Instant::now();
        let mut recorder = TwccRecorder::new(0xAAAA, 0xBBBB, now);
        assert!(!recorder.should_emit(now));

        recorder.record_arrival(100, now + Duration::from_millis(1));
        assert!(!recorder.should_emit(now + Duration::from_millis(2)));
        assert!(recorder.should_emit(now + Duration::from_millis(101)));

        for i in 0..TWCC_PENDING_THRESHOLD as u16 {
            recorder.record_arrival(200 + i, now + Duration::from_millis(5));
        }
        assert!(recorder.should_emit(now + Duration::from_millis(5)));
    }

    #[test]
    fn twcc_recorder_generates_feedback_covering_the_full_span() {
        let now = Instant::now();
        let mut recorder = TwccRecorder::new(0xAAAA, 0xBBBB, now);
        recorder.record_arrival(10, now + Duration::from_millis(1));
        recorder.record_arrival(11, now + Duration::from_millis(5));
        // seq 12 missing
        recorder.record_arrival(13, now + Duration::from_millis(12));

        let cc = recorder.generate(now + Duration::from_millis(12)).unwrap();
        assert_eq!(cc.sender_ssrc, 0xAAAA);
        assert_eq!(cc.media_ssrc, 0xBBBB);
        assert_eq!(cc.base_sequence_number, 10);
        assert_eq!(cc.packet_status_count, 4);
        assert_eq!(cc.fb_pkt_count, 1);
        assert!(!cc.payload.is_empty());
        assert!(recorder.generate(now).is_none());
    }
}

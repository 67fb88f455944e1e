//! Wires the send/receive worker loops in `scheduler.rs` to the per-lane
//! rewrite, retransmit, RTCP accounting and SRTP state in `model.rs`
//! (§4.7, §4.8). `scheduler::run_send_worker` calls [`encode_outbound`]
//! before it ever touches a `PacketSink`; a transport driver calls
//! [`receive_datagram`] for each inbound datagram it demultiplexes to
//! this handle, and [`retransmit`] for each inbound NACK it wants
//! resolved.

use crate::model::{Handle, MediaDirection, Outbound, Stream};
use crate::retransmit::{resolve_nack_pairs, strip_rtx_osn, NackWindow};
use crate::rtcp_context::InboundEffects;
use crate::scheduler::{classify, DemuxClass};
use crate::srtp::SrtpContext;
use rtc_rtcp::transport_feedbacks::transport_layer_nack::TransportLayerNack;
use rtc_rtcp::Packet as RtcpPacket;
use rtc_rtp::extension::HeaderExtension;
use rtc_rtp::header::Header;
use rtc_rtp::Packet as RtpPacket;
use rtc_shared::error::Result;
use std::time::Instant;

/// Runs one queued [`Outbound`] item through rewrite/RTX-buffering/SRTP
/// and returns the wire bytes ready for [`crate::scheduler::PacketSink`].
pub fn encode_outbound(
    handle: &Handle,
    srtp: &mut dyn SrtpContext,
    item: Outbound,
) -> Result<Vec<u8>> {
    match item {
        Outbound::Rtp { is_video, mut packet } => {
            let now = Instant::now();
            let mut stream = handle.stream.lock()?;
            let component = stream.component.clone();
            let lane = stream.lane_mut(is_video);

            lane.rewrite.update(&mut packet.header, now);
            let ssrc = packet.header.ssrc;
            let clock_rate = lane.rewrite.clock_rate.unwrap_or(90_000);
            lane.sender_rtcp
                .get_or_insert_with(|| crate::rtcp_context::SenderContext::new(ssrc, clock_rate))
                .on_rtp(&packet, now);

            let mut guard = component.lock()?;
            guard
                .send_buffers
                .entry(ssrc)
                .or_insert_with(|| crate::retransmit::SendBuffer::new(300))
                .push(packet.clone());
            drop(guard);
            drop(stream);

            let marshaled = packet.marshal()?;
            let mut wire = marshaled.to_vec();
            srtp.encrypt_rtp(&mut wire)?;
            Ok(wire)
        }
        Outbound::Rtcp { packets } => {
            let marshaled = RtcpPacket::marshal_many(&packets)?;
            let mut wire = marshaled.to_vec();
            srtp.encrypt_rtcp(&mut wire)?;
            Ok(wire)
        }
        Outbound::Data { payload } => Ok(payload),
    }
}

/// Resolves one inbound NACK against the owning lane's send buffer,
/// rtx-wraps each hit if rtx is negotiated for the lane, and re-enqueues
/// the retransmissions onto the handle's send queue (§4.4). Returns how
/// many packets were retransmitted.
pub fn retransmit(handle: &Handle, nack: &TransportLayerNack) -> Result<usize> {
    let mut stream = handle.stream.lock()?;
    let component = stream.component.clone();
    let Some((lane, is_video)) = stream.lane_for_ssrc(nack.media_ssrc) else {
        return Ok(0);
    };

    let resolved: Vec<RtpPacket> = {
        let guard = component.lock()?;
        match guard.send_buffers.get(&nack.media_ssrc) {
            Some(buffer) => resolve_nack_pairs(buffer, &nack.nacks)
                .into_iter()
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    };

    let wrapped: Vec<RtpPacket> = match lane.rtx_wrapper.as_mut() {
        Some(wrapper) => resolved.iter().map(|p| wrapper.wrap(p)).collect(),
        None => resolved,
    };
    drop(stream);

    let mut sent = 0;
    for packet in wrapped {
        handle.enqueue(Outbound::Rtp { is_video, packet })?;
        sent += 1;
    }
    Ok(sent)
}

/// Outcome of [`receive_datagram`] for the caller (signaling/plugin layer)
/// to act on: a demuxed RTP packet plus any sequence numbers newly due
/// for a NACK, a dispatched RTCP compound packet's effects, a
/// non-media datagram to route elsewhere, or a packet dropped because
/// the skew compensator judged the sender running too far ahead.
pub enum InboundOutcome {
    Rtp {
        is_video: bool,
        packet: RtpPacket,
        nack_seqs: Vec<u16>,
    },
    Rtcp(InboundEffects),
    NonMedia(DemuxClass),
    Dropped,
}

/// Extracts the transport-wide-cc sequence number from an RTP header's
/// extensions, if the lane has one registered (§4.5).
fn lane_twcc_sequence(extensions: &rtc_rtp::extension::ExtensionMap, header: &Header) -> Option<u16> {
    let elements = extensions.elements(header).ok()?;
    for (id, payload) in elements {
        if extensions.get(id) == Some(HeaderExtension::TransportWideCc) && payload.len() >= 2 {
            return Some(u16::from_be_bytes([payload[0], payload[1]]));
        }
    }
    None
}

/// Classifies, decrypts and unmarshals one inbound datagram on `stream`,
/// driving the owning lane's RTCP accounting, skew compensator and
/// NACK window along the way (§4.8).
pub fn receive_datagram(
    stream: &mut Stream,
    srtp: &mut dyn SrtpContext,
    is_video: bool,
    datagram: &mut [u8],
    now: Instant,
) -> Result<InboundOutcome> {
    let component = stream.component.clone();
    match classify(datagram) {
        DemuxClass::Srtp => {
            let len = srtp.decrypt_rtp(datagram)?;
            let mut packet = RtpPacket::unmarshal(&datagram[..len])?;

            {
                let guard = component.lock()?;
                if guard
                    .rtx_payload_types
                    .contains_key(&packet.header.payload_type)
                {
                    if let Some((osn, base_payload)) = strip_rtx_osn(&packet.payload) {
                        let base_pt = guard.rtx_payload_types.get(&packet.header.payload_type).copied();
                        packet.payload = base_payload;
                        packet.header.sequence_number = osn;
                        if let Some(base_pt) = base_pt {
                            packet.header.payload_type = base_pt;
                        }
                    }
                }
            }

            let lane = stream.lane_mut(is_video);
            lane.receiver_rtcp.on_rtp(&packet, now);
            if lane.skew.observe(packet.header.timestamp, now) < 0 {
                return Ok(InboundOutcome::Dropped);
            }
            let twcc_seq = lane_twcc_sequence(&lane.extensions, &packet.header);

            let mut guard = component.lock()?;
            if let Some(seq) = twcc_seq {
                guard.twcc.set_media_ssrc(packet.header.ssrc);
                guard.twcc.record_arrival(seq, now);
            }
            let window = guard
                .nack_windows
                .entry(packet.header.ssrc)
                .or_insert_with(NackWindow::new);
            window.receive(packet.header.sequence_number, now);
            let nack_seqs = window.tick(now);
            guard.stats.record_packet(packet.payload.len(), now);

            Ok(InboundOutcome::Rtp {
                is_video,
                packet,
                nack_seqs,
            })
        }
        DemuxClass::Srtcp => {
            let len = srtp.decrypt_rtcp(datagram)?;
            let packets = RtcpPacket::unmarshal(&datagram[..len])?;
            let lane = stream.lane_mut(is_video);
            let effects = crate::rtcp_context::dispatch(&mut lane.receiver_rtcp, now, &packets);
            Ok(InboundOutcome::Rtcp(effects))
        }
        other => Ok(InboundOutcome::NonMedia(other)),
    }
}

/// Whether a lane's negotiated direction permits sending media (§3
/// "direction flags").
pub fn can_send(direction: MediaDirection) -> bool {
    direction.contains(MediaDirection::SEND)
}

/// Whether a lane's negotiated direction permits receiving media.
pub fn can_recv(direction: MediaDirection) -> bool {
    direction.contains(MediaDirection::RECV)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtls::SrtpKeys;
    use bytes::Bytes;
    use std::sync::atomic::AtomicBool;
    use std::sync::mpsc::Receiver;
    use std::sync::{Arc, Mutex};

    struct PassthroughSrtp;

    impl SrtpContext for PassthroughSrtp {
        fn new_from_keys(_keys: &SrtpKeys) -> Self {
            PassthroughSrtp
        }
        fn decrypt_rtp(&mut self, packet: &mut [u8]) -> Result<usize> {
            Ok(packet.len())
        }
        fn decrypt_rtcp(&mut self, packet: &mut [u8]) -> Result<usize> {
            Ok(packet.len())
        }
        fn encrypt_rtp(&mut self, packet: &mut Vec<u8>) -> Result<usize> {
            Ok(packet.len())
        }
        fn encrypt_rtcp(&mut self, packet: &mut Vec<u8>) -> Result<usize> {
            Ok(packet.len())
        }
    }

    fn make_handle() -> (Arc<Handle>, Receiver<Outbound>) {
        let (tx, rx) = crate::model::new_handle_channel();
        let handle = Arc::new(Handle {
            id: 1,
            session_id: 1,
            plugin_name: None,
            plugin_cookie: None,
            correlator: None,
            created_at: Instant::now(),
            flags: Mutex::new(crate::state::StateFlags::empty()),
            local_sdp: Mutex::new(None),
            remote_sdp: Mutex::new(None),
            hangup_reason: Mutex::new(None),
            stream: Mutex::new(Stream::new(Instant::now())),
            send_tx: tx,
            stop: Arc::new(AtomicBool::new(false)),
        });
        (handle, rx)
    }

    fn rtp_packet(seq: u16, ts: u32, ssrc: u32) -> RtpPacket {
        RtpPacket {
            header: Header {
                sequence_number: seq,
                timestamp: ts,
                ssrc,
                payload_type: 96,
                ..Header::default()
            },
            payload: Bytes::from_static(&[0xAA; 16]),
        }
    }

    #[test]
    fn encode_outbound_rewrites_and_buffers_for_retransmit() {
        let (handle, _rx) = make_handle();
        let mut srtp = PassthroughSrtp;

        let wire = encode_outbound(
            &handle,
            &mut srtp,
            Outbound::Rtp {
                is_video: false,
                packet: rtp_packet(100, 1000, 0xAAA),
            },
        )
        .unwrap();
        assert!(!wire.is_empty());

        let stream = handle.stream.lock().unwrap();
        let component = stream.component.lock().unwrap();
        assert!(component.send_buffers.get(&0xAAA).unwrap().get(100).is_some());
    }

    #[test]
    fn retransmit_wraps_and_enqueues_rtx_packet() {
        let (handle, rx) = make_handle();
        {
            let mut stream = handle.stream.lock().unwrap();
            let ssrc = 0xAAA;
            {
                let lane = stream.lane_mut(false);
                lane.ssrc = Some(ssrc);
                lane.rtx_ssrc = Some(0xFEED);
                lane.rtx_payload_type = Some(99);
                lane.rtx_wrapper = Some(crate::retransmit::RtxWrapper::new(0xFEED, 99));
            }
            let component = stream.component.clone();
            let mut guard = component.lock().unwrap();
            guard
                .send_buffers
                .entry(ssrc)
                .or_insert_with(|| crate::retransmit::SendBuffer::new(300))
                .push(rtp_packet(42, 1000, ssrc));
        }

        let nack = TransportLayerNack {
            sender_ssrc: 1,
            media_ssrc: 0xAAA,
            nacks: vec![rtc_rtcp::transport_feedbacks::transport_layer_nack::NackPair {
                packet_id: 42,
                lost_packets: 0,
            }],
        };
        let sent = retransmit(&handle, &nack).unwrap();
        assert_eq!(sent, 1);

        match rx.recv().unwrap() {
            Outbound::Rtp { packet, is_video } => {
                assert!(!is_video);
                assert_eq!(packet.header.ssrc, 0xFEED);
                assert_eq!(packet.header.payload_type, 99);
            }
            _ => panic!("expected rtp"),
        }
    }

    #[test]
    fn receive_datagram_tracks_loss_on_a_sequence_gap() {
        let mut stream = Stream::new(Instant::now());
        let mut srtp = PassthroughSrtp;
        let now = Instant::now();

        for seq in [10u16, 11, 13] {
            let mut wire = RtpPacket {
                header: Header {
                    sequence_number: seq,
                    timestamp: seq as u32 * 160,
                    ssrc: 0xAAA,
                    payload_type: 96,
                    ..Header::default()
                },
                payload: Bytes::from_static(&[0u8; 32]),
            }
            .marshal()
            .unwrap()
            .to_vec();

            match receive_datagram(&mut stream, &mut srtp, false, &mut wire, now).unwrap() {
                InboundOutcome::Rtp { packet, .. } => assert_eq!(packet.header.sequence_number, seq),
                _ => panic!("expected rtp"),
            }
        }

        let component = stream.component.lock().unwrap();
        assert!(component.nack_windows.contains_key(&0xAAA));
    }
}

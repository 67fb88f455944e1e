use crate::header::{FORMAT_TCC, Header, PacketType};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use rtc_shared::error::{Error, Result};

const BASE_LENGTH: usize = 8 + 8;

/// Transport-Wide Congestion Control feedback
/// (draft-holmer-rmcat-transport-wide-cc-extensions-01).
///
/// The engine relays TWCC to the bandwidth-estimation plugin rather than
/// decoding per-packet status symbols itself, so `packet_chunks` and
/// `recv_deltas` are kept as opaque wire bytes; only the fields needed to
/// validate and route the packet (base sequence, packet count, reference
/// time, feedback packet count) are parsed structurally.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportLayerCc {
    pub sender_ssrc: u32,
    pub media_ssrc: u32,
    pub base_sequence_number: u16,
    pub packet_status_count: u16,
    /// 24-bit reference time in 64ms multiples, sign-extended.
    pub reference_time: i32,
    pub fb_pkt_count: u8,
    /// Packet status chunks and receive deltas, verbatim.
    pub payload: Bytes,
}

impl TransportLayerCc {
    pub fn marshal_size(&self) -> usize {
        crate::header::HEADER_LENGTH + BASE_LENGTH + self.payload.len()
    }

    pub fn header(&self) -> Header {
        Header {
            padding: false,
            count: FORMAT_TCC,
            packet_type: PacketType::TransportSpecificFeedback,
            length: (self.marshal_size() / 4 - 1) as u16,
        }
    }

    pub fn marshal_to(&self, buf: &mut BytesMut) -> Result<()> {
        self.header().marshal_to(buf)?;
        buf.put_u32(self.sender_ssrc);
        buf.put_u32(self.media_ssrc);
        buf.put_u16(self.base_sequence_number);
        buf.put_u16(self.packet_status_count);
        let reference_time = (self.reference_time as u32) & 0x00FF_FFFF;
        buf.put_uint(reference_time as u64, 3);
        buf.put_u8(self.fb_pkt_count);
        buf.extend_from_slice(&self.payload);
        Ok(())
    }

    pub fn marshal(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.marshal_size());
        self.marshal_to(&mut buf)?;
        Ok(buf.freeze())
    }

    pub fn unmarshal(raw: &[u8]) -> Result<Self> {
        let (header, rest) = Header::unmarshal(raw)?;
        if header.packet_type != PacketType::TransportSpecificFeedback
            || header.count != FORMAT_TCC
        {
            return Err(Error::MalformedPacket("expected TWCC packet type/format"));
        }
        if rest.len() < BASE_LENGTH {
            return Err(Error::MalformedPacket("TWCC body truncated"));
        }
        let mut buf = rest;
        let sender_ssrc = buf.get_u32();
        let media_ssrc = buf.get_u32();
        let base_sequence_number = buf.get_u16();
        let packet_status_count = buf.get_u16();
        let raw_reference_time = buf.get_uint(3) as u32;
        let reference_time = sign_extend_24(raw_reference_time);
        let fb_pkt_count = buf.get_u8();
        let payload = Bytes::copy_from_slice(buf);

        Ok(TransportLayerCc {
            sender_ssrc,
            media_ssrc,
            base_sequence_number,
            packet_status_count,
            reference_time,
            fb_pkt_count,
            payload,
        })
    }
}

fn sign_extend_24(value: u32) -> i32 {
    let shifted = value << 8;
    (shifted as i32) >> 8
}

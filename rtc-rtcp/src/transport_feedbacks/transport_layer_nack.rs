use crate::header::{FORMAT_TLN, Header, PacketType};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use rtc_shared::error::{Error, Result};

const NACK_PAIR_LENGTH: usize = 4;

/// One NACK pair: a base packet id plus a bitmask of up to 16 additional
/// packets immediately following it that are also reported lost
/// (RFC 4585 §6.2.1).
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |            PID               |             BLP               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NackPair {
    pub packet_id: u16,
    pub lost_packets: u16,
}

impl NackPair {
    /// Sequence numbers covered by this pair: the base PID, plus each bit
    /// position in BLP set for `PID + 1 + bit`.
    pub fn packet_list(&self) -> Vec<u16> {
        let mut out = vec![self.packet_id];
        for bit in 0..16u16 {
            if self.lost_packets & (1 << bit) != 0 {
                out.push(self.packet_id.wrapping_add(bit + 1));
            }
        }
        out
    }
}

/// Builds the minimal set of NACK pairs covering every sequence number in
/// `sequence_numbers`. Input need not be sorted or deduplicated.
pub fn nack_pairs_from_sequence_numbers(sequence_numbers: &[u16]) -> Vec<NackPair> {
    let mut sorted = sequence_numbers.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut pairs = Vec::new();
    let mut iter = sorted.into_iter();
    let Some(mut base) = iter.next() else {
        return pairs;
    };
    let mut blp: u16 = 0;

    for seq in iter {
        let offset = seq.wrapping_sub(base);
        if offset >= 1 && offset <= 16 {
            blp |= 1 << (offset - 1);
        } else {
            pairs.push(NackPair {
                packet_id: base,
                lost_packets: blp,
            });
            base = seq;
            blp = 0;
        }
    }
    pairs.push(NackPair {
        packet_id: base,
        lost_packets: blp,
    });
    pairs
}

/// Generic NACK: requests retransmission of specific RTP packets by
/// sequence number, without waiting for the sender's regular RR cadence
/// (RFC 4585 §6.2.1).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportLayerNack {
    pub sender_ssrc: u32,
    pub media_ssrc: u32,
    pub nacks: Vec<NackPair>,
}

impl TransportLayerNack {
    pub fn marshal_size(&self) -> usize {
        crate::header::HEADER_LENGTH + 8 + self.nacks.len() * NACK_PAIR_LENGTH
    }

    pub fn header(&self) -> Header {
        Header {
            padding: false,
            count: FORMAT_TLN,
            packet_type: PacketType::TransportSpecificFeedback,
            length: (self.marshal_size() / 4 - 1) as u16,
        }
    }

    pub fn marshal_to(&self, buf: &mut BytesMut) -> Result<()> {
        self.header().marshal_to(buf)?;
        buf.put_u32(self.sender_ssrc);
        buf.put_u32(self.media_ssrc);
        for pair in &self.nacks {
            buf.put_u16(pair.packet_id);
            buf.put_u16(pair.lost_packets);
        }
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
            || header.count != FORMAT_TLN
        {
            return Err(Error::MalformedPacket("expected NACK packet type/format"));
        }
        if rest.len() < 8 {
            return Err(Error::MalformedPacket("NACK body truncated"));
        }
        let mut buf = rest;
        let sender_ssrc = buf.get_u32();
        let media_ssrc = buf.get_u32();

        let mut nacks = Vec::new();
        while buf.remaining() >= NACK_PAIR_LENGTH {
            nacks.push(NackPair {
                packet_id: buf.get_u16(),
                lost_packets: buf.get_u16(),
            });
        }

        Ok(TransportLayerNack {
            sender_ssrc,
            media_ssrc,
            nacks,
        })
    }
}

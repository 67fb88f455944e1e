use bytes::{Buf, BufMut};
use rtc_shared::error::{Error, Result};

pub const HEADER_LENGTH: usize = 4;
const VERSION_SHIFT: u8 = 6;
const VERSION_MASK: u8 = 0x3;
const PADDING_SHIFT: u8 = 5;
const PADDING_MASK: u8 = 0x1;
const COUNT_MASK: u8 = 0x1F;

pub const RTCP_VERSION: u8 = 2;

/// RTCP packet type, RFC 3550 §12.1 plus the feedback types from RFC 4585.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PacketType {
    SenderReport,
    ReceiverReport,
    SourceDescription,
    Goodbye,
    ApplicationDefined,
    TransportSpecificFeedback,
    PayloadSpecificFeedback,
    ExtendedReport,
    Unsupported(u8),
}

impl PacketType {
    pub fn value(&self) -> u8 {
        match self {
            PacketType::SenderReport => 200,
            PacketType::ReceiverReport => 201,
            PacketType::SourceDescription => 202,
            PacketType::Goodbye => 203,
            PacketType::ApplicationDefined => 204,
            PacketType::TransportSpecificFeedback => 205,
            PacketType::PayloadSpecificFeedback => 206,
            PacketType::ExtendedReport => 207,
            PacketType::Unsupported(v) => *v,
        }
    }
}

impl From<u8> for PacketType {
    fn from(v: u8) -> Self {
        match v {
            200 => PacketType::SenderReport,
            201 => PacketType::ReceiverReport,
            202 => PacketType::SourceDescription,
            203 => PacketType::Goodbye,
            204 => PacketType::ApplicationDefined,
            205 => PacketType::TransportSpecificFeedback,
            206 => PacketType::PayloadSpecificFeedback,
            207 => PacketType::ExtendedReport,
            other => PacketType::Unsupported(other),
        }
    }
}

/// Transport-layer feedback message subtype carried in the header's count
/// field when `packet_type` is `TransportSpecificFeedback` (RFC 4585 §6.2).
pub const FORMAT_TLN: u8 = 1;
/// Payload-specific feedback subtype: Picture Loss Indication (RFC 4585 §6.3.1).
pub const FORMAT_PLI: u8 = 1;
/// Payload-specific feedback subtype: Full Intra Request (RFC 5104 §4.3.1).
pub const FORMAT_FIR: u8 = 4;
/// Payload-specific feedback subtype: applications-defined REMB (draft-alvestrand).
pub const FORMAT_REMB: u8 = 15;
/// Transport-layer feedback subtype: transport-wide congestion control.
pub const FORMAT_TCC: u8 = 15;

/// Common 4-byte RTCP header prefixing every packet.
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|   RC/FMT  |      PT       |             length            |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub padding: bool,
    /// Reception-report count, SDES chunk count, or feedback message
    /// format (FMT), depending on `packet_type`.
    pub count: u8,
    pub packet_type: PacketType,
    /// Length of this packet in 32-bit words minus one, including the
    /// header itself.
    pub length: u16,
}

impl Header {
    pub fn unmarshal(raw: &[u8]) -> Result<(Self, &[u8])> {
        if raw.len() < HEADER_LENGTH {
            return Err(Error::MalformedPacket("rtcp header shorter than 4 bytes"));
        }
        let first_byte = raw[0];
        let version = (first_byte >> VERSION_SHIFT) & VERSION_MASK;
        if version != RTCP_VERSION {
            return Err(Error::MalformedPacket("rtcp version is not 2"));
        }
        let padding = (first_byte >> PADDING_SHIFT) & PADDING_MASK != 0;
        let count = first_byte & COUNT_MASK;
        let packet_type = PacketType::from(raw[1]);
        let mut rest = &raw[2..];
        let length = rest.get_u16();
        Ok((
            Header {
                padding,
                count,
                packet_type,
                length,
            },
            &raw[HEADER_LENGTH..],
        ))
    }

    pub fn marshal_to(&self, buf: &mut bytes::BytesMut) -> Result<()> {
        if self.count > COUNT_MASK {
            return Err(Error::MalformedPacket(
                "rtcp header count/format exceeds 5 bits",
            ));
        }
        let mut first_byte = RTCP_VERSION << VERSION_SHIFT;
        if self.padding {
            first_byte |= 1 << PADDING_SHIFT;
        }
        first_byte |= self.count & COUNT_MASK;
        buf.put_u8(first_byte);
        buf.put_u8(self.packet_type.value());
        buf.put_u16(self.length);
        Ok(())
    }
}

/// Number of bytes of RFC 3550 §6.4.1 padding needed to round `len` up to
/// a multiple of 4.
pub fn padding_for(len: usize) -> usize {
    (4 - (len % 4)) % 4
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn roundtrips_header() {
        let header = Header {
            padding: false,
            count: 1,
            packet_type: PacketType::SenderReport,
            length: 6,
        };
        let mut buf = BytesMut::new();
        header.marshal_to(&mut buf).unwrap();
        let (parsed, rest) = Header::unmarshal(&buf).unwrap();
        assert_eq!(parsed, header);
        assert!(rest.is_empty());
    }

    #[test]
    fn padding_rounds_to_word() {
        assert_eq!(padding_for(4), 0);
        assert_eq!(padding_for(5), 3);
        assert_eq!(padding_for(6), 2);
    }
}

use crate::header::Header;
use bytes::{Bytes, BytesMut};
use rtc_shared::error::{Error, Result};

/// A parsed RTP packet: fixed header plus media payload, with any RFC 3550
/// trailing padding already trimmed off.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Packet {
    pub header: Header,
    pub payload: Bytes,
}

impl Packet {
    pub fn unmarshal(raw: &[u8]) -> Result<Self> {
        let header = Header::unmarshal(raw)?;
        let payload_offset = header.marshal_size();
        if raw.len() < payload_offset {
            return Err(Error::MalformedPacket("rtp packet shorter than header"));
        }
        let mut payload = &raw[payload_offset..];

        if header.padding {
            let pad_len = *payload
                .last()
                .ok_or(Error::MalformedPacket("rtp padding bit set, no payload"))?
                as usize;
            if pad_len == 0 || pad_len > payload.len() {
                return Err(Error::MalformedPacket("rtp padding length out of range"));
            }
            payload = &payload[..payload.len() - pad_len];
        }

        Ok(Packet {
            header,
            payload: Bytes::copy_from_slice(payload),
        })
    }

    pub fn marshal_size(&self) -> usize {
        self.header.marshal_size() + self.payload.len()
    }

    pub fn marshal(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.marshal_size());
        self.header.marshal_to(&mut buf)?;
        buf.extend_from_slice(&self.payload);
        Ok(buf.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_header_and_payload() {
        let raw = [
            0x80, 0x60, 0x00, 0x01, 0x00, 0x00, 0x03, 0xE8, 0xDE, 0xAD, 0xBE, 0xEF, 0xAA, 0xBB,
        ];
        let packet = Packet::unmarshal(&raw).unwrap();
        assert_eq!(packet.header.sequence_number, 1);
        assert_eq!(&packet.payload[..], &[0xAA, 0xBB]);
    }

    #[test]
    fn trims_trailing_padding() {
        let mut header = Header {
            padding: true,
            payload_type: 96,
            sequence_number: 7,
            timestamp: 1,
            ssrc: 1,
            ..Header::default()
        };
        header.padding = true;
        let packet = Packet {
            header,
            payload: Bytes::from_static(&[0x01, 0x02, 0x03, 0x00, 0x00, 0x03]),
        };
        let raw = packet.marshal().unwrap();
        let parsed = Packet::unmarshal(&raw).unwrap();
        assert_eq!(&parsed.payload[..], &[0x01, 0x02, 0x03]);
    }

    #[test]
    fn rejects_zero_padding_length() {
        let raw = [
            0xA0, 0x60, 0x00, 0x01, 0x00, 0x00, 0x03, 0xE8, 0xDE, 0xAD, 0xBE, 0xEF, 0x00,
        ];
        assert!(Packet::unmarshal(&raw).is_err());
    }
}

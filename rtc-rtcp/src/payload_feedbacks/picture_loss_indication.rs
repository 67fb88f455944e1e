use crate::header::{FORMAT_PLI, Header, PacketType};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use rtc_shared::error::{Error, Result};

const BODY_LENGTH: usize = 8;

/// Picture Loss Indication: asks an encoder for a new key frame after a
/// decoder loses synchronization (RFC 4585 §6.3.1).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PictureLossIndication {
    pub sender_ssrc: u32,
    pub media_ssrc: u32,
}

impl PictureLossIndication {
    pub fn marshal_size(&self) -> usize {
        crate::header::HEADER_LENGTH + BODY_LENGTH
    }

    pub fn header(&self) -> Header {
        Header {
            padding: false,
            count: FORMAT_PLI,
            packet_type: PacketType::PayloadSpecificFeedback,
            length: (self.marshal_size() / 4 - 1) as u16,
        }
    }

    pub fn marshal_to(&self, buf: &mut BytesMut) -> Result<()> {
        self.header().marshal_to(buf)?;
        buf.put_u32(self.sender_ssrc);
        buf.put_u32(self.media_ssrc);
        Ok(())
    }

    pub fn marshal(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.marshal_size());
        self.marshal_to(&mut buf)?;
        Ok(buf.freeze())
    }

    pub fn unmarshal(raw: &[u8]) -> Result<Self> {
        let (header, rest) = Header::unmarshal(raw)?;
        if header.packet_type != PacketType::PayloadSpecificFeedback || header.count != FORMAT_PLI
        {
            return Err(Error::MalformedPacket("expected PLI packet type/format"));
        }
        if rest.len() < BODY_LENGTH {
            return Err(Error::MalformedPacket("PLI body truncated"));
        }
        let mut buf = rest;
        Ok(PictureLossIndication {
            sender_ssrc: buf.get_u32(),
            media_ssrc: buf.get_u32(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_pli() {
        let pli = PictureLossIndication {
            sender_ssrc: 0x902f9e2e,
            media_ssrc: 0xbc5e9a40,
        };
        let raw = pli.marshal().unwrap();
        assert_eq!(PictureLossIndication::unmarshal(&raw).unwrap(), pli);
    }
}

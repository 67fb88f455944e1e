use crate::header::{FORMAT_FIR, Header, PacketType};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use rtc_shared::error::{Error, Result};

/// One FIR entry: the SSRC being asked for a key frame and a sequence
/// number incremented on each new FIR so retransmitted requests collapse
/// on the receiving side (RFC 5104 §4.3.1).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FirEntry {
    pub ssrc: u32,
    pub sequence_number: u8,
}

const ENTRY_LENGTH: usize = 8;

/// Full Intra Request: like PLI, but addresses a specific SSRC in
/// multi-source sessions and carries a dedup sequence number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FullIntraRequest {
    pub sender_ssrc: u32,
    pub media_ssrc: u32,
    pub fir: Vec<FirEntry>,
}

impl FullIntraRequest {
    pub fn marshal_size(&self) -> usize {
        crate::header::HEADER_LENGTH + 8 + self.fir.len() * ENTRY_LENGTH
    }

    pub fn header(&self) -> Header {
        Header {
            padding: false,
            count: FORMAT_FIR,
            packet_type: PacketType::PayloadSpecificFeedback,
            length: (self.marshal_size() / 4 - 1) as u16,
        }
    }

    pub fn marshal_to(&self, buf: &mut BytesMut) -> Result<()> {
        self.header().marshal_to(buf)?;
        buf.put_u32(self.sender_ssrc);
        buf.put_u32(self.media_ssrc);
        for entry in &self.fir {
            buf.put_u32(entry.ssrc);
            buf.put_u8(entry.sequence_number);
            buf.put_u8(0);
            buf.put_u16(0);
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
        if header.packet_type != PacketType::PayloadSpecificFeedback || header.count != FORMAT_FIR
        {
            return Err(Error::MalformedPacket("expected FIR packet type/format"));
        }
        if rest.len() < 8 {
            return Err(Error::MalformedPacket("FIR body truncated"));
        }
        let mut buf = rest;
        let sender_ssrc = buf.get_u32();
        let media_ssrc = buf.get_u32();

        let mut fir = Vec::new();
        while buf.remaining() >= ENTRY_LENGTH {
            let ssrc = buf.get_u32();
            let sequence_number = buf.get_u8();
            buf.advance(3);
            fir.push(FirEntry {
                ssrc,
                sequence_number,
            });
        }

        Ok(FullIntraRequest {
            sender_ssrc,
            media_ssrc,
            fir,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_fir_with_entries() {
        let fir = FullIntraRequest {
            sender_ssrc: 1,
            media_ssrc: 2,
            fir: vec![
                FirEntry {
                    ssrc: 3,
                    sequence_number: 1,
                },
                FirEntry {
                    ssrc: 4,
                    sequence_number: 2,
                },
            ],
        };
        let raw = fir.marshal().unwrap();
        assert_eq!(FullIntraRequest::unmarshal(&raw).unwrap(), fir);
    }
}

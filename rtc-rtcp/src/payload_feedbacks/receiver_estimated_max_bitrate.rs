use crate::header::{FORMAT_REMB, Header, PacketType};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use rtc_shared::error::{Error, Result};

const UNIQUE_IDENTIFIER: &[u8; 4] = b"REMB";

/// Receiver Estimated Max Bitrate: a receiver-side bandwidth estimate
/// relayed to the sender so it can adapt its send rate
/// (draft-alvestrand-rmcat-remb-03). The mantissa/exponent encoding
/// mirrors the bitrate field used by RFC 3550 SR/RR jitter but packs a
/// 18-bit mantissa with a 6-bit exponent instead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiverEstimatedMaxBitrate {
    pub sender_ssrc: u32,
    pub bitrate: u64,
    pub ssrcs: Vec<u32>,
}

impl ReceiverEstimatedMaxBitrate {
    pub fn marshal_size(&self) -> usize {
        crate::header::HEADER_LENGTH + 8 + 4 + self.ssrcs.len() * 4
    }

    pub fn header(&self) -> Header {
        Header {
            padding: false,
            count: FORMAT_REMB,
            packet_type: PacketType::PayloadSpecificFeedback,
            length: (self.marshal_size() / 4 - 1) as u16,
        }
    }

    fn encode_bitrate(&self) -> Result<(u8, u32)> {
        let mut exponent: u8 = 0;
        let mut mantissa = self.bitrate;
        while mantissa > 0x3FFFF {
            mantissa >>= 1;
            exponent += 1;
        }
        Ok((exponent, mantissa as u32))
    }

    pub fn marshal_to(&self, buf: &mut BytesMut) -> Result<()> {
        if self.ssrcs.len() > u8::MAX as usize {
            return Err(Error::MalformedPacket("remb carries too many ssrcs"));
        }
        self.header().marshal_to(buf)?;
        buf.put_u32(self.sender_ssrc);
        buf.put_u32(0); // media ssrc, always 0 for REMB
        buf.extend_from_slice(UNIQUE_IDENTIFIER);
        let (exponent, mantissa) = self.encode_bitrate()?;
        buf.put_u8(self.ssrcs.len() as u8);
        buf.put_u8((exponent << 2) | ((mantissa >> 16) as u8 & 0x3));
        buf.put_u16((mantissa & 0xFFFF) as u16);
        for ssrc in &self.ssrcs {
            buf.put_u32(*ssrc);
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
        if header.packet_type != PacketType::PayloadSpecificFeedback
            || header.count != FORMAT_REMB
        {
            return Err(Error::MalformedPacket("expected REMB packet type/format"));
        }
        if rest.len() < 12 {
            return Err(Error::MalformedPacket("REMB body truncated"));
        }
        let mut buf = rest;
        let sender_ssrc = buf.get_u32();
        let _media_ssrc = buf.get_u32();
        let mut identifier = [0u8; 4];
        buf.copy_to_slice(&mut identifier);
        if &identifier != UNIQUE_IDENTIFIER {
            return Err(Error::MalformedPacket("REMB unique identifier mismatch"));
        }
        let num_ssrc = buf.get_u8() as usize;
        let br_exp = buf.get_u8();
        let exponent = br_exp >> 2;
        let mantissa_hi = (br_exp & 0x3) as u32;
        let mantissa_lo = buf.get_u16() as u32;
        let mantissa = (mantissa_hi << 16) | mantissa_lo;
        let bitrate = (mantissa as u64) << exponent;

        if buf.remaining() < num_ssrc * 4 {
            return Err(Error::MalformedPacket("REMB ssrc list truncated"));
        }
        let mut ssrcs = Vec::with_capacity(num_ssrc);
        for _ in 0..num_ssrc {
            ssrcs.push(buf.get_u32());
        }

        Ok(ReceiverEstimatedMaxBitrate {
            sender_ssrc,
            bitrate,
            ssrcs,
        })
    }
}

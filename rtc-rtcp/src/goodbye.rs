use crate::header::{Header, PacketType, padding_for};
use bytes::{BufMut, Bytes, BytesMut};
use rtc_shared::error::{Error, Result};

/// Goodbye (BYE) packet: announces that one or more sources are leaving
/// the session, optionally with a human-readable reason (RFC 3550 §6.6).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Goodbye {
    pub sources: Vec<u32>,
    pub reason: Bytes,
}

impl Goodbye {
    pub fn marshal_size(&self) -> usize {
        let mut body = self.sources.len() * 4;
        if !self.reason.is_empty() {
            body += 1 + self.reason.len();
        }
        crate::header::HEADER_LENGTH + body + padding_for(body)
    }

    pub fn header(&self) -> Header {
        Header {
            padding: false,
            count: self.sources.len() as u8,
            packet_type: PacketType::Goodbye,
            length: (self.marshal_size() / 4 - 1) as u16,
        }
    }

    pub fn marshal_to(&self, buf: &mut BytesMut) -> Result<()> {
        if self.sources.len() > 31 {
            return Err(Error::MalformedPacket("goodbye carries more than 31 sources"));
        }
        if self.reason.len() > u8::MAX as usize {
            return Err(Error::MalformedPacket("goodbye reason longer than 255 bytes"));
        }
        self.header().marshal_to(buf)?;
        for source in &self.sources {
            buf.put_u32(*source);
        }
        let mut body = self.sources.len() * 4;
        if !self.reason.is_empty() {
            buf.put_u8(self.reason.len() as u8);
            buf.extend_from_slice(&self.reason);
            body += 1 + self.reason.len();
        }
        for _ in 0..padding_for(body) {
            buf.put_u8(0);
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
        if header.packet_type != PacketType::Goodbye {
            return Err(Error::MalformedPacket("expected goodbye packet type"));
        }
        if rest.len() < header.count as usize * 4 {
            return Err(Error::MalformedPacket("goodbye source list truncated"));
        }
        let mut sources = Vec::with_capacity(header.count as usize);
        let mut offset = 0;
        for _ in 0..header.count {
            sources.push(u32::from_be_bytes(
                rest[offset..offset + 4].try_into().unwrap(),
            ));
            offset += 4;
        }
        let reason = if offset < rest.len() {
            let len = rest[offset] as usize;
            let start = offset + 1;
            if start + len > rest.len() {
                return Err(Error::MalformedPacket("goodbye reason text truncated"));
            }
            Bytes::copy_from_slice(&rest[start..start + len])
        } else {
            Bytes::new()
        };
        Ok(Goodbye { sources, reason })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_goodbye_with_reason() {
        let goodbye = Goodbye {
            sources: vec![0x902f9e2e, 0xbc5e9a40, 0x12345678],
            reason: Bytes::from_static(b"Session ended"),
        };
        let raw = goodbye.marshal().unwrap();
        assert_eq!(raw.len() % 4, 0);
        let parsed = Goodbye::unmarshal(&raw).unwrap();
        assert_eq!(parsed, goodbye);
    }

    #[test]
    fn roundtrips_goodbye_without_reason() {
        let goodbye = Goodbye {
            sources: vec![1, 2],
            reason: Bytes::new(),
        };
        let raw = goodbye.marshal().unwrap();
        let parsed = Goodbye::unmarshal(&raw).unwrap();
        assert_eq!(parsed, goodbye);
    }
}

use crate::header::{Header, PacketType, padding_for};
use bytes::{BufMut, Bytes, BytesMut};
use rtc_shared::error::{Error, Result};

/// SDES item type, RFC 3550 §6.5.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SdesType {
    SdesEnd,
    SdesCname,
    SdesName,
    SdesEmail,
    SdesPhone,
    SdesLoc,
    SdesTool,
    SdesNote,
    SdesPriv,
    Unsupported(u8),
}

impl From<u8> for SdesType {
    fn from(v: u8) -> Self {
        match v {
            0 => SdesType::SdesEnd,
            1 => SdesType::SdesCname,
            2 => SdesType::SdesName,
            3 => SdesType::SdesEmail,
            4 => SdesType::SdesPhone,
            5 => SdesType::SdesLoc,
            6 => SdesType::SdesTool,
            7 => SdesType::SdesNote,
            8 => SdesType::SdesPriv,
            other => SdesType::Unsupported(other),
        }
    }
}

impl SdesType {
    pub fn value(&self) -> u8 {
        match self {
            SdesType::SdesEnd => 0,
            SdesType::SdesCname => 1,
            SdesType::SdesName => 2,
            SdesType::SdesEmail => 3,
            SdesType::SdesPhone => 4,
            SdesType::SdesLoc => 5,
            SdesType::SdesTool => 6,
            SdesType::SdesNote => 7,
            SdesType::SdesPriv => 8,
            SdesType::Unsupported(v) => *v,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptionItem {
    pub sdes_type: SdesType,
    pub text: Bytes,
}

impl SourceDescriptionItem {
    fn marshal_size(&self) -> usize {
        2 + self.text.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptionChunk {
    pub source: u32,
    pub items: Vec<SourceDescriptionItem>,
}

impl SourceDescriptionChunk {
    fn marshal_size(&self) -> usize {
        // SSRC + items + the 1-byte NULL terminator, padded to a word boundary.
        let items_len: usize = self.items.iter().map(|i| i.marshal_size()).sum();
        let unpadded = 4 + items_len + 1;
        unpadded + padding_for(unpadded)
    }

    fn marshal_to(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u32(self.source);
        for item in &self.items {
            if item.text.len() > u8::MAX as usize {
                return Err(Error::MalformedPacket("sdes item text longer than 255 bytes"));
            }
            buf.put_u8(item.sdes_type.value());
            buf.put_u8(item.text.len() as u8);
            buf.extend_from_slice(&item.text);
        }
        buf.put_u8(SdesType::SdesEnd.value());
        let written = 4 + self.items.iter().map(|i| i.marshal_size()).sum::<usize>() + 1;
        for _ in 0..padding_for(written) {
            buf.put_u8(0);
        }
        Ok(())
    }

    fn unmarshal(raw: &[u8]) -> Result<(Self, &[u8])> {
        if raw.len() < 4 {
            return Err(Error::MalformedPacket("sdes chunk shorter than ssrc"));
        }
        let source = u32::from_be_bytes(raw[0..4].try_into().unwrap());
        let mut offset = 4;
        let mut items = Vec::new();
        loop {
            if offset >= raw.len() {
                return Err(Error::MalformedPacket("sdes chunk missing null terminator"));
            }
            let sdes_type = SdesType::from(raw[offset]);
            if matches!(sdes_type, SdesType::SdesEnd) {
                offset += 1;
                break;
            }
            if offset + 2 > raw.len() {
                return Err(Error::MalformedPacket("sdes item header truncated"));
            }
            let len = raw[offset + 1] as usize;
            let start = offset + 2;
            if start + len > raw.len() {
                return Err(Error::MalformedPacket("sdes item text truncated"));
            }
            items.push(SourceDescriptionItem {
                sdes_type,
                text: Bytes::copy_from_slice(&raw[start..start + len]),
            });
            offset = start + len;
        }
        offset += padding_for(offset);
        if offset > raw.len() {
            return Err(Error::MalformedPacket("sdes chunk padding overruns packet"));
        }
        Ok((SourceDescriptionChunk { source, items }, &raw[offset..]))
    }
}

/// Source Description packet: per-source CNAME and other identifying text
/// (RFC 3550 §6.5).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceDescription {
    pub chunks: Vec<SourceDescriptionChunk>,
}

impl SourceDescription {
    pub fn marshal_size(&self) -> usize {
        crate::header::HEADER_LENGTH + self.chunks.iter().map(|c| c.marshal_size()).sum::<usize>()
    }

    pub fn header(&self) -> Header {
        Header {
            padding: false,
            count: self.chunks.len() as u8,
            packet_type: PacketType::SourceDescription,
            length: (self.marshal_size() / 4 - 1) as u16,
        }
    }

    pub fn marshal_to(&self, buf: &mut BytesMut) -> Result<()> {
        if self.chunks.len() > 31 {
            return Err(Error::MalformedPacket(
                "source description carries more than 31 chunks",
            ));
        }
        self.header().marshal_to(buf)?;
        for chunk in &self.chunks {
            chunk.marshal_to(buf)?;
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
        if header.packet_type != PacketType::SourceDescription {
            return Err(Error::MalformedPacket(
                "expected source description packet type",
            ));
        }
        let mut chunks = Vec::with_capacity(header.count as usize);
        let mut cursor = rest;
        for _ in 0..header.count {
            let (chunk, next) = SourceDescriptionChunk::unmarshal(cursor)?;
            chunks.push(chunk);
            cursor = next;
        }
        Ok(SourceDescription { chunks })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_cname_chunk() {
        let sdes = SourceDescription {
            chunks: vec![
                SourceDescriptionChunk {
                    source: 0x902f9e2e,
                    items: vec![
                        SourceDescriptionItem {
                            sdes_type: SdesType::SdesCname,
                            text: Bytes::from_static(b"user@example.com"),
                        },
                        SourceDescriptionItem {
                            sdes_type: SdesType::SdesName,
                            text: Bytes::from_static(b"John Doe"),
                        },
                    ],
                },
                SourceDescriptionChunk {
                    source: 0xbc5e9a40,
                    items: vec![SourceDescriptionItem {
                        sdes_type: SdesType::SdesCname,
                        text: Bytes::from_static(b"peer@example.com"),
                    }],
                },
            ],
        };
        let raw = sdes.marshal().unwrap();
        assert_eq!(raw.len() % 4, 0);
        let parsed = SourceDescription::unmarshal(&raw).unwrap();
        assert_eq!(parsed, sdes);
    }
}

use bytes::{Buf, BufMut, Bytes, BytesMut};
use rtc_shared::error::{Error, Result};

const HEADER_LENGTH: usize = 4;
const VERSION_SHIFT: u8 = 6;
const VERSION_MASK: u8 = 0x3;
const PADDING_SHIFT: u8 = 5;
const PADDING_MASK: u8 = 0x1;
const EXTENSION_SHIFT: u8 = 4;
const EXTENSION_MASK: u8 = 0x1;
const CC_MASK: u8 = 0xF;
const MARKER_SHIFT: u8 = 7;
const MARKER_MASK: u8 = 0x1;
const PT_MASK: u8 = 0x7F;

const CSRC_LENGTH: usize = 4;
const RTP_VERSION: u8 = 2;

/// One-byte extension profile defined in RFC 5285 section 4.2.
pub const EXTENSION_PROFILE_ONE_BYTE: u16 = 0xBEDE;
/// Two-byte extension profile defined in RFC 5285 section 4.3.
pub const EXTENSION_PROFILE_TWO_BYTE: u16 = 0x1000;

/// RTP fixed header, RFC 3550 section 5.1:
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       sequence number        |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           timestamp                          |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |           synchronization source (SSRC) identifier            |
/// +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
/// |            contributing source (CSRC) identifiers             |
/// |                             ....                              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// The header extension block, if present, is kept as raw bytes here;
/// [`crate::extension::ExtensionMap`] knows how to walk it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    pub padding: bool,
    pub marker: bool,
    pub payload_type: u8,
    pub sequence_number: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub csrc: Vec<u32>,
    pub extension: bool,
    pub extension_profile: u16,
    /// Raw header-extension payload, excluding the 4-byte profile+length
    /// word. Empty when `extension` is false.
    pub extension_payload: Bytes,
}

impl Header {
    /// Size in bytes of the fixed header plus CSRC list plus extension
    /// block, i.e. the offset of the payload within the packet.
    pub fn marshal_size(&self) -> usize {
        let mut size = HEADER_LENGTH + 8 + (self.csrc.len() * CSRC_LENGTH);
        if self.extension {
            size += 4 + self.extension_payload.len();
        }
        size
    }

    pub fn unmarshal(raw: &[u8]) -> Result<Self> {
        if raw.len() < HEADER_LENGTH + 8 {
            return Err(Error::MalformedPacket("rtp header shorter than 12 bytes"));
        }

        let first_byte = raw[0];
        let version = (first_byte >> VERSION_SHIFT) & VERSION_MASK;
        if version != RTP_VERSION {
            return Err(Error::MalformedPacket("rtp version is not 2"));
        }
        let padding = (first_byte >> PADDING_SHIFT) & PADDING_MASK != 0;
        let extension = (first_byte >> EXTENSION_SHIFT) & EXTENSION_MASK != 0;
        let cc = (first_byte & CC_MASK) as usize;

        let second_byte = raw[1];
        let marker = (second_byte >> MARKER_SHIFT) & MARKER_MASK != 0;
        let payload_type = second_byte & PT_MASK;

        let mut buf = &raw[2..];
        let sequence_number = buf.get_u16();
        let timestamp = buf.get_u32();
        let ssrc = buf.get_u32();

        if buf.remaining() < cc * CSRC_LENGTH {
            return Err(Error::MalformedPacket("rtp header csrc list truncated"));
        }
        let mut csrc = Vec::with_capacity(cc);
        for _ in 0..cc {
            csrc.push(buf.get_u32());
        }

        let (extension_profile, extension_payload) = if extension {
            if buf.remaining() < 4 {
                return Err(Error::MalformedPacket(
                    "rtp header extension word truncated",
                ));
            }
            let profile = buf.get_u16();
            let ext_len_words = buf.get_u16() as usize;
            let ext_len_bytes = ext_len_words * 4;
            if buf.remaining() < ext_len_bytes {
                return Err(Error::MalformedPacket(
                    "rtp header extension payload truncated",
                ));
            }
            let payload = Bytes::copy_from_slice(&buf[..ext_len_bytes]);
            buf.advance(ext_len_bytes);
            (profile, payload)
        } else {
            (0, Bytes::new())
        };

        Ok(Header {
            padding,
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            csrc,
            extension,
            extension_profile,
            extension_payload,
        })
    }

    pub fn marshal_to(&self, buf: &mut BytesMut) -> Result<()> {
        if self.csrc.len() > 0xF {
            return Err(Error::MalformedPacket("csrc list longer than 15 entries"));
        }

        let mut first_byte = RTP_VERSION << VERSION_SHIFT;
        if self.padding {
            first_byte |= 1 << PADDING_SHIFT;
        }
        if self.extension {
            first_byte |= 1 << EXTENSION_SHIFT;
        }
        first_byte |= self.csrc.len() as u8 & CC_MASK;
        buf.put_u8(first_byte);

        let mut second_byte = self.payload_type & PT_MASK;
        if self.marker {
            second_byte |= 1 << MARKER_SHIFT;
        }
        buf.put_u8(second_byte);

        buf.put_u16(self.sequence_number);
        buf.put_u32(self.timestamp);
        buf.put_u32(self.ssrc);
        for csrc in &self.csrc {
            buf.put_u32(*csrc);
        }

        if self.extension {
            if self.extension_payload.len() % 4 != 0 {
                return Err(Error::MalformedPacket(
                    "extension payload not word-aligned",
                ));
            }
            buf.put_u16(self.extension_profile);
            buf.put_u16((self.extension_payload.len() / 4) as u16);
            buf.extend_from_slice(&self.extension_payload);
        }

        Ok(())
    }

    pub fn marshal(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.marshal_size());
        self.marshal_to(&mut buf)?;
        Ok(buf.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Literal fixture: version 2, no extension, no CSRC, PT=96, seq=1,
    /// timestamp=1000, ssrc=0xDEADBEEF, payload starts at byte 12.
    const FIXTURE: [u8; 12] = [
        0x80, 0x60, 0x00, 0x01, 0x00, 0x00, 0x03, 0xE8, 0xDE, 0xAD, 0xBE, 0xEF,
    ];

    #[test]
    fn parses_fixed_header_fixture() {
        let header = Header::unmarshal(&FIXTURE).unwrap();
        assert_eq!(header.payload_type, 96);
        assert_eq!(header.sequence_number, 1);
        assert_eq!(header.timestamp, 1000);
        assert_eq!(header.ssrc, 0xDEAD_BEEF);
        assert!(!header.marker);
        assert!(!header.padding);
        assert!(!header.extension);
        assert!(header.csrc.is_empty());
        assert_eq!(header.marshal_size(), 12);
    }

    #[test]
    fn roundtrips_with_csrc_and_extension() {
        let header = Header {
            padding: false,
            marker: true,
            payload_type: 111,
            sequence_number: 42,
            timestamp: 90000,
            ssrc: 0x1234_5678,
            csrc: vec![1, 2, 3],
            extension: true,
            extension_profile: EXTENSION_PROFILE_ONE_BYTE,
            extension_payload: Bytes::from_static(&[0x11, 0xAA, 0xBB, 0xCC]),
        };
        let marshaled = header.marshal().unwrap();
        assert_eq!(marshaled.len(), header.marshal_size());

        let parsed = Header::unmarshal(&marshaled).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn rejects_wrong_version() {
        let mut buf = FIXTURE;
        buf[0] = 0x40; // version 1
        assert!(Header::unmarshal(&buf).is_err());
    }

    #[test]
    fn rejects_truncated_header() {
        assert!(Header::unmarshal(&FIXTURE[..8]).is_err());
    }
}

use crate::header::{EXTENSION_PROFILE_ONE_BYTE, EXTENSION_PROFILE_TWO_BYTE, Header};
use rtc_shared::error::{Error, Result};
use std::collections::HashMap;

/// Well-known header extension URIs negotiated in SDP and mapped to a
/// local id 1..=14 (one-byte) or 1..=255 (two-byte) per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderExtension {
    SsrcAudioLevel,
    Toffset,
    AbsSendTime,
    VideoOrientation,
    TransportWideCc,
    PlayoutDelay,
    Rid,
    RepairedRid,
}

impl HeaderExtension {
    pub fn uri(&self) -> &'static str {
        match self {
            HeaderExtension::SsrcAudioLevel => {
                "urn:ietf:params:rtp-hdrext:ssrc-audio-level"
            }
            HeaderExtension::Toffset => "urn:ietf:params:rtp-hdrext:toffset",
            HeaderExtension::AbsSendTime => {
                "http://www.webrtc.org/experiments/rtp-hdrext/abs-send-time"
            }
            HeaderExtension::VideoOrientation => "urn:3gpp:video-orientation",
            HeaderExtension::TransportWideCc => {
                "http://www.ietf.org/id/draft-holmer-rmcat-transport-wide-cc-extensions-01"
            }
            HeaderExtension::PlayoutDelay => {
                "http://www.webrtc.org/experiments/rtp-hdrext/playout-delay"
            }
            HeaderExtension::Rid => "urn:ietf:params:rtp-hdrext:sdes:rtp-stream-id",
            HeaderExtension::RepairedRid => {
                "urn:ietf:params:rtp-hdrext:sdes:repaired-rtp-stream-id"
            }
        }
    }

    pub fn from_uri(uri: &str) -> Option<Self> {
        [
            HeaderExtension::SsrcAudioLevel,
            HeaderExtension::Toffset,
            HeaderExtension::AbsSendTime,
            HeaderExtension::VideoOrientation,
            HeaderExtension::TransportWideCc,
            HeaderExtension::PlayoutDelay,
            HeaderExtension::Rid,
            HeaderExtension::RepairedRid,
        ]
        .into_iter()
        .find(|ext| ext.uri() == uri)
    }
}

/// A negotiated id -> extension mapping for one media stream, plus the
/// one-byte/two-byte wire profile it was negotiated under.
#[derive(Debug, Clone, Default)]
pub struct ExtensionMap {
    ids: HashMap<u8, HeaderExtension>,
}

impl ExtensionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: u8, ext: HeaderExtension) {
        self.ids.insert(id, ext);
    }

    pub fn get(&self, id: u8) -> Option<HeaderExtension> {
        self.ids.get(&id).copied()
    }

    /// Walks a parsed header's raw extension block and returns each
    /// element's local id paired with its payload, decoded per the
    /// one-byte (RFC 5285 §4.2) or two-byte (§4.3) element format
    /// indicated by the header's extension profile. Unknown profiles
    /// (vendor-specific, non-RFC-5285) are returned as a single opaque
    /// element under id 0.
    pub fn elements<'h>(&self, header: &'h Header) -> Result<Vec<(u8, &'h [u8])>> {
        if !header.extension {
            return Ok(Vec::new());
        }
        match header.extension_profile {
            EXTENSION_PROFILE_ONE_BYTE => Self::one_byte_elements(&header.extension_payload),
            EXTENSION_PROFILE_TWO_BYTE => Self::two_byte_elements(&header.extension_payload),
            _ => Ok(vec![(0, &header.extension_payload[..])]),
        }
    }

    fn one_byte_elements(payload: &[u8]) -> Result<Vec<(u8, &[u8])>> {
        let mut out = Vec::new();
        let mut i = 0;
        while i < payload.len() {
            let b = payload[i];
            if b == 0x00 {
                // padding
                i += 1;
                continue;
            }
            let id = b >> 4;
            let len = (b & 0x0F) as usize + 1;
            if id == 0x0F {
                // id 15 reserved for future extension, stop parsing per RFC 5285 §4.2
                break;
            }
            i += 1;
            if i + len > payload.len() {
                return Err(Error::MalformedPacket(
                    "one-byte header extension element overruns payload",
                ));
            }
            out.push((id, &payload[i..i + len]));
            i += len;
        }
        Ok(out)
    }

    fn two_byte_elements(payload: &[u8]) -> Result<Vec<(u8, &[u8])>> {
        let mut out = Vec::new();
        let mut i = 0;
        while i < payload.len() {
            if payload[i] == 0x00 {
                i += 1;
                continue;
            }
            if i + 2 > payload.len() {
                return Err(Error::MalformedPacket(
                    "two-byte header extension element truncated",
                ));
            }
            let id = payload[i];
            let len = payload[i + 1] as usize;
            i += 2;
            if i + len > payload.len() {
                return Err(Error::MalformedPacket(
                    "two-byte header extension element overruns payload",
                ));
            }
            out.push((id, &payload[i..i + len]));
            i += len;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn header_with(profile: u16, payload: &[u8]) -> Header {
        Header {
            extension: true,
            extension_profile: profile,
            extension_payload: Bytes::copy_from_slice(payload),
            ..Header::default()
        }
    }

    #[test]
    fn parses_one_byte_elements() {
        // id=1 len=1 value=0xAB, then padding, then id=3 len=2 value=0x01 0x02
        let payload = [0x10, 0xAB, 0x00, 0x00, 0x31, 0x01, 0x02];
        let header = header_with(EXTENSION_PROFILE_ONE_BYTE, &payload);
        let map = ExtensionMap::new();
        let elements = map.elements(&header).unwrap();
        assert_eq!(elements, vec![(1u8, &[0xAB][..]), (3u8, &[0x01, 0x02][..])]);
    }

    #[test]
    fn parses_two_byte_elements() {
        let payload = [5, 2, 0xAA, 0xBB, 9, 1, 0x01];
        let header = header_with(EXTENSION_PROFILE_TWO_BYTE, &payload);
        let map = ExtensionMap::new();
        let elements = map.elements(&header).unwrap();
        assert_eq!(
            elements,
            vec![(5u8, &[0xAA, 0xBB][..]), (9u8, &[0x01][..])]
        );
    }

    #[test]
    fn no_extension_is_empty() {
        let header = Header::default();
        let map = ExtensionMap::new();
        assert!(map.elements(&header).unwrap().is_empty());
    }

    #[test]
    fn known_uris_roundtrip() {
        assert_eq!(
            HeaderExtension::from_uri(HeaderExtension::AbsSendTime.uri()),
            Some(HeaderExtension::AbsSendTime)
        );
    }
}

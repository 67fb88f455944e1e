use bytes::{Buf, BufMut, BytesMut};
use rtc_shared::error::{Error, Result};

pub const RECEPTION_REPORT_LENGTH: usize = 24;

/// One reception report block, carried inside a Sender Report or Receiver
/// Report (RFC 3550 §6.4.1/§6.4.2).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceptionReport {
    pub ssrc: u32,
    pub fraction_lost: u8,
    pub total_lost: u32,
    pub last_sequence_number: u32,
    pub jitter: u32,
    pub last_sender_report: u32,
    pub delay: u32,
}

impl ReceptionReport {
    pub fn marshal_size(&self) -> usize {
        RECEPTION_REPORT_LENGTH
    }

    pub fn marshal_to(&self, buf: &mut BytesMut) -> Result<()> {
        if self.total_lost > 0x00FF_FFFF {
            return Err(Error::MalformedPacket(
                "reception report cumulative loss exceeds 24 bits",
            ));
        }
        buf.put_u32(self.ssrc);
        buf.put_u8(self.fraction_lost);
        buf.put_uint(self.total_lost as u64, 3);
        buf.put_u32(self.last_sequence_number);
        buf.put_u32(self.jitter);
        buf.put_u32(self.last_sender_report);
        buf.put_u32(self.delay);
        Ok(())
    }

    pub fn unmarshal(raw: &[u8]) -> Result<(Self, &[u8])> {
        if raw.len() < RECEPTION_REPORT_LENGTH {
            return Err(Error::MalformedPacket("reception report block truncated"));
        }
        let mut buf = raw;
        let ssrc = buf.get_u32();
        let fraction_lost = buf.get_u8();
        let total_lost = buf.get_uint(3) as u32;
        let last_sequence_number = buf.get_u32();
        let jitter = buf.get_u32();
        let last_sender_report = buf.get_u32();
        let delay = buf.get_u32();
        Ok((
            ReceptionReport {
                ssrc,
                fraction_lost,
                total_lost,
                last_sequence_number,
                jitter,
                last_sender_report,
                delay,
            },
            &raw[RECEPTION_REPORT_LENGTH..],
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_reception_report() {
        let report = ReceptionReport {
            ssrc: 0xbc5e9a40,
            fraction_lost: 10,
            total_lost: 100,
            last_sequence_number: 0x46e1,
            jitter: 273,
            last_sender_report: 0x9f36432,
            delay: 150137,
        };
        let mut buf = BytesMut::new();
        report.marshal_to(&mut buf).unwrap();
        assert_eq!(buf.len(), RECEPTION_REPORT_LENGTH);
        let (parsed, rest) = ReceptionReport::unmarshal(&buf).unwrap();
        assert_eq!(parsed, report);
        assert!(rest.is_empty());
    }
}

use crate::header::{Header, PacketType, padding_for};
use crate::reception_report::ReceptionReport;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use rtc_shared::error::{Error, Result};

const SR_BODY_LENGTH: usize = 20;

/// Sender Report: reception quality feedback plus a sender's own transmit
/// statistics, sent by active media sources (RFC 3550 §6.4.1).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SenderReport {
    pub ssrc: u32,
    pub ntp_time: u64,
    pub rtp_time: u32,
    pub packet_count: u32,
    pub octet_count: u32,
    pub reports: Vec<ReceptionReport>,
    pub profile_extensions: Bytes,
}

impl SenderReport {
    pub fn marshal_size(&self) -> usize {
        let reports_len: usize = self.reports.iter().map(|r| r.marshal_size()).sum();
        crate::header::HEADER_LENGTH + SR_BODY_LENGTH + reports_len + self.profile_extensions.len()
    }

    pub fn header(&self) -> Header {
        let body_len = self.marshal_size() - crate::header::HEADER_LENGTH;
        let padded = body_len + padding_for(body_len);
        Header {
            padding: padding_for(body_len) != 0,
            count: self.reports.len() as u8,
            packet_type: PacketType::SenderReport,
            length: ((padded + crate::header::HEADER_LENGTH) / 4 - 1) as u16,
        }
    }

    pub fn marshal_to(&self, buf: &mut BytesMut) -> Result<()> {
        if self.reports.len() > 31 {
            return Err(Error::MalformedPacket(
                "sender report carries more than 31 reception reports",
            ));
        }
        self.header().marshal_to(buf)?;
        buf.put_u32(self.ssrc);
        buf.put_u64(self.ntp_time);
        buf.put_u32(self.rtp_time);
        buf.put_u32(self.packet_count);
        buf.put_u32(self.octet_count);
        for report in &self.reports {
            report.marshal_to(buf)?;
        }
        buf.extend_from_slice(&self.profile_extensions);
        Ok(())
    }

    pub fn marshal(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.marshal_size());
        self.marshal_to(&mut buf)?;
        Ok(buf.freeze())
    }

    pub fn unmarshal(raw: &[u8]) -> Result<Self> {
        let (header, rest) = Header::unmarshal(raw)?;
        if header.packet_type != PacketType::SenderReport {
            return Err(Error::MalformedPacket("expected sender report packet type"));
        }
        if rest.len() < SR_BODY_LENGTH {
            return Err(Error::MalformedPacket("sender report body truncated"));
        }
        let mut buf = rest;
        let ssrc = buf.get_u32();
        let ntp_time = buf.get_u64();
        let rtp_time = buf.get_u32();
        let packet_count = buf.get_u32();
        let octet_count = buf.get_u32();

        let mut reports = Vec::with_capacity(header.count as usize);
        let mut cursor = buf;
        for _ in 0..header.count {
            let (report, next) = ReceptionReport::unmarshal(cursor)?;
            reports.push(report);
            cursor = next;
        }

        Ok(SenderReport {
            ssrc,
            ntp_time,
            rtp_time,
            packet_count,
            octet_count,
            reports,
            profile_extensions: Bytes::copy_from_slice(cursor),
        })
    }

    pub fn destination_ssrc(&self) -> Vec<u32> {
        let mut out: Vec<u32> = self.reports.iter().map(|r| r.ssrc).collect();
        out.push(self.ssrc);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_sender_report_with_reports() {
        let sr = SenderReport {
            ssrc: 0x902f9e2e,
            ntp_time: 0xda8bd1fcdddda05a,
            rtp_time: 0xaaf4edd5,
            packet_count: 1000,
            octet_count: 50000,
            reports: vec![ReceptionReport {
                ssrc: 0xbc5e9a40,
                fraction_lost: 10,
                total_lost: 100,
                last_sequence_number: 0x46e1,
                jitter: 273,
                last_sender_report: 0x9f36432,
                delay: 150137,
            }],
            profile_extensions: Bytes::new(),
        };
        let raw = sr.marshal().unwrap();
        let parsed = SenderReport::unmarshal(&raw).unwrap();
        assert_eq!(parsed, sr);
    }

    #[test]
    fn roundtrips_empty_sender_report() {
        let sr = SenderReport {
            ssrc: 1,
            ntp_time: 2,
            rtp_time: 3,
            packet_count: 4,
            octet_count: 5,
            reports: Vec::new(),
            profile_extensions: Bytes::new(),
        };
        let raw = sr.marshal().unwrap();
        let parsed = SenderReport::unmarshal(&raw).unwrap();
        assert_eq!(parsed, sr);
        assert_eq!(raw.len() % 4, 0);
    }
}

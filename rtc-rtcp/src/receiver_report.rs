use crate::header::{Header, PacketType, padding_for};
use crate::reception_report::ReceptionReport;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use rtc_shared::error::{Error, Result};

const RR_BODY_LENGTH: usize = 4;

/// Receiver Report: reception quality feedback from a participant that is
/// not itself an active media source (RFC 3550 §6.4.2).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiverReport {
    pub ssrc: u32,
    pub reports: Vec<ReceptionReport>,
    pub profile_extensions: Bytes,
}

impl ReceiverReport {
    pub fn marshal_size(&self) -> usize {
        let reports_len: usize = self.reports.iter().map(|r| r.marshal_size()).sum();
        crate::header::HEADER_LENGTH + RR_BODY_LENGTH + reports_len + self.profile_extensions.len()
    }

    pub fn header(&self) -> Header {
        let body_len = self.marshal_size() - crate::header::HEADER_LENGTH;
        let padded = body_len + padding_for(body_len);
        Header {
            padding: padding_for(body_len) != 0,
            count: self.reports.len() as u8,
            packet_type: PacketType::ReceiverReport,
            length: ((padded + crate::header::HEADER_LENGTH) / 4 - 1) as u16,
        }
    }

    pub fn marshal_to(&self, buf: &mut BytesMut) -> Result<()> {
        if self.reports.len() > 31 {
            return Err(Error::MalformedPacket(
                "receiver report carries more than 31 reception reports",
            ));
        }
        self.header().marshal_to(buf)?;
        buf.put_u32(self.ssrc);
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
        if header.packet_type != PacketType::ReceiverReport {
            return Err(Error::MalformedPacket(
                "expected receiver report packet type",
            ));
        }
        if rest.len() < RR_BODY_LENGTH {
            return Err(Error::MalformedPacket("receiver report body truncated"));
        }
        let mut buf = rest;
        let ssrc = buf.get_u32();

        let mut reports = Vec::with_capacity(header.count as usize);
        let mut cursor = buf;
        for _ in 0..header.count {
            let (report, next) = ReceptionReport::unmarshal(cursor)?;
            reports.push(report);
            cursor = next;
        }

        Ok(ReceiverReport {
            ssrc,
            reports,
            profile_extensions: Bytes::copy_from_slice(cursor),
        })
    }

    pub fn destination_ssrc(&self) -> Vec<u32> {
        self.reports.iter().map(|r| r.ssrc).collect()
    }
}

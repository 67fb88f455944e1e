use crate::goodbye::Goodbye;
use crate::header::{FORMAT_FIR, FORMAT_PLI, FORMAT_REMB, FORMAT_TCC, FORMAT_TLN, Header, PacketType};
use crate::payload_feedbacks::full_intra_request::FullIntraRequest;
use crate::payload_feedbacks::picture_loss_indication::PictureLossIndication;
use crate::payload_feedbacks::receiver_estimated_max_bitrate::ReceiverEstimatedMaxBitrate;
use crate::receiver_report::ReceiverReport;
use crate::sender_report::SenderReport;
use crate::source_description::SourceDescription;
use crate::transport_feedbacks::transport_layer_cc::TransportLayerCc;
use crate::transport_feedbacks::transport_layer_nack::TransportLayerNack;
use bytes::{Bytes, BytesMut};
use rtc_shared::error::{Error, Result};

/// A single decoded RTCP packet. RTCP is always carried as one or more of
/// these back to back in a compound packet (RFC 3550 §6.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    SenderReport(SenderReport),
    ReceiverReport(ReceiverReport),
    SourceDescription(SourceDescription),
    Goodbye(Goodbye),
    PictureLossIndication(PictureLossIndication),
    FullIntraRequest(FullIntraRequest),
    ReceiverEstimatedMaxBitrate(ReceiverEstimatedMaxBitrate),
    TransportLayerNack(TransportLayerNack),
    TransportLayerCc(TransportLayerCc),
}

impl Packet {
    pub fn marshal_size(&self) -> usize {
        match self {
            Packet::SenderReport(p) => p.marshal_size(),
            Packet::ReceiverReport(p) => p.marshal_size(),
            Packet::SourceDescription(p) => p.marshal_size(),
            Packet::Goodbye(p) => p.marshal_size(),
            Packet::PictureLossIndication(p) => p.marshal_size(),
            Packet::FullIntraRequest(p) => p.marshal_size(),
            Packet::ReceiverEstimatedMaxBitrate(p) => p.marshal_size(),
            Packet::TransportLayerNack(p) => p.marshal_size(),
            Packet::TransportLayerCc(p) => p.marshal_size(),
        }
    }

    pub fn marshal_to(&self, buf: &mut BytesMut) -> Result<()> {
        match self {
            Packet::SenderReport(p) => p.marshal_to(buf),
            Packet::ReceiverReport(p) => p.marshal_to(buf),
            Packet::SourceDescription(p) => p.marshal_to(buf),
            Packet::Goodbye(p) => p.marshal_to(buf),
            Packet::PictureLossIndication(p) => p.marshal_to(buf),
            Packet::FullIntraRequest(p) => p.marshal_to(buf),
            Packet::ReceiverEstimatedMaxBitrate(p) => p.marshal_to(buf),
            Packet::TransportLayerNack(p) => p.marshal_to(buf),
            Packet::TransportLayerCc(p) => p.marshal_to(buf),
        }
    }

    pub fn marshal(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.marshal_size());
        self.marshal_to(&mut buf)?;
        Ok(buf.freeze())
    }

    fn unmarshal_one(raw: &[u8]) -> Result<(Self, usize)> {
        let (header, _) = Header::unmarshal(raw)?;
        let packet_len = (header.length as usize + 1) * 4;
        if raw.len() < packet_len {
            return Err(Error::MalformedPacket(
                "rtcp packet length field overruns buffer",
            ));
        }
        let slice = &raw[..packet_len];

        let packet = match header.packet_type {
            PacketType::SenderReport => Packet::SenderReport(SenderReport::unmarshal(slice)?),
            PacketType::ReceiverReport => Packet::ReceiverReport(ReceiverReport::unmarshal(slice)?),
            PacketType::SourceDescription => {
                Packet::SourceDescription(SourceDescription::unmarshal(slice)?)
            }
            PacketType::Goodbye => Packet::Goodbye(Goodbye::unmarshal(slice)?),
            PacketType::PayloadSpecificFeedback => match header.count {
                FORMAT_PLI => {
                    Packet::PictureLossIndication(PictureLossIndication::unmarshal(slice)?)
                }
                FORMAT_FIR => Packet::FullIntraRequest(FullIntraRequest::unmarshal(slice)?),
                FORMAT_REMB => Packet::ReceiverEstimatedMaxBitrate(
                    ReceiverEstimatedMaxBitrate::unmarshal(slice)?,
                ),
                _ => {
                    return Err(Error::MalformedPacket(
                        "unrecognized payload-specific feedback format",
                    ));
                }
            },
            PacketType::TransportSpecificFeedback => match header.count {
                FORMAT_TLN => Packet::TransportLayerNack(TransportLayerNack::unmarshal(slice)?),
                FORMAT_TCC => Packet::TransportLayerCc(TransportLayerCc::unmarshal(slice)?),
                _ => {
                    return Err(Error::MalformedPacket(
                        "unrecognized transport-specific feedback format",
                    ));
                }
            },
            PacketType::ApplicationDefined | PacketType::ExtendedReport => {
                return Err(Error::MalformedPacket("unsupported rtcp packet type"));
            }
            PacketType::Unsupported(_) => {
                return Err(Error::MalformedPacket("unknown rtcp packet type"));
            }
        };

        Ok((packet, packet_len))
    }

    /// Splits a compound RTCP packet into its constituent packets, per
    /// RFC 3550 §6.1 ("a compound packet ... back-to-back without any
    /// intervening separators").
    pub fn unmarshal(raw: &[u8]) -> Result<Vec<Packet>> {
        let mut packets = Vec::new();
        let mut cursor = raw;
        while !cursor.is_empty() {
            let (packet, consumed) = Self::unmarshal_one(cursor)?;
            packets.push(packet);
            cursor = &cursor[consumed..];
        }
        if packets.is_empty() {
            return Err(Error::MalformedPacket("empty rtcp compound packet"));
        }
        Ok(packets)
    }

    /// Marshals a sequence of packets into one compound RTCP packet.
    pub fn marshal_many(packets: &[Packet]) -> Result<Bytes> {
        let size: usize = packets.iter().map(|p| p.marshal_size()).sum();
        let mut buf = BytesMut::with_capacity(size);
        for packet in packets {
            packet.marshal_to(&mut buf)?;
        }
        Ok(buf.freeze())
    }
}

use alloc::vec::Vec;

use crate::{
    packet::{
        PacketId, QoS, decode,
        encode::{self, Encode},
    },
    protocol::{FixedHeader, PacketType},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Subscription<'a> {
    pub topic_filter: &'a str,
    pub qos: QoS,
}

impl<'a> Subscription<'a> {
    pub const fn new(topic_filter: &'a str, qos: QoS) -> Self {
        Self { topic_filter, qos }
    }
}

pub(crate) struct Subscribe<'a> {
    pub(crate) packet_id: PacketId,
    pub(crate) topics: &'a [Subscription<'a>],
}

impl encode::EncodePacket for Subscribe<'_> {
    const PACKET_TYPE: PacketType = PacketType::Subscribe;

    fn flags(&self) -> u8 {
        0b0010
    }

    fn required_space(&self) -> usize {
        let mut required = self.packet_id.required_space();

        for topic in self.topics {
            required += topic.topic_filter.required_space() + topic.qos.required_space();
        }

        required
    }

    fn encode_body(&self, cursor: &mut encode::Cursor) -> Result<(), crate::Error> {
        self.packet_id.encode(cursor)?;

        for topic in self.topics {
            topic.topic_filter.encode(cursor)?;
            topic.qos.encode(cursor)?;
        }

        Ok(())
    }
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SubAckReturnCode {
    MaxQoS0 = 0x00,
    MaxQoS1 = 0x01,
    MaxQoS2 = 0x02,
    Failure = 0x80,
}

impl SubAckReturnCode {
    pub const fn granted(self) -> Option<QoS> {
        match self {
            Self::MaxQoS0 => Some(QoS::AtMostOnce),
            Self::MaxQoS1 => Some(QoS::AtLeastOnce),
            Self::MaxQoS2 => Some(QoS::ExactlyOnce),
            Self::Failure => None,
        }
    }
}

impl TryFrom<u8> for SubAckReturnCode {
    type Error = crate::Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let code = match value {
            0x00 => Self::MaxQoS0,
            0x01 => Self::MaxQoS1,
            0x02 => Self::MaxQoS2,
            0x80 => Self::Failure,
            _ => return Err(crate::Error::BadFormat),
        };

        Ok(code)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct SubAck {
    pub(crate) packet_id: PacketId,
    pub(crate) return_codes: Vec<SubAckReturnCode>,
}

impl SubAck {
    pub(crate) fn decode(header: &FixedHeader, body: &[u8]) -> Result<Self, crate::Error> {
        header.ensure(PacketType::SubAck)?;

        let cursor = &mut decode::Cursor::new(body);
        let packet_id = PacketId::try_from(cursor.read_u16()?)?;

        if cursor.is_empty() {
            return Err(crate::Error::BadFormat);
        }

        let mut return_codes = Vec::new();
        return_codes
            .try_reserve_exact(cursor.remaining())
            .map_err(|_| crate::Error::NoMemory)?;

        while !cursor.is_empty() {
            return_codes.push(SubAckReturnCode::try_from(cursor.read_u8()?)?);
        }

        Ok(SubAck {
            packet_id,
            return_codes,
        })
    }
}

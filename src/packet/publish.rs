use crate::{
    packet::{
        PacketId, QoS, decode,
        encode::{self, Encode},
    },
    protocol::{FixedHeader, PacketType},
};

/// Application message: topic name plus opaque payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Message<'a> {
    pub topic: &'a str,
    pub payload: &'a [u8],
}

impl<'a> Message<'a> {
    pub const fn new(topic: &'a str, payload: &'a [u8]) -> Self {
        Self { topic, payload }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Flags {
    pub dup: bool,
    pub qos: QoS,
    pub retain: bool,
}

impl Flags {
    pub(crate) const DUP: u8 = 0b1000;
}

impl TryFrom<u8> for Flags {
    type Error = crate::Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let dup = value & Self::DUP != 0;
        let qos = QoS::try_from((value >> 1) & 0b11)?;
        let retain = value & 0b0001 != 0;

        Ok(Self { dup, qos, retain })
    }
}

impl From<&Flags> for u8 {
    fn from(value: &Flags) -> Self {
        (value.dup as u8) << 3 | (value.qos as u8) << 1 | (value.retain as u8)
    }
}

/// PUBLISH in either direction. Inbound ones borrow from the receive
/// buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Publish<'a> {
    pub flags: Flags,
    pub topic: &'a str,
    pub packet_id: Option<PacketId>,
    pub payload: &'a [u8],
}

impl<'a> Publish<'a> {
    pub const fn message(&self) -> Message<'a> {
        Message::new(self.topic, self.payload)
    }

    pub(crate) fn decode(header: &FixedHeader, body: &'a [u8]) -> Result<Self, crate::Error> {
        header.ensure(PacketType::Publish)?;
        let flags = Flags::try_from(header.flags)?;

        let cursor = &mut decode::Cursor::new(body);
        let topic = cursor.read_utf8()?;
        if topic.is_empty() {
            return Err(crate::Error::BadFormat);
        }

        let packet_id = match flags.qos {
            QoS::AtMostOnce => None,
            _ => Some(PacketId::try_from(cursor.read_u16()?)?),
        };

        let payload = cursor.read_rest();

        Ok(Publish {
            flags,
            topic,
            packet_id,
            payload,
        })
    }
}

impl encode::EncodePacket for Publish<'_> {
    const PACKET_TYPE: PacketType = PacketType::Publish;

    fn flags(&self) -> u8 {
        (&self.flags).into()
    }

    fn required_space(&self) -> usize {
        self.topic.required_space()
            + self.packet_id.map(|id| id.required_space()).unwrap_or(0)
            + self.payload.len()
    }

    fn encode_body(&self, cursor: &mut encode::Cursor) -> Result<(), crate::Error> {
        self.topic.encode(cursor)?;
        if let Some(id) = self.packet_id {
            id.encode(cursor)?;
        }
        cursor.write_bytes(self.payload)
    }
}

#[cfg(test)]
mod tests {
    use crate::packet::encode::EncodePacket;

    use super::*;

    #[test]
    fn parse_simple_packet() {
        let header = FixedHeader::parse(0x30).unwrap();
        let body = [
            0x00, 0x05, b't', b'o', b'p', b'i', b'c', b'p', b'a', b'y', b'l', b'o', b'a', b'd',
        ];
        let packet = Publish::decode(&header, &body).unwrap();

        assert!(matches!(
            packet.flags,
            Flags {
                dup: false,
                qos: QoS::AtMostOnce,
                retain: false
            }
        ));
        assert_eq!(packet.packet_id, None);
        assert_eq!(packet.topic, "topic");
        assert_eq!(packet.payload, b"payload".as_slice());
    }

    #[test]
    fn parse_qos2_with_flags() {
        // dup, qos 2, retain
        let header = FixedHeader::parse(0x3D).unwrap();
        let body = [0x00, 0x01, b'a', 0x00, 0x0A];
        let packet = Publish::decode(&header, &body).unwrap();

        assert!(packet.flags.dup && packet.flags.retain);
        assert_eq!(packet.flags.qos, QoS::ExactlyOnce);
        assert_eq!(packet.packet_id.map(PacketId::get), Some(10));
        assert!(packet.payload.is_empty());
    }

    #[test]
    fn reject_qos3() {
        let header = FixedHeader::parse(0x36).unwrap();
        assert!(matches!(
            Publish::decode(&header, &[0x00, 0x01, b'a', 0x00, 0x01]),
            Err(crate::Error::BadFormat)
        ));
    }

    #[test]
    fn reject_truncated() {
        let qos0 = FixedHeader::parse(0x30).unwrap();
        let qos1 = FixedHeader::parse(0x32).unwrap();

        // topic length beyond body
        assert!(Publish::decode(&qos0, &[0x00, 0x09, b'a']).is_err());
        // empty topic
        assert!(Publish::decode(&qos0, &[0x00, 0x00, b'a']).is_err());
        // missing packet id
        assert!(Publish::decode(&qos1, &[0x00, 0x01, b'a', 0x00]).is_err());
        // no topic length at all
        assert!(Publish::decode(&qos0, &[0x00]).is_err());
    }

    #[test]
    fn encode_qos1() {
        let packet = Publish {
            flags: Flags {
                dup: false,
                qos: QoS::AtLeastOnce,
                retain: true,
            },
            topic: "a/b",
            packet_id: Some(PacketId::try_from(1).unwrap()),
            payload: b"hi",
        };

        // 0x33, 9, 0, 3, 'a', '/', 'b', 0, 1, 'h', 'i'
        assert_eq!(
            packet.to_vec().unwrap().as_slice(),
            &[0x33, 9, 0, 3, b'a', b'/', b'b', 0, 1, b'h', b'i']
        );
    }

    #[test]
    fn encode_qos0_has_no_packet_id() {
        let packet = Publish {
            flags: Flags::default(),
            topic: "t",
            packet_id: None,
            payload: b"",
        };

        assert_eq!(packet.to_vec().unwrap().as_slice(), &[0x30, 3, 0, 1, b't']);
    }
}

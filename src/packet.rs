use crate::{
    packet::{
        connect::ConnAck,
        encode::{Encode, EncodePacket},
        publish::Publish,
        subscribe::SubAck,
    },
    protocol::{FixedHeader, PacketType},
};

pub mod connect;
pub mod decode;
pub mod encode;
pub mod publish;
pub mod subscribe;
pub mod unsubscribe;

/// Packets a client can receive.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Packet<'a> {
    ConnAck(ConnAck),
    Publish(Publish<'a>),
    PubAck(PacketId),
    PubRec(PacketId),
    PubRel(PacketId),
    PubComp(PacketId),
    SubAck(SubAck),
    UnsubAck(PacketId),
    PingResp,
}

impl<'a> Packet<'a> {
    pub(crate) fn decode(header: &FixedHeader, body: &'a [u8]) -> Result<Self, crate::Error> {
        match header.packet_type {
            PacketType::ConnAck => ConnAck::decode(header, body).map(Packet::ConnAck),
            PacketType::Publish => Publish::decode(header, body).map(Packet::Publish),
            PacketType::PubAck => only_packet_id(header, PacketType::PubAck, body).map(Packet::PubAck),
            PacketType::PubRec => only_packet_id(header, PacketType::PubRec, body).map(Packet::PubRec),
            PacketType::PubRel => only_packet_id(header, PacketType::PubRel, body).map(Packet::PubRel),
            PacketType::PubComp => {
                only_packet_id(header, PacketType::PubComp, body).map(Packet::PubComp)
            }
            PacketType::SubAck => SubAck::decode(header, body).map(Packet::SubAck),
            PacketType::UnsubAck => {
                only_packet_id(header, PacketType::UnsubAck, body).map(Packet::UnsubAck)
            }
            PacketType::PingResp => {
                empty_body(header, PacketType::PingResp, body).map(|_| Packet::PingResp)
            }
            // server-bound packets
            _ => Err(crate::Error::BadFormat),
        }
    }
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum QoS {
    #[default]
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl TryFrom<u8> for QoS {
    type Error = crate::Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let qos = match value {
            0 => Self::AtMostOnce,
            1 => Self::AtLeastOnce,
            2 => Self::ExactlyOnce,
            _ => return Err(crate::Error::BadFormat),
        };

        Ok(qos)
    }
}

impl Encode for QoS {
    fn encode(&self, cursor: &mut encode::Cursor) -> Result<(), crate::Error> {
        (*self as u8).encode(cursor)
    }

    fn required_space(&self) -> usize {
        1
    }
}

/// Non-zero 16-bit identifier tying a request to its acknowledgements.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PacketId(u16);

impl PacketId {
    pub(crate) const FIRST: Self = Self(1);

    pub const fn get(self) -> u16 {
        self.0
    }

    /// Wrapping successor, skipping zero.
    pub(crate) const fn next(self) -> Self {
        match self.0 {
            u16::MAX => Self(1),
            id => Self(id + 1),
        }
    }

    fn decode(cursor: &mut decode::Cursor) -> Result<Self, crate::Error> {
        Self::try_from(cursor.read_u16()?)
    }
}

impl TryFrom<u16> for PacketId {
    type Error = crate::Error;

    fn try_from(id: u16) -> Result<Self, Self::Error> {
        if id == 0 {
            return Err(crate::Error::BadFormat);
        }

        Ok(Self(id))
    }
}

impl Encode for PacketId {
    fn encode(&self, cursor: &mut encode::Cursor) -> Result<(), crate::Error> {
        self.0.encode(cursor)
    }

    fn required_space(&self) -> usize {
        2
    }
}

macro_rules! ack_packet {
    ($(#[$meta:meta])* $name:ident, $packet_type:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq)]
        pub struct $name(pub PacketId);

        impl EncodePacket for $name {
            const PACKET_TYPE: PacketType = $packet_type;

            fn flags(&self) -> u8 {
                $packet_type.fixed_flags().unwrap_or(0)
            }

            fn required_space(&self) -> usize {
                self.0.required_space()
            }

            fn encode_body(&self, cursor: &mut encode::Cursor) -> Result<(), crate::Error> {
                self.0.encode(cursor)
            }
        }
    };
}

ack_packet!(PubAck, PacketType::PubAck);
ack_packet!(PubRec, PacketType::PubRec);
ack_packet!(
    /// Always carries the reserved flag pattern `0b0010`.
    PubRel,
    PacketType::PubRel
);
ack_packet!(PubComp, PacketType::PubComp);

macro_rules! empty_packet {
    ($name:ident, $packet_type:expr) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq)]
        pub struct $name;

        impl EncodePacket for $name {
            const PACKET_TYPE: PacketType = $packet_type;

            fn flags(&self) -> u8 {
                0
            }

            fn required_space(&self) -> usize {
                0
            }

            fn encode_body(&self, _: &mut encode::Cursor) -> Result<(), crate::Error> {
                Ok(())
            }
        }
    };
}

empty_packet!(PingReq, PacketType::PingReq);
empty_packet!(Disconnect, PacketType::Disconnect);

/// Decodes the body of PUBACK, PUBREC, PUBREL, PUBCOMP or UNSUBACK.
pub(crate) fn only_packet_id(
    header: &FixedHeader,
    packet_type: PacketType,
    body: &[u8],
) -> Result<PacketId, crate::Error> {
    header.ensure(packet_type)?;

    let cursor = &mut decode::Cursor::new(body);
    let packet_id = PacketId::decode(cursor)?;
    cursor.expect_empty()?;

    Ok(packet_id)
}

pub(crate) fn empty_body(
    header: &FixedHeader,
    packet_type: PacketType,
    body: &[u8],
) -> Result<(), crate::Error> {
    header.ensure(packet_type)?;
    decode::Cursor::new(body).expect_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(byte: u8) -> FixedHeader {
        FixedHeader::parse(byte).unwrap()
    }

    #[test]
    fn encode_acks() {
        let id = PacketId::try_from(0x1234).unwrap();
        let mut buf = [0u8; 4];

        PubAck(id).encode(&mut buf).unwrap();
        assert_eq!(buf, [0x40, 0x02, 0x12, 0x34]);

        PubRec(id).encode(&mut buf).unwrap();
        assert_eq!(buf, [0x50, 0x02, 0x12, 0x34]);

        PubRel(id).encode(&mut buf).unwrap();
        assert_eq!(buf, [0x62, 0x02, 0x12, 0x34]);

        PubComp(id).encode(&mut buf).unwrap();
        assert_eq!(buf, [0x70, 0x02, 0x12, 0x34]);
    }

    #[test]
    fn encode_empty_packets() {
        assert_eq!(PingReq.to_vec().unwrap().as_slice(), &[0xC0, 0x00]);
        assert_eq!(Disconnect.to_vec().unwrap().as_slice(), &[0xE0, 0x00]);
    }

    #[test]
    fn size_query() {
        let id = PacketId::try_from(7).unwrap();
        assert_eq!(PubAck(id).encode(&mut []).unwrap(), 4);

        let mut short = [0u8; 3];
        assert!(matches!(
            PubAck(id).encode(&mut short),
            Err(crate::Error::BadInput)
        ));
    }

    #[test]
    fn packet_id_wraps_to_one() {
        let id = PacketId::try_from(u16::MAX).unwrap();
        assert_eq!(id.next().get(), 1);
        assert!(PacketId::try_from(0).is_err());
    }

    #[test]
    fn only_packet_id_checks_length_and_flags() {
        let id = only_packet_id(&header(0x40), PacketType::PubAck, &[0x00, 0x05]).unwrap();
        assert_eq!(id.get(), 5);

        assert!(only_packet_id(&header(0x40), PacketType::PubAck, &[0x05]).is_err());
        assert!(only_packet_id(&header(0x40), PacketType::PubAck, &[0, 5, 0]).is_err());
        assert!(only_packet_id(&header(0x41), PacketType::PubAck, &[0, 5]).is_err());
        assert!(only_packet_id(&header(0x60), PacketType::PubRel, &[0, 5]).is_err());
        assert!(only_packet_id(&header(0x62), PacketType::PubRel, &[0, 5]).is_ok());
        assert!(only_packet_id(&header(0x40), PacketType::PubAck, &[0, 0]).is_err());
    }

    #[test]
    fn decode_dispatch() {
        assert!(matches!(
            Packet::decode(&header(0xB0), &[0x00, 0x04]),
            Ok(Packet::UnsubAck(id)) if id.get() == 4
        ));
        assert!(matches!(Packet::decode(&header(0xD0), &[]), Ok(Packet::PingResp)));
        assert!(matches!(
            Packet::decode(&header(0xC0), &[]),
            Err(crate::Error::BadFormat)
        ));
        assert!(matches!(
            Packet::decode(&header(0x10), &[]),
            Err(crate::Error::BadFormat)
        ));
    }

    #[test]
    fn empty_body_checks() {
        assert!(empty_body(&header(0xD0), PacketType::PingResp, &[]).is_ok());
        assert!(empty_body(&header(0xD0), PacketType::PingResp, &[0]).is_err());
        assert!(empty_body(&header(0xD1), PacketType::PingResp, &[]).is_err());
    }
}

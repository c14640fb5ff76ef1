/// Upper bound on the fixed header: one type/flags byte plus up to four
/// Remaining Length bytes.
pub(crate) const MAX_HEADER_SIZE: usize = 5;

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PacketType {
    Connect = 1,
    ConnAck = 2,
    Publish = 3,
    PubAck = 4,
    PubRec = 5,
    PubRel = 6,
    PubComp = 7,
    Subscribe = 8,
    SubAck = 9,
    Unsubscribe = 10,
    UnsubAck = 11,
    PingReq = 12,
    PingResp = 13,
    Disconnect = 14,
}

impl PacketType {
    /// Reserved low nibble a packet of this type must carry. PUBLISH has
    /// none, its nibble holds DUP/QoS/RETAIN.
    pub(crate) const fn fixed_flags(self) -> Option<u8> {
        match self {
            Self::Publish => None,
            Self::PubRel | Self::Subscribe | Self::Unsubscribe => Some(0b0010),
            _ => Some(0),
        }
    }

    pub(crate) fn validate_flags(self, flags: u8) -> bool {
        self.fixed_flags().is_none_or(|expected| expected == flags)
    }

    pub(crate) const fn header_byte(self, flags: u8) -> u8 {
        ((self as u8) << 4) | (flags & 0x0F)
    }
}

impl TryFrom<u8> for PacketType {
    type Error = crate::Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let packet_type = match value {
            1 => Self::Connect,
            2 => Self::ConnAck,
            3 => Self::Publish,
            4 => Self::PubAck,
            5 => Self::PubRec,
            6 => Self::PubRel,
            7 => Self::PubComp,
            8 => Self::Subscribe,
            9 => Self::SubAck,
            10 => Self::Unsubscribe,
            11 => Self::UnsubAck,
            12 => Self::PingReq,
            13 => Self::PingResp,
            14 => Self::Disconnect,
            _ => return Err(crate::Error::BadFormat),
        };

        Ok(packet_type)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) struct FixedHeader {
    pub(crate) packet_type: PacketType,
    pub(crate) flags: u8,
}

impl FixedHeader {
    pub(crate) fn parse(byte: u8) -> Result<Self, crate::Error> {
        Ok(Self {
            packet_type: PacketType::try_from(byte >> 4)?,
            flags: byte & 0x0F,
        })
    }

    /// Fails with `BadFormat` unless the header is of `packet_type` with
    /// that type's reserved flag pattern.
    pub(crate) fn ensure(&self, packet_type: PacketType) -> Result<(), crate::Error> {
        if self.packet_type != packet_type || !packet_type.validate_flags(self.flags) {
            return Err(crate::Error::BadFormat);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_flags() {
        assert!(PacketType::PubRel.validate_flags(0b0010));
        assert!(!PacketType::PubRel.validate_flags(0));
        assert!(PacketType::Subscribe.validate_flags(0b0010));
        assert!(PacketType::ConnAck.validate_flags(0));
        assert!(!PacketType::ConnAck.validate_flags(0b0001));
        assert!(PacketType::Publish.validate_flags(0b1011));
    }

    #[test]
    fn header_byte_layout() {
        assert_eq!(PacketType::Subscribe.header_byte(0b0010), 0x82);
        assert_eq!(PacketType::PubRel.header_byte(0b0010), 0x62);
        assert_eq!(PacketType::PingReq.header_byte(0), 0xC0);
        assert_eq!(PacketType::Disconnect.header_byte(0), 0xE0);
    }

    #[test]
    fn parse_rejects_reserved_types() {
        assert!(matches!(FixedHeader::parse(0x00), Err(crate::Error::BadFormat)));
        assert!(matches!(FixedHeader::parse(0xF0), Err(crate::Error::BadFormat)));

        let header = FixedHeader::parse(0x3B).unwrap();
        assert_eq!(header.packet_type, PacketType::Publish);
        assert_eq!(header.flags, 0b1011);
    }
}

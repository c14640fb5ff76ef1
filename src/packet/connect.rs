use crate::{
    packet::{
        QoS,
        decode,
        encode::{self, Encode},
    },
    protocol::{FixedHeader, PacketType},
};

/// Last-will message the broker publishes if the connection drops.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Will<'a> {
    pub qos: QoS,
    pub retain: bool,
    pub topic: &'a str,
    pub payload: &'a [u8],
}

#[derive(Debug)]
pub(crate) struct Connect<'a> {
    pub(crate) clean_session: bool,
    pub(crate) keep_alive: u16,
    pub(crate) client_id: &'a str,
    pub(crate) will: Option<&'a Will<'a>>,
    pub(crate) username: Option<&'a str>,
    pub(crate) password: Option<&'a [u8]>,
}

impl Connect<'_> {
    fn connect_flags(&self) -> u8 {
        (self.username.is_some() as u8) << 7
            | (self.password.is_some() as u8) << 6
            | (self.will.is_some_and(|w| w.retain) as u8) << 5
            | self.will.map(|w| w.qos as u8).unwrap_or(0) << 3 // 2 bits
            | (self.will.is_some() as u8) << 2
            | (self.clean_session as u8) << 1
    }
}

impl encode::EncodePacket for Connect<'_> {
    const PACKET_TYPE: PacketType = PacketType::Connect;

    fn flags(&self) -> u8 {
        0
    }

    fn required_space(&self) -> usize {
        // protocol name, level, connect flags, keep alive
        let mut required = "MQTT".required_space() + 1 + 1 + 2 + self.client_id.required_space();

        if let Some(will) = self.will {
            required += will.topic.required_space();
            required += will.payload.required_space();
        }

        if let Some(username) = &self.username {
            required += username.required_space();
        }

        if let Some(password) = &self.password {
            required += password.required_space();
        }

        required
    }

    fn encode_body(&self, cursor: &mut encode::Cursor) -> Result<(), crate::Error> {
        "MQTT".encode(cursor)?;
        // @note: MQTT v3.1.1
        4u8.encode(cursor)?;
        self.connect_flags().encode(cursor)?;
        self.keep_alive.encode(cursor)?;
        self.client_id.encode(cursor)?;

        if let Some(will) = self.will {
            will.topic.encode(cursor)?;
            will.payload.encode(cursor)?;
        }

        if let Some(username) = &self.username {
            username.encode(cursor)?;
        }

        if let Some(password) = &self.password {
            password.encode(cursor)?;
        }

        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ConnAck {
    pub(crate) session_present: bool,
    pub(crate) return_code: ConnectReturnCode,
}

impl ConnAck {
    pub(crate) fn decode(header: &FixedHeader, body: &[u8]) -> Result<Self, crate::Error> {
        header.ensure(PacketType::ConnAck)?;

        let cursor = &mut decode::Cursor::new(body);
        let flags = cursor.read_u8()?;

        if flags & 0b1111_1110 != 0 {
            return Err(crate::Error::BadFormat);
        }

        let return_code = ConnectReturnCode::try_from(cursor.read_u8()?)?;

        cursor.expect_empty()?;

        Ok(ConnAck {
            session_present: flags & 0b0000_0001 == 1,
            return_code,
        })
    }
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectReturnCode {
    Accepted = 0,
    UnacceptableProtocolVersion = 1,
    IdentifierRejected = 2,
    ServerUnavailable = 3,
    BadUserNameOrPassword = 4,
    NotAuthorized = 5,
}

impl TryFrom<u8> for ConnectReturnCode {
    type Error = crate::Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let code = match value {
            0 => Self::Accepted,
            1 => Self::UnacceptableProtocolVersion,
            2 => Self::IdentifierRejected,
            3 => Self::ServerUnavailable,
            4 => Self::BadUserNameOrPassword,
            5 => Self::NotAuthorized,
            _ => return Err(crate::Error::BadFormat),
        };

        Ok(code)
    }
}

use crate::{
    packet::{
        PacketId,
        encode::{self, Encode},
    },
    protocol::PacketType,
};

pub(crate) struct Unsubscribe<'a> {
    pub(crate) packet_id: PacketId,
    pub(crate) topics: &'a [&'a str],
}

impl encode::EncodePacket for Unsubscribe<'_> {
    const PACKET_TYPE: PacketType = PacketType::Unsubscribe;

    fn flags(&self) -> u8 {
        0b0010
    }

    fn required_space(&self) -> usize {
        let mut required = self.packet_id.required_space();

        for topic in self.topics {
            required += topic.required_space();
        }

        required
    }

    fn encode_body(&self, cursor: &mut encode::Cursor) -> Result<(), crate::Error> {
        self.packet_id.encode(cursor)?;

        for topic in self.topics {
            topic.encode(cursor)?;
        }

        Ok(())
    }
}

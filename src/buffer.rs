use crate::packet::decode;

/// Splits an encoded packet into its type/flags byte and body, skipping the
/// Remaining Length field.
pub(crate) fn split_packet(packet: &[u8]) -> Option<(u8, &[u8])> {
    let (&first, rest) = packet.split_first()?;
    let len = rest.iter().take(4).position(|byte| byte & 0x80 == 0)? + 1;

    Some((first, rest.get(len..)?))
}

/// Topic filters of a SUBSCRIBE or UNSUBSCRIBE still held in the queue,
/// read straight from the encoded payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Topics<'a> {
    payload: &'a [u8],
    with_qos: bool,
}

impl<'a> Topics<'a> {
    pub(crate) const fn subscribe(payload: &'a [u8]) -> Self {
        Self {
            payload,
            with_qos: true,
        }
    }

    pub(crate) const fn unsubscribe(payload: &'a [u8]) -> Self {
        Self {
            payload,
            with_qos: false,
        }
    }

    pub fn iter(&self) -> TopicsIter<'a> {
        TopicsIter {
            cursor: decode::Cursor::new(self.payload),
            with_qos: self.with_qos,
        }
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

impl<'a> IntoIterator for Topics<'a> {
    type Item = &'a str;
    type IntoIter = TopicsIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct TopicsIter<'a> {
    cursor: decode::Cursor<'a>,
    with_qos: bool,
}

impl<'a> TopicsIter<'a> {
    fn read_one(&mut self) -> Result<&'a str, crate::Error> {
        let topic = self.cursor.read_utf8()?;
        if self.with_qos {
            self.cursor.read_u8()?;
        }

        Ok(topic)
    }
}

impl<'a> Iterator for TopicsIter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor.is_empty() {
            return None;
        }

        match self.read_one() {
            Ok(topic) => Some(topic),
            Err(_) => {
                self.cursor.read_rest();
                None
            }
        }
    }
}

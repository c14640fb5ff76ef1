use alloc::vec::Vec;

use crate::protocol;

/// Largest value the four-byte Remaining Length field accepts here.
pub const MAX_REMAINING_LENGTH: u32 = 268_435_454;

pub(crate) trait EncodePacket {
    const PACKET_TYPE: protocol::PacketType;
    fn flags(&self) -> u8;
    fn required_space(&self) -> usize;
    fn encode_body(&self, cursor: &mut Cursor) -> Result<(), crate::Error>;

    /// Size of the whole packet, fixed header included.
    fn encoded_len(&self) -> Result<usize, crate::Error> {
        let body = remaining_length_value(self.required_space())?;
        Ok(1 + remaining_length_size(body)? + body as usize)
    }

    /// Size-then-write: an empty `dst` only reports the required length,
    /// otherwise the packet is written and the written length returned.
    fn encode(&self, dst: &mut [u8]) -> Result<usize, crate::Error> {
        let len = self.encoded_len()?;
        if dst.is_empty() {
            return Ok(len);
        }
        if dst.len() < len {
            return Err(crate::Error::BadInput);
        }

        let mut cursor = Cursor::new(dst);
        cursor.write_u8(Self::PACKET_TYPE.header_byte(self.flags()))?;
        remaining_length(self.required_space(), &mut cursor)?;
        self.encode_body(&mut cursor)?;

        Ok(cursor.pos)
    }

    fn to_vec(&self) -> Result<Vec<u8>, crate::Error> {
        let len = self.encoded_len()?;
        let mut buf = Vec::new();
        buf.try_reserve_exact(len)
            .map_err(|_| crate::Error::NoMemory)?;
        buf.resize(len, 0);

        self.encode(&mut buf)?;
        Ok(buf)
    }
}

pub(crate) trait Encode {
    fn encode(&self, cursor: &mut Cursor) -> Result<(), crate::Error>;
    fn required_space(&self) -> usize;
}

fn remaining_length_value(len: usize) -> Result<u32, crate::Error> {
    u32::try_from(len).map_err(|_| crate::Error::BadInput)
}

/// Number of bytes `value` occupies as a Remaining Length field.
pub fn remaining_length_size(value: u32) -> Result<usize, crate::Error> {
    match value {
        0..=127 => Ok(1),
        128..=16_383 => Ok(2),
        16_384..=2_097_151 => Ok(3),
        2_097_152..=MAX_REMAINING_LENGTH => Ok(4),
        _ => Err(crate::Error::BadInput),
    }
}

/// Writes `value` as a Remaining Length field into `dst`. An empty `dst` is
/// a size query.
pub fn encode_remaining_length(value: u32, dst: &mut [u8]) -> Result<usize, crate::Error> {
    let size = remaining_length_size(value)?;
    if dst.is_empty() {
        return Ok(size);
    }
    if dst.len() < size {
        return Err(crate::Error::BadInput);
    }

    let mut rest = value;
    for byte in dst.iter_mut().take(size) {
        let mut digit = (rest % 128) as u8;
        rest /= 128;

        if rest > 0 {
            digit |= 0x80;
        }

        *byte = digit;
    }

    Ok(size)
}

pub(super) fn remaining_length(len: usize, cursor: &mut Cursor) -> Result<usize, crate::Error> {
    let value = remaining_length_value(len)?;
    let mut buf = [0u8; 4];
    let size = encode_remaining_length(value, &mut buf)?;
    cursor.write_bytes(&buf[..size])?;

    Ok(size)
}

pub(crate) struct Cursor<'buf> {
    buf: &'buf mut [u8],
    pos: usize,
}

impl<'buf> Cursor<'buf> {
    pub(crate) const fn new(buf: &'buf mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    #[cfg(test)]
    pub(crate) fn written(&self) -> &[u8] {
        &self.buf[..self.pos]
    }

    pub(crate) fn write_u8(&mut self, byte: u8) -> Result<(), crate::Error> {
        self.ensure_remaining(1)?;
        self.buf[self.pos] = byte;
        self.pos += 1;

        Ok(())
    }

    fn write_u16(&mut self, value: u16) -> Result<(), crate::Error> {
        self.write_bytes(&value.to_be_bytes())
    }

    pub(crate) fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), crate::Error> {
        let len = bytes.len();
        self.ensure_remaining(len)?;

        self.buf[self.pos..self.pos + len].copy_from_slice(bytes);
        self.pos += len;

        Ok(())
    }

    pub(crate) fn write_binary_chunk(&mut self, bytes: &[u8]) -> Result<(), crate::Error> {
        let len = u16::try_from(bytes.len()).map_err(|_| crate::Error::BadInput)?;
        self.write_u16(len)?;
        self.write_bytes(bytes)
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn ensure_remaining(&self, n: usize) -> Result<(), crate::Error> {
        if self.remaining() < n {
            Err(crate::Error::BadInput)
        } else {
            Ok(())
        }
    }
}

impl Encode for u16 {
    fn encode(&self, cursor: &mut Cursor) -> Result<(), crate::Error> {
        cursor.write_u16(*self)
    }

    fn required_space(&self) -> usize {
        2
    }
}

impl Encode for u8 {
    fn encode(&self, cursor: &mut Cursor) -> Result<(), crate::Error> {
        cursor.write_u8(*self)
    }

    fn required_space(&self) -> usize {
        1
    }
}

impl Encode for &str {
    fn encode(&self, cursor: &mut Cursor) -> Result<(), crate::Error> {
        cursor.write_binary_chunk(self.as_bytes())
    }

    fn required_space(&self) -> usize {
        self.len() + 2
    }
}

impl Encode for &[u8] {
    fn encode(&self, cursor: &mut Cursor) -> Result<(), crate::Error> {
        cursor.write_binary_chunk(self)
    }

    fn required_space(&self) -> usize {
        self.len() + 2
    }
}

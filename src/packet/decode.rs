/// Result of feeding the bytes received so far to the Remaining Length
/// decoder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Progress {
    Done(u32),
    NeedMoreData,
}

/// Decodes a Remaining Length field from the first bytes after the packet
/// type byte. Only the last byte's continuation bit decides whether the
/// field is complete, so callers feed the field as it grows.
pub fn decode_remaining_length(bytes: &[u8]) -> Result<Progress, crate::Error> {
    let Some(last) = bytes.last() else {
        return Ok(Progress::NeedMoreData);
    };

    if last & 0x80 != 0 {
        return if bytes.len() >= 4 {
            Err(crate::Error::BadFormat)
        } else {
            Ok(Progress::NeedMoreData)
        };
    }

    if bytes.len() > 4 {
        return Err(crate::Error::BadFormat);
    }

    let value = bytes
        .iter()
        .rev()
        .fold(0u32, |acc, byte| (acc << 7) | u32::from(byte & 0x7F));

    Ok(Progress::Done(value))
}

pub(crate) struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) const fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, crate::Error> {
        self.ensure_remaining(1)?;
        let res = self.buf[self.pos];
        self.pos += 1;

        Ok(res)
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16, crate::Error> {
        self.ensure_remaining(2)?;
        let res = u16::from_be_bytes([self.buf[self.pos], self.buf[self.pos + 1]]);
        self.pos += 2;

        Ok(res)
    }

    pub(crate) fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], crate::Error> {
        self.ensure_remaining(len)?;
        let res = &self.buf[self.pos..self.pos + len];
        self.pos += len;

        Ok(res)
    }

    pub(crate) fn read_binary_chunk(&mut self) -> Result<&'a [u8], crate::Error> {
        let len = self.read_u16()? as usize;
        self.read_bytes(len)
    }

    pub(crate) fn read_utf8(&mut self) -> Result<&'a str, crate::Error> {
        let bytes = self.read_binary_chunk()?;

        core::str::from_utf8(bytes).map_err(|_| crate::Error::BadFormat)
    }

    pub(crate) fn read_rest(&mut self) -> &'a [u8] {
        let res = &self.buf[self.pos..];
        self.pos = self.buf.len();

        res
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub(crate) fn expect_empty(&self) -> Result<(), crate::Error> {
        if !self.is_empty() {
            Err(crate::Error::BadFormat)
        } else {
            Ok(())
        }
    }

    fn ensure_remaining(&self, n: usize) -> Result<(), crate::Error> {
        if self.remaining() < n {
            Err(crate::Error::BadFormat)
        } else {
            Ok(())
        }
    }
}

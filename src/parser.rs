use alloc::vec::Vec;

use crate::{
    packet::{
        Packet,
        decode::{self, Progress},
    },
    protocol::{FixedHeader, MAX_HEADER_SIZE},
};

/// A complete inbound packet, detached from the parser.
#[derive(Debug)]
pub(crate) struct Frame {
    first: u8,
    body: Vec<u8>,
}

impl Frame {
    pub(crate) fn decode(&self) -> Result<Packet<'_>, crate::Error> {
        let header = FixedHeader::parse(self.first)?;
        Packet::decode(&header, &self.body)
    }
}

/// Collects inbound bytes one at a time: first the fixed header until its
/// Remaining Length field terminates, then exactly that many body bytes.
#[derive(Debug, Default)]
pub(crate) struct Parser {
    header: heapless::Vec<u8, MAX_HEADER_SIZE>,
    remaining: Option<usize>,
    body: Vec<u8>,
}

impl Parser {
    pub(crate) fn reset(&mut self) {
        self.header.clear();
        self.remaining = None;
        self.body = Vec::new();
    }

    #[cfg(test)]
    pub(crate) fn is_idle(&self) -> bool {
        self.header.is_empty() && self.remaining.is_none() && self.body.capacity() == 0
    }

    /// Feeds one byte. Returns the finished frame once the last body byte
    /// arrives. Any error discards what was collected so far.
    pub(crate) fn push(&mut self, byte: u8) -> Result<Option<Frame>, crate::Error> {
        let result = self.accept(byte);

        if !matches!(result, Ok(None)) {
            self.reset();
        }

        result
    }

    fn accept(&mut self, byte: u8) -> Result<Option<Frame>, crate::Error> {
        let remaining = match self.remaining {
            Some(remaining) => {
                self.body.push(byte);
                remaining
            }
            None => {
                self.header.push(byte).map_err(|_| crate::Error::BadFormat)?;

                let len_bytes = self.header.get(1..).unwrap_or_default();
                match decode::decode_remaining_length(len_bytes)? {
                    Progress::NeedMoreData => return Ok(None),
                    Progress::Done(len) => {
                        let len = len as usize;
                        self.body
                            .try_reserve_exact(len)
                            .map_err(|_| crate::Error::NoMemory)?;
                        self.remaining = Some(len);
                        len
                    }
                }
            }
        };

        if self.body.len() < remaining {
            return Ok(None);
        }

        let first = self.header.first().copied().ok_or(crate::Error::UnexpectedError)?;

        Ok(Some(Frame {
            first,
            body: core::mem::take(&mut self.body),
        }))
    }
}

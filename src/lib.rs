#![no_std]

extern crate alloc;

// must go first, the logging macros are used by every other module
mod fmt;

pub mod buffer;
pub mod client;
pub mod config;
pub mod packet;
pub(crate) mod parser;
pub mod protocol;
pub(crate) mod queue;
pub mod session;
#[cfg(feature = "embassy")]
pub mod time;
pub(crate) mod timer;

pub use buffer::Topics;
pub use client::Client;
pub use config::Config;
pub use packet::connect::{ConnectReturnCode, Will};
pub use packet::publish::{Message, Publish};
pub use packet::subscribe::{SubAckReturnCode, Subscription};
pub use packet::{PacketId, QoS};
pub use session::{Event, Handler, OpenStatus, Outcome, Status};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Internal invariant broken, e.g. a session-built packet failed to
    /// encode.
    UnexpectedError,
    BadInput,
    NoMemory,
    /// Operation not allowed in the current session status.
    BadSequence,
    /// Malformed inbound bytes.
    BadFormat,
    /// [`Handler::write`] failed.
    CallbackError,
}

impl Error {
    /// Stable numeric code for embedders bridging to C-style status values.
    pub const fn code(self) -> i32 {
        match self {
            Self::UnexpectedError => -1,
            Self::BadInput => -2,
            Self::NoMemory => -3,
            Self::BadSequence => -4,
            Self::BadFormat => -5,
            Self::CallbackError => -6,
        }
    }
}

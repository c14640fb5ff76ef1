use crate::packet::connect::Will;

const MAX_STRING_LEN: usize = u16::MAX as usize;

/// Identity and session settings, fixed for the lifetime of a client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config<'a> {
    pub client_id: &'a str,
    pub clean_session: bool,
    /// Seconds, 0 disables keep-alive.
    pub keep_alive: u16,
    /// Seconds between retransmissions of an unacknowledged packet. With 0
    /// a packet stays queued until acknowledged or the session is cleaned.
    pub retry_interval: u16,
    /// Retransmissions before the packet is given up with a timeout.
    pub retry_count: u32,
    pub will: Option<Will<'a>>,
    pub username: Option<&'a str>,
    pub password: Option<&'a [u8]>,
}

impl<'a> Config<'a> {
    pub const fn new(client_id: &'a str) -> Self {
        Self {
            client_id,
            clean_session: true,
            keep_alive: 10,
            retry_interval: 5,
            retry_count: 3,
            will: None,
            username: None,
            password: None,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), crate::Error> {
        if self.client_id.is_empty() && !self.clean_session {
            return Err(crate::Error::BadInput);
        }

        if let Some(will) = &self.will {
            validate_topic_name(will.topic)?;
            if will.payload.len() > MAX_STRING_LEN {
                return Err(crate::Error::BadInput);
            }
        }

        if self.password.is_some() && self.username.is_none() {
            return Err(crate::Error::BadInput);
        }

        let too_long = self.client_id.len() > MAX_STRING_LEN
            || self.username.is_some_and(|u| u.len() > MAX_STRING_LEN)
            || self.password.is_some_and(|p| p.len() > MAX_STRING_LEN);

        if too_long {
            return Err(crate::Error::BadInput);
        }

        Ok(())
    }

    pub(crate) fn keep_alive_ms(&self) -> u32 {
        u32::from(self.keep_alive) * 1000
    }
}

/// Topic names (as opposed to filters) must be non-empty and wildcard-free.
pub(crate) fn validate_topic_name(topic: &str) -> Result<(), crate::Error> {
    if topic.contains(['+', '#']) {
        return Err(crate::Error::BadInput);
    }

    validate_topic_filter(topic)
}

pub(crate) fn validate_topic_filter(topic: &str) -> Result<(), crate::Error> {
    if topic.is_empty() || topic.len() > MAX_STRING_LEN {
        return Err(crate::Error::BadInput);
    }

    Ok(())
}

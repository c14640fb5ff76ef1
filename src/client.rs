use embedded_time::duration::Milliseconds;

use crate::{
    config::{self, Config},
    packet::{PacketId, QoS, publish::Message, subscribe::Subscription},
    session::{Handler, OpenStatus, Session, Status},
};

/// MQTT v3.1.1 client engine. Owns the session state and the embedder's
/// [`Handler`]; all I/O goes through the handler, all time comes from the
/// caller.
///
/// `Q` bounds the number of packets awaiting acknowledgement.
pub struct Client<'a, H: Handler, const Q: usize = 16> {
    session: Session<'a, Q>,
    handler: H,
}

impl<'a, H: Handler, const Q: usize> Client<'a, H, Q> {
    pub fn try_new(config: Config<'a>, handler: H) -> Result<Self, crate::Error> {
        const { assert!(Q > 0 && Q < u16::MAX as usize) };

        config.validate().inspect_err(|_| warn!("invalid client config"))?;

        Ok(Self {
            session: Session::new(config),
            handler,
        })
    }

    pub fn status(&self) -> Status {
        self.session.status()
    }

    /// Packets still waiting for an acknowledgement.
    pub fn pending(&self) -> usize {
        self.session.pending()
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Resets all runtime state. Anything still pending from a previous
    /// run is reported as `Outcome::Cancel`.
    pub fn start(&mut self, now: Milliseconds<u32>) {
        self.session.start(&mut self.handler, now.0);
    }

    /// Cancels every pending operation and disconnects if connected.
    pub fn stop(&mut self) -> Result<(), crate::Error> {
        self.session.stop(&mut self.handler)
    }

    /// Sends CONNECT. The result arrives as [`crate::Event::Opened`] unless
    /// the client is already connected.
    pub fn open(&mut self, timeout: Milliseconds<u32>) -> Result<OpenStatus, crate::Error> {
        self.ensure_started()?;
        self.session.open(&mut self.handler, timeout.0)
    }

    pub fn close(&mut self) -> Result<(), crate::Error> {
        self.ensure_started()?;
        self.session.close(&mut self.handler)
    }

    /// Connects with a clean session to discard the broker's state, then
    /// returns to `Open`. Used after an `Outcome::NeedReset`.
    pub fn reset(&mut self, timeout: Milliseconds<u32>) -> Result<(), crate::Error> {
        self.ensure_started()?;
        self.session.reset(&mut self.handler, timeout.0)
    }

    pub fn subscribe(&mut self, topics: &[Subscription<'_>]) -> Result<PacketId, crate::Error> {
        self.ensure_started()?;

        if topics.is_empty() {
            return Err(crate::Error::BadInput);
        }
        for topic in topics {
            config::validate_topic_filter(topic.topic_filter)?;
        }

        self.session.subscribe(&mut self.handler, topics)
    }

    pub fn unsubscribe(&mut self, topics: &[&str]) -> Result<PacketId, crate::Error> {
        self.ensure_started()?;

        if topics.is_empty() {
            return Err(crate::Error::BadInput);
        }
        for topic in topics {
            config::validate_topic_filter(topic)?;
        }

        self.session.unsubscribe(&mut self.handler, topics)
    }

    /// Returns the packet identifier for QoS 1 and 2. QoS 0 messages are
    /// written immediately and never reported back.
    pub fn publish(
        &mut self,
        message: Message<'_>,
        qos: QoS,
        retain: bool,
    ) -> Result<Option<PacketId>, crate::Error> {
        self.ensure_started()?;
        config::validate_topic_name(message.topic)?;

        self.session.publish(&mut self.handler, message, qos, retain)
    }

    pub fn ping(&mut self) -> Result<(), crate::Error> {
        self.ensure_started()?;
        self.session.ping(&mut self.handler)
    }

    /// Feeds bytes received from the transport. Processing stops at the
    /// first error; a `BadFormat` leaves the receive state clean.
    pub fn read(&mut self, data: &[u8]) -> Result<(), crate::Error> {
        self.ensure_started()?;

        if data.is_empty() {
            return Err(crate::Error::BadInput);
        }

        self.session.read(&mut self.handler, data)
    }

    /// Periodic tick driving timeouts, keep-alive and retransmissions.
    /// Does nothing before `start`.
    pub fn continue_tick(&mut self, now: Milliseconds<u32>) -> Result<(), crate::Error> {
        self.session.tick(&mut self.handler, now.0)
    }

    fn ensure_started(&self) -> Result<(), crate::Error> {
        match self.session.status() {
            Status::Stopped => Err(crate::Error::BadInput),
            _ => Ok(()),
        }
    }
}

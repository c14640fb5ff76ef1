use alloc::vec::Vec;

use crate::{
    buffer::Topics,
    config::Config,
    packet::{
        Disconnect, Packet, PacketId, PingReq, PubAck, PubComp, PubRec, PubRel, QoS,
        connect::{ConnAck, Connect, ConnectReturnCode},
        encode::EncodePacket,
        publish::{Flags, Message, Publish},
        subscribe::{SubAck, SubAckReturnCode, Subscribe, Subscription},
        unsubscribe::Unsubscribe,
    },
    parser::{Frame, Parser},
    protocol::PacketType,
    queue::{Entry, Queue, RetryPolicy, Sweep, View},
    timer::{self, Countdown},
};

/// Embedder side of the session: the outbound byte sink and the receiver
/// of every notification.
pub trait Handler {
    type Error: core::fmt::Debug;

    fn write(&mut self, data: &[u8]) -> Result<(), Self::Error>;

    fn on_event(&mut self, event: Event<'_>);
}

/// How an open, reset or pending operation ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Outcome {
    Complete,
    Timeout,
    Cancel,
    /// Broker and client disagree on whether a session exists. The
    /// embedder should close and reset.
    NeedReset,
}

#[derive(Debug)]
pub enum Event<'a> {
    Opened {
        result: Outcome,
        /// `None` when no CONNACK arrived in time.
        return_code: Option<ConnectReturnCode>,
        session_present: bool,
    },
    Received(Publish<'a>),
    PingResponse,
    Subscribed {
        result: Outcome,
        packet_id: PacketId,
        topics: Topics<'a>,
        /// Empty unless `result` is `Complete`.
        return_codes: &'a [SubAckReturnCode],
    },
    Unsubscribed {
        result: Outcome,
        packet_id: PacketId,
        topics: Topics<'a>,
    },
    Published {
        result: Outcome,
        packet_id: PacketId,
        message: Message<'a>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Status {
    Stopped,
    Open,
    Connecting,
    Connected,
    Resetting,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OpenStatus {
    /// CONNECT is out, `Event::Opened` follows.
    Pending,
    /// Nothing sent and nothing will be notified.
    AlreadyConnected,
}

pub(crate) struct Session<'a, const Q: usize> {
    config: Config<'a>,
    status: Status,
    timer: Countdown,
    last_tick: u32,
    parser: Parser,
    queue: Queue<Q>,
}

impl<'a, const Q: usize> Session<'a, Q> {
    pub(crate) fn new(config: Config<'a>) -> Self {
        Self {
            config,
            status: Status::Stopped,
            timer: Countdown::default(),
            last_tick: 0,
            parser: Parser::default(),
            queue: Queue::new(0),
        }
    }

    pub(crate) fn status(&self) -> Status {
        self.status
    }

    pub(crate) fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Anything still pending from a previous run is cancelled first.
    pub(crate) fn start<H: Handler>(&mut self, handler: &mut H, now: u32) {
        self.clean_session(handler);
        self.parser.reset();
        self.timer.cancel();
        self.last_tick = now;
        self.queue.reset(now);
        self.status = Status::Open;

        debug!("session started");
    }

    pub(crate) fn stop<H: Handler>(&mut self, handler: &mut H) -> Result<(), crate::Error> {
        let result = match self.status {
            Status::Open => {
                self.clean_session(handler);
                Ok(())
            }
            Status::Connecting | Status::Connected | Status::Resetting => {
                self.clean_session(handler);
                send(handler, &Disconnect)
            }
            Status::Stopped => return Err(crate::Error::UnexpectedError),
        };

        self.parser.reset();
        self.timer.cancel();
        self.last_tick = 0;
        self.queue.reset(0);
        self.status = Status::Stopped;

        debug!("session stopped");
        result
    }

    pub(crate) fn open<H: Handler>(
        &mut self,
        handler: &mut H,
        timeout: u32,
    ) -> Result<OpenStatus, crate::Error> {
        match self.status {
            Status::Open => {
                self.connect(handler, self.config.clean_session)?;
                self.status = Status::Connecting;
                self.timer.arm(timeout);

                debug!("CONNECT sent, waiting {} ms", timeout);
                Ok(OpenStatus::Pending)
            }
            Status::Connecting => Ok(OpenStatus::Pending),
            Status::Connected => Ok(OpenStatus::AlreadyConnected),
            Status::Resetting => Err(crate::Error::BadSequence),
            Status::Stopped => Err(crate::Error::UnexpectedError),
        }
    }

    pub(crate) fn close<H: Handler>(&mut self, handler: &mut H) -> Result<(), crate::Error> {
        match self.status {
            Status::Open => return Ok(()),
            Status::Stopped => return Err(crate::Error::UnexpectedError),
            Status::Connecting | Status::Connected | Status::Resetting => {}
        }

        if self.config.clean_session {
            self.clean_session(handler);
        } else {
            let retry_count = self.config.retry_count;
            self.queue
                .for_each(|entry| entry.mark_for_resend(retry_count));
        }

        let result = send(handler, &Disconnect);

        self.parser.reset();
        self.timer.cancel();
        self.status = Status::Open;

        debug!("session closed, {} pending", self.queue.len());
        result
    }

    pub(crate) fn reset<H: Handler>(
        &mut self,
        handler: &mut H,
        timeout: u32,
    ) -> Result<(), crate::Error> {
        match self.status {
            Status::Open => {
                self.clean_session(handler);
                self.connect(handler, true)?;
                self.status = Status::Resetting;
                self.timer.arm(timeout);

                debug!("clean CONNECT sent, waiting {} ms", timeout);
                Ok(())
            }
            Status::Connecting | Status::Connected => Err(crate::Error::BadSequence),
            Status::Resetting => Ok(()),
            Status::Stopped => Err(crate::Error::UnexpectedError),
        }
    }

    pub(crate) fn subscribe<H: Handler>(
        &mut self,
        handler: &mut H,
        topics: &[Subscription<'_>],
    ) -> Result<PacketId, crate::Error> {
        self.ensure_active()?;

        let packet_id = self.reserve_packet_id()?;
        self.track(handler, &Subscribe { packet_id, topics }, packet_id)?;

        Ok(packet_id)
    }

    pub(crate) fn unsubscribe<H: Handler>(
        &mut self,
        handler: &mut H,
        topics: &[&str],
    ) -> Result<PacketId, crate::Error> {
        self.ensure_active()?;

        let packet_id = self.reserve_packet_id()?;
        self.track(handler, &Unsubscribe { packet_id, topics }, packet_id)?;

        Ok(packet_id)
    }

    pub(crate) fn publish<H: Handler>(
        &mut self,
        handler: &mut H,
        message: Message<'_>,
        qos: QoS,
        retain: bool,
    ) -> Result<Option<PacketId>, crate::Error> {
        self.ensure_active()?;

        let flags = Flags {
            dup: false,
            qos,
            retain,
        };

        if qos == QoS::AtMostOnce {
            let packet = Publish {
                flags,
                topic: message.topic,
                packet_id: None,
                payload: message.payload,
            };
            send(handler, &packet)?;
            return Ok(None);
        }

        let packet_id = self.reserve_packet_id()?;
        let packet = Publish {
            flags,
            topic: message.topic,
            packet_id: Some(packet_id),
            payload: message.payload,
        };
        self.track(handler, &packet, packet_id)?;

        Ok(Some(packet_id))
    }

    pub(crate) fn ping<H: Handler>(&mut self, handler: &mut H) -> Result<(), crate::Error> {
        self.ensure_active()?;
        send(handler, &PingReq)
    }

    /// Feeds received bytes. Stops at the first failing byte.
    pub(crate) fn read<H: Handler>(
        &mut self,
        handler: &mut H,
        data: &[u8],
    ) -> Result<(), crate::Error> {
        for &byte in data {
            self.ensure_active()?;

            if let Some(frame) = self.parser.push(byte)? {
                self.dispatch(handler, &frame)?;
            }
        }

        Ok(())
    }

    /// Drives the CONNACK deadline, keep-alive and retransmissions. Only a
    /// failed keep-alive PINGREQ is reported.
    pub(crate) fn tick<H: Handler>(&mut self, handler: &mut H, now: u32) -> Result<(), crate::Error> {
        let elapsed = timer::elapsed(self.last_tick, now);
        let mut result = Ok(());

        match self.status {
            Status::Stopped => return Ok(()),
            Status::Open => {
                self.last_tick = now;
                return Ok(());
            }
            Status::Connecting | Status::Resetting => {
                if self.timer.advance(elapsed) {
                    info!("no CONNACK within deadline");

                    self.status = Status::Open;
                    self.parser.reset();
                    self.timer.cancel();
                    if self.config.clean_session {
                        self.clean_session(handler);
                    }

                    handler.on_event(Event::Opened {
                        result: Outcome::Timeout,
                        return_code: None,
                        session_present: false,
                    });
                }
            }
            Status::Connected => {
                if self.config.keep_alive > 0 && self.timer.advance(elapsed) {
                    self.timer.arm(self.config.keep_alive_ms());
                    trace!("keep-alive PINGREQ");
                    result = send(handler, &PingReq);
                }
            }
        }

        self.last_tick = now;
        self.queue.process(now, |sweep| match sweep {
            Sweep::Retry(entry) => {
                trace!("retransmitting {}", entry.packet_id().get());
                if handler.write(entry.packet()).is_err() {
                    warn!("retransmission of {} failed", entry.packet_id().get());
                }
            }
            Sweep::Expire(entry) => {
                info!("{} out of retries", entry.packet_id().get());
                notify(handler, &entry, Outcome::Timeout);
            }
        });

        result
    }

    fn ensure_active(&self) -> Result<(), crate::Error> {
        match self.status {
            Status::Connecting | Status::Connected | Status::Resetting => Ok(()),
            Status::Open => Err(crate::Error::BadSequence),
            Status::Stopped => Err(crate::Error::UnexpectedError),
        }
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            interval: u32::from(self.config.retry_interval) * 1000,
            count: self.config.retry_count,
        }
    }

    fn reserve_packet_id(&mut self) -> Result<PacketId, crate::Error> {
        if self.queue.is_full() {
            warn!("pending queue full");
            return Err(crate::Error::NoMemory);
        }

        Ok(self.queue.next_packet_id())
    }

    fn connect<H: Handler>(&self, handler: &mut H, clean_session: bool) -> Result<(), crate::Error> {
        let connect = Connect {
            clean_session,
            keep_alive: self.config.keep_alive,
            client_id: self.config.client_id,
            will: self.config.will.as_ref(),
            username: self.config.username,
            password: self.config.password,
        };

        send(handler, &connect)
    }

    /// Queues a packet that expects an acknowledgement, then sends it. The
    /// entry stays queued even if the write fails, the sweep resends it.
    fn track<H: Handler, P: EncodePacket>(
        &mut self,
        handler: &mut H,
        packet: &P,
        packet_id: PacketId,
    ) -> Result<(), crate::Error> {
        let entry = Entry::new(packet_id, encode(packet)?, self.retry_policy());
        let handle = self.queue.push(entry).map_err(|_| crate::Error::NoMemory)?;

        if let Some(entry) = self.queue.get_mut(handle) {
            if handler.write(entry.packet()).is_err() {
                warn!("sending {:?} {} failed", P::PACKET_TYPE, packet_id.get());
            }
            entry.mark_duplicate();
        }

        Ok(())
    }

    fn clean_session<H: Handler>(&mut self, handler: &mut H) {
        while let Some(entry) = self.queue.pop() {
            notify(handler, &entry, Outcome::Cancel);
        }
    }

    fn dispatch<H: Handler>(&mut self, handler: &mut H, frame: &Frame) -> Result<(), crate::Error> {
        let packet = frame
            .decode()
            .inspect_err(|err| warn!("malformed packet: {:?}", err))?;

        match packet {
            Packet::ConnAck(connack) => self.on_connack(handler, connack),
            Packet::Publish(publish) => self.on_publish(handler, publish),
            Packet::PubAck(id) => {
                if let Some(entry) = self.take_publish(id, QoS::AtLeastOnce) {
                    notify(handler, &entry, Outcome::Complete);
                }
                Ok(())
            }
            Packet::PubRec(id) => self.on_pubrec(handler, id),
            Packet::PubRel(id) => {
                if let Some(handle) = self.queue.search(id, PacketType::PubRec) {
                    self.queue.slice(handle);
                }
                send(handler, &PubComp(id))
            }
            Packet::PubComp(id) => {
                match self.queue.search(id, PacketType::PubRel) {
                    Some(handle) => {
                        self.queue.slice(handle);
                    }
                    None => debug!("PUBCOMP for unknown {}", id.get()),
                }
                Ok(())
            }
            Packet::SubAck(suback) => {
                self.on_suback(handler, suback);
                Ok(())
            }
            Packet::UnsubAck(id) => {
                let entry = self
                    .queue
                    .search(id, PacketType::Unsubscribe)
                    .and_then(|handle| self.queue.slice(handle));
                if let Some(entry) = entry {
                    notify(handler, &entry, Outcome::Complete);
                }
                Ok(())
            }
            Packet::PingResp => {
                handler.on_event(Event::PingResponse);
                Ok(())
            }
        }
    }

    fn on_connack<H: Handler>(
        &mut self,
        handler: &mut H,
        connack: ConnAck,
    ) -> Result<(), crate::Error> {
        if self.status == Status::Connected {
            return Err(crate::Error::BadSequence);
        }

        // pending entries are only meaningful if the broker kept the session
        let result = if connack.session_present == self.queue.is_empty() {
            Outcome::NeedReset
        } else {
            Outcome::Complete
        };

        if self.status == Status::Resetting {
            self.status = Status::Open;
            self.timer.cancel();
        } else if connack.return_code == ConnectReturnCode::Accepted && result == Outcome::Complete
        {
            self.status = Status::Connected;
            self.timer.arm(self.config.keep_alive_ms());
        } else {
            self.status = Status::Open;
            self.timer.cancel();
        }

        debug!(
            "CONNACK {:?} ({:?}), now {:?}",
            connack.return_code, result, self.status
        );

        handler.on_event(Event::Opened {
            result,
            return_code: Some(connack.return_code),
            session_present: connack.session_present,
        });

        Ok(())
    }

    fn on_publish<H: Handler>(
        &mut self,
        handler: &mut H,
        publish: Publish<'_>,
    ) -> Result<(), crate::Error> {
        match (publish.flags.qos, publish.packet_id) {
            (QoS::AtLeastOnce, Some(id)) => send(handler, &PubAck(id))?,
            (QoS::ExactlyOnce, Some(id)) => {
                if self.queue.search(id, PacketType::PubRec).is_some() {
                    debug!("retransmitted PUBLISH {} already received", id.get());
                    return Ok(());
                }
                self.track(handler, &PubRec(id), id)?;
            }
            _ => {}
        }

        handler.on_event(Event::Received(publish));
        Ok(())
    }

    fn on_pubrec<H: Handler>(&mut self, handler: &mut H, id: PacketId) -> Result<(), crate::Error> {
        let Some(entry) = self.take_publish(id, QoS::ExactlyOnce) else {
            return Ok(());
        };

        let result = self.track(handler, &PubRel(id), id);
        notify(handler, &entry, Outcome::Complete);

        result
    }

    fn on_suback<H: Handler>(&mut self, handler: &mut H, suback: SubAck) {
        let Some(handle) = self.queue.search(suback.packet_id, PacketType::Subscribe) else {
            debug!("SUBACK for unknown {}", suback.packet_id.get());
            return;
        };

        let topic_count = match self.queue.get(handle).map(Entry::view) {
            Some(View::Subscribe(topics)) => topics.len(),
            _ => 0,
        };

        if topic_count != suback.return_codes.len() {
            warn!(
                "SUBACK {} carries {} codes for {} topics",
                suback.packet_id.get(),
                suback.return_codes.len(),
                topic_count
            );
            return;
        }

        let Some(entry) = self.queue.slice(handle) else {
            return;
        };

        if let View::Subscribe(topics) = entry.view() {
            handler.on_event(Event::Subscribed {
                result: Outcome::Complete,
                packet_id: suback.packet_id,
                topics,
                return_codes: &suback.return_codes,
            });
        }
    }

    /// Removes the PUBLISH an ack refers to, provided it was sent with the
    /// QoS that ack belongs to.
    fn take_publish(&mut self, id: PacketId, qos: QoS) -> Option<Entry> {
        let Some(handle) = self.queue.search(id, PacketType::Publish) else {
            debug!("ack for unknown PUBLISH {}", id.get());
            return None;
        };

        if self.queue.get(handle)?.qos() != Some(qos) {
            warn!("ack for PUBLISH {} does not match its QoS", id.get());
            return None;
        }

        self.queue.slice(handle)
    }
}

fn encode<P: EncodePacket>(packet: &P) -> Result<Vec<u8>, crate::Error> {
    packet.to_vec().map_err(|err| match err {
        crate::Error::NoMemory => crate::Error::NoMemory,
        _ => crate::Error::UnexpectedError,
    })
}

fn send<H: Handler, P: EncodePacket>(handler: &mut H, packet: &P) -> Result<(), crate::Error> {
    let bytes = encode(packet)?;

    handler.write(&bytes).map_err(|_| {
        warn!("sending {:?} failed", P::PACKET_TYPE);
        crate::Error::CallbackError
    })
}

/// Reports the end of a pending operation. Acks held for the broker
/// (PUBREC, PUBREL) have nobody to tell.
fn notify<H: Handler>(handler: &mut H, entry: &Entry, result: Outcome) {
    let packet_id = entry.packet_id();

    match entry.view() {
        View::Subscribe(topics) => handler.on_event(Event::Subscribed {
            result,
            packet_id,
            topics,
            return_codes: &[],
        }),
        View::Unsubscribe(topics) => handler.on_event(Event::Unsubscribed {
            result,
            packet_id,
            topics,
        }),
        View::Publish(message) => handler.on_event(Event::Published {
            result,
            packet_id,
            message,
        }),
        View::Ack => {}
    }
}

#[cfg(test)]
mod tests {
    use alloc::{
        string::{String, ToString},
        vec,
        vec::Vec,
    };

    use super::*;

    #[derive(Debug, PartialEq)]
    enum Note {
        Opened(Outcome, Option<ConnectReturnCode>, bool),
        Received(String, Vec<u8>, QoS),
        Pong,
        Subscribed(Outcome, u16, Vec<String>, Vec<SubAckReturnCode>),
        Unsubscribed(Outcome, u16, Vec<String>),
        Published(Outcome, u16, String),
    }

    #[derive(Debug, PartialEq)]
    enum Record {
        Sent(Vec<u8>),
        Event(Note),
    }

    #[derive(Default)]
    struct Recorder {
        log: Vec<Record>,
        fail_writes: bool,
    }

    impl Recorder {
        fn sent(&self) -> Vec<&[u8]> {
            self.log
                .iter()
                .filter_map(|record| match record {
                    Record::Sent(bytes) => Some(bytes.as_slice()),
                    Record::Event(_) => None,
                })
                .collect()
        }

        fn last_sent(&self) -> Option<&[u8]> {
            self.sent().last().copied()
        }

        fn notes(&self) -> Vec<&Note> {
            self.log
                .iter()
                .filter_map(|record| match record {
                    Record::Event(note) => Some(note),
                    Record::Sent(_) => None,
                })
                .collect()
        }

        fn clear(&mut self) {
            self.log.clear();
        }
    }

    fn names(topics: Topics<'_>) -> Vec<String> {
        topics.iter().map(ToString::to_string).collect()
    }

    impl Handler for Recorder {
        type Error = ();

        fn write(&mut self, data: &[u8]) -> Result<(), Self::Error> {
            if self.fail_writes {
                return Err(());
            }
            self.log.push(Record::Sent(data.to_vec()));
            Ok(())
        }

        fn on_event(&mut self, event: Event<'_>) {
            let note = match event {
                Event::Opened {
                    result,
                    return_code,
                    session_present,
                } => Note::Opened(result, return_code, session_present),
                Event::Received(publish) => Note::Received(
                    publish.topic.to_string(),
                    publish.payload.to_vec(),
                    publish.flags.qos,
                ),
                Event::PingResponse => Note::Pong,
                Event::Subscribed {
                    result,
                    packet_id,
                    topics,
                    return_codes,
                } => Note::Subscribed(result, packet_id.get(), names(topics), return_codes.to_vec()),
                Event::Unsubscribed {
                    result,
                    packet_id,
                    topics,
                } => Note::Unsubscribed(result, packet_id.get(), names(topics)),
                Event::Published {
                    result,
                    packet_id,
                    message,
                } => Note::Published(result, packet_id.get(), message.topic.to_string()),
            };
            self.log.push(Record::Event(note));
        }
    }

    const CONNACK: [u8; 4] = [0x20, 0x02, 0x00, 0x00];
    const CONNACK_PRESENT: [u8; 4] = [0x20, 0x02, 0x01, 0x00];

    fn session(config: Config<'static>) -> (Session<'static, 4>, Recorder) {
        let mut session = Session::new(config);
        let mut handler = Recorder::default();
        session.start(&mut handler, 0);
        (session, handler)
    }

    fn connected(config: Config<'static>) -> (Session<'static, 4>, Recorder) {
        let (mut session, mut handler) = session(config);
        session.open(&mut handler, 1000).unwrap();
        session.read(&mut handler, &CONNACK).unwrap();
        assert_eq!(session.status(), Status::Connected);
        handler.clear();
        (session, handler)
    }

    fn publish(session: &mut Session<'static, 4>, handler: &mut Recorder, qos: QoS) -> u16 {
        session
            .publish(handler, Message::new("t", b"m"), qos, false)
            .unwrap()
            .map_or(0, PacketId::get)
    }

    #[test]
    fn open_sends_connect() {
        let (mut session, mut handler) = session(Config::new("c"));

        assert_eq!(session.open(&mut handler, 1000), Ok(OpenStatus::Pending));
        assert_eq!(session.status(), Status::Connecting);
        assert_eq!(handler.last_sent().map(|bytes| bytes[0]), Some(0x10));

        // a second open while waiting sends nothing
        assert_eq!(session.open(&mut handler, 1000), Ok(OpenStatus::Pending));
        assert_eq!(handler.sent().len(), 1);

        session.read(&mut handler, &CONNACK).unwrap();
        assert_eq!(session.status(), Status::Connected);
        assert_eq!(
            handler.notes(),
            [&Note::Opened(Outcome::Complete, Some(ConnectReturnCode::Accepted), false)]
        );
        assert_eq!(session.open(&mut handler, 1000), Ok(OpenStatus::AlreadyConnected));
    }

    #[test]
    fn refused_connack_returns_to_open() {
        let (mut session, mut handler) = session(Config::new("c"));
        session.open(&mut handler, 1000).unwrap();

        session.read(&mut handler, &[0x20, 0x02, 0x00, 0x05]).unwrap();

        assert_eq!(session.status(), Status::Open);
        assert_eq!(
            handler.notes(),
            [&Note::Opened(Outcome::Complete, Some(ConnectReturnCode::NotAuthorized), false)]
        );
    }

    #[test]
    fn pending_queue_without_broker_session_needs_reset() {
        let config = Config {
            clean_session: false,
            ..Config::new("c")
        };
        let (mut session, mut handler) = session(config);
        session.open(&mut handler, 1000).unwrap();
        publish(&mut session, &mut handler, QoS::AtLeastOnce);

        session.read(&mut handler, &CONNACK).unwrap();

        assert_eq!(session.status(), Status::Open);
        assert_eq!(
            handler.notes(),
            [&Note::Opened(Outcome::NeedReset, Some(ConnectReturnCode::Accepted), false)]
        );
    }

    #[test]
    fn broker_session_without_pending_queue_needs_reset() {
        let (mut session, mut handler) = session(Config::new("c"));
        session.open(&mut handler, 1000).unwrap();

        session.read(&mut handler, &CONNACK_PRESENT).unwrap();

        assert_eq!(session.status(), Status::Open);
        assert_eq!(
            handler.notes(),
            [&Note::Opened(Outcome::NeedReset, Some(ConnectReturnCode::Accepted), true)]
        );
    }

    #[test]
    fn clean_close_cancels_before_disconnect() {
        let (mut session, mut handler) = connected(Config::new("c"));
        publish(&mut session, &mut handler, QoS::AtLeastOnce);
        publish(&mut session, &mut handler, QoS::ExactlyOnce);
        handler.clear();

        session.close(&mut handler).unwrap();

        assert_eq!(
            handler.log,
            vec![
                Record::Event(Note::Published(Outcome::Cancel, 1, "t".to_string())),
                Record::Event(Note::Published(Outcome::Cancel, 2, "t".to_string())),
                Record::Sent(vec![0xE0, 0x00]),
            ]
        );
        assert_eq!(session.pending(), 0);
        assert_eq!(session.status(), Status::Open);
    }

    #[test]
    fn persistent_close_keeps_and_resends() {
        let config = Config {
            clean_session: false,
            ..Config::new("c")
        };
        let (mut session, mut handler) = connected(config);
        publish(&mut session, &mut handler, QoS::AtLeastOnce);

        session.close(&mut handler).unwrap();
        assert_eq!(session.pending(), 1);
        assert!(handler.notes().is_empty());

        session.open(&mut handler, 1000).unwrap();
        session.read(&mut handler, &CONNACK_PRESENT).unwrap();
        assert_eq!(session.status(), Status::Connected);
        handler.clear();

        session.tick(&mut handler, 1).unwrap();
        // PUBLISH qos 1 with DUP, topic "t", id 1
        assert_eq!(handler.sent(), [&[0x3A, 6, 0, 1, b't', 0, 1, b'm'][..]]);
    }

    #[test]
    fn close_reports_failed_disconnect() {
        let (mut session, mut handler) = connected(Config::new("c"));
        handler.fail_writes = true;

        assert_eq!(session.close(&mut handler), Err(crate::Error::CallbackError));
        assert_eq!(session.status(), Status::Open);
    }

    #[test]
    fn qos1_publish_completes_on_puback() {
        let (mut session, mut handler) = connected(Config::new("c"));

        let id = publish(&mut session, &mut handler, QoS::AtLeastOnce);
        assert_eq!(id, 1);
        assert_eq!(handler.last_sent(), Some(&[0x32, 6, 0, 1, b't', 0, 1, b'm'][..]));

        session.read(&mut handler, &[0x40, 0x02, 0x00, 0x01]).unwrap();
        assert_eq!(session.pending(), 0);
        assert_eq!(
            handler.notes(),
            [&Note::Published(Outcome::Complete, 1, "t".to_string())]
        );
    }

    #[test]
    fn qos0_publish_is_not_tracked() {
        let (mut session, mut handler) = connected(Config::new("c"));

        assert_eq!(publish(&mut session, &mut handler, QoS::AtMostOnce), 0);
        assert_eq!(session.pending(), 0);
        assert_eq!(handler.last_sent(), Some(&[0x30, 4, 0, 1, b't', b'm'][..]));
    }

    #[test]
    fn qos2_handshake() {
        let (mut session, mut handler) = connected(Config::new("c"));
        publish(&mut session, &mut handler, QoS::ExactlyOnce);
        assert_eq!(session.pending(), 1);

        session.read(&mut handler, &[0x50, 0x02, 0x00, 0x01]).unwrap();
        assert_eq!(
            handler.notes(),
            [&Note::Published(Outcome::Complete, 1, "t".to_string())]
        );
        assert_eq!(handler.last_sent(), Some(&[0x62, 0x02, 0x00, 0x01][..]));
        assert_eq!(session.pending(), 1);
        assert!(session.queue.search(PacketId::FIRST, PacketType::PubRel).is_some());

        session.read(&mut handler, &[0x70, 0x02, 0x00, 0x01]).unwrap();
        assert_eq!(session.pending(), 0);
        assert_eq!(handler.notes().len(), 1);
    }

    #[test]
    fn ack_with_wrong_qos_is_ignored() {
        let (mut session, mut handler) = connected(Config::new("c"));
        publish(&mut session, &mut handler, QoS::ExactlyOnce);

        session.read(&mut handler, &[0x40, 0x02, 0x00, 0x01]).unwrap();
        session.read(&mut handler, &[0x50, 0x02, 0x00, 0x09]).unwrap();

        assert_eq!(session.pending(), 1);
        assert!(handler.notes().is_empty());
    }

    #[test]
    fn inbound_qos1_is_acked() {
        let (mut session, mut handler) = connected(Config::new("c"));

        // PUBLISH qos 1, topic "a", id 5, payload "hi"
        session
            .read(&mut handler, &[0x32, 7, 0, 1, b'a', 0, 5, b'h', b'i'])
            .unwrap();

        assert_eq!(
            handler.log,
            vec![
                Record::Sent(vec![0x40, 0x02, 0x00, 0x05]),
                Record::Event(Note::Received("a".to_string(), b"hi".to_vec(), QoS::AtLeastOnce)),
            ]
        );
        assert_eq!(session.pending(), 0);
    }

    #[test]
    fn inbound_qos2_is_delivered_once() {
        let (mut session, mut handler) = connected(Config::new("c"));
        let packet = [0x34, 7, 0, 1, b'a', 0, 5, b'h', b'i'];

        session.read(&mut handler, &packet).unwrap();
        session.read(&mut handler, &packet).unwrap();

        assert_eq!(handler.notes().len(), 1);
        assert_eq!(handler.sent(), [&[0x50, 0x02, 0x00, 0x05][..]]);
        assert_eq!(session.pending(), 1);

        session.read(&mut handler, &[0x62, 0x02, 0x00, 0x05]).unwrap();
        assert_eq!(handler.last_sent(), Some(&[0x70, 0x02, 0x00, 0x05][..]));
        assert_eq!(session.pending(), 0);
    }

    #[test]
    fn subscribe_and_suback() {
        let (mut session, mut handler) = connected(Config::new("c"));
        let topics = [
            Subscription::new("a", QoS::AtMostOnce),
            Subscription::new("b", QoS::ExactlyOnce),
        ];

        let id = session.subscribe(&mut handler, &topics).unwrap();
        assert_eq!(id.get(), 1);

        // one code for two topics
        session.read(&mut handler, &[0x90, 0x03, 0x00, 0x01, 0x00]).unwrap();
        assert!(handler.notes().is_empty());
        assert_eq!(session.pending(), 1);

        session
            .read(&mut handler, &[0x90, 0x04, 0x00, 0x01, 0x00, 0x80])
            .unwrap();
        assert_eq!(
            handler.notes(),
            [&Note::Subscribed(
                Outcome::Complete,
                1,
                vec!["a".to_string(), "b".to_string()],
                vec![SubAckReturnCode::MaxQoS0, SubAckReturnCode::Failure],
            )]
        );
        assert_eq!(session.pending(), 0);
    }

    #[test]
    fn unsubscribe_and_unsuback() {
        let (mut session, mut handler) = connected(Config::new("c"));

        let id = session.unsubscribe(&mut handler, &["a/b"]).unwrap();
        session.read(&mut handler, &[0xB0, 0x02, 0x00, 0x01]).unwrap();

        assert_eq!(id.get(), 1);
        assert_eq!(
            handler.notes(),
            [&Note::Unsubscribed(Outcome::Complete, 1, vec!["a/b".to_string()])]
        );
    }

    #[test]
    fn malformed_connack_then_recovery() {
        let (mut session, mut handler) = session(Config::new("c"));
        session.open(&mut handler, 1000).unwrap();

        // remaining length 3
        assert_eq!(
            session.read(&mut handler, &[0x20, 0x03, 0x00, 0x00, 0x00]),
            Err(crate::Error::BadFormat)
        );
        // reserved acknowledge flag bit
        assert_eq!(
            session.read(&mut handler, &[0x20, 0x02, 0x02, 0x00]),
            Err(crate::Error::BadFormat)
        );
        assert!(session.parser.is_idle());
        assert_eq!(session.status(), Status::Connecting);

        session.read(&mut handler, &CONNACK).unwrap();
        assert_eq!(session.status(), Status::Connected);
    }

    #[test]
    fn read_stops_at_first_error() {
        let (mut session, mut handler) = connected(Config::new("c"));

        // PINGREQ is server-bound, the PINGRESP after it is never reached
        assert_eq!(
            session.read(&mut handler, &[0xC0, 0x00, 0xD0, 0x00]),
            Err(crate::Error::BadFormat)
        );
        assert!(handler.notes().is_empty());

        session.read(&mut handler, &[0xD0, 0x00]).unwrap();
        assert_eq!(handler.notes(), [&Note::Pong]);
    }

    #[test]
    fn connack_while_connected_is_out_of_sequence() {
        let (mut session, mut handler) = connected(Config::new("c"));

        assert_eq!(
            session.read(&mut handler, &CONNACK),
            Err(crate::Error::BadSequence)
        );
    }

    #[test]
    fn connect_timeout_cancels_clean_session() {
        let (mut session, mut handler) = session(Config::new("c"));
        session.open(&mut handler, 1000).unwrap();
        publish(&mut session, &mut handler, QoS::AtLeastOnce);

        session.tick(&mut handler, 600).unwrap();
        assert_eq!(session.status(), Status::Connecting);

        session.tick(&mut handler, 1000).unwrap();
        assert_eq!(session.status(), Status::Open);
        assert_eq!(
            handler.notes(),
            [
                &Note::Published(Outcome::Cancel, 1, "t".to_string()),
                &Note::Opened(Outcome::Timeout, None, false),
            ]
        );
        assert_eq!(session.pending(), 0);
    }

    #[test]
    fn reset_timeout_returns_to_open() {
        let (mut session, mut handler) = session(Config::new("c"));
        session.reset(&mut handler, 500).unwrap();
        handler.clear();

        session.tick(&mut handler, 499).unwrap();
        assert_eq!(session.status(), Status::Resetting);

        session.tick(&mut handler, 500).unwrap();
        assert_eq!(session.status(), Status::Open);
        assert_eq!(handler.notes(), [&Note::Opened(Outcome::Timeout, None, false)]);
        assert!(handler.sent().is_empty());
    }

    #[test]
    fn unknown_connack_code_is_bad_format() {
        let (mut session, mut handler) = session(Config::new("c"));
        session.open(&mut handler, 1000).unwrap();

        assert_eq!(
            session.read(&mut handler, &[0x20, 0x02, 0x00, 0x06]),
            Err(crate::Error::BadFormat)
        );
        assert_eq!(session.status(), Status::Connecting);
        assert!(session.parser.is_idle());
        assert!(handler.notes().is_empty());
    }

    #[test]
    fn keep_alive_sends_pingreq() {
        let config = Config {
            keep_alive: 2,
            ..Config::new("c")
        };
        let (mut session, mut handler) = connected(config);

        session.tick(&mut handler, 1000).unwrap();
        assert!(handler.sent().is_empty());

        session.tick(&mut handler, 2000).unwrap();
        assert_eq!(handler.sent(), [&[0xC0, 0x00][..]]);

        session.tick(&mut handler, 3999).unwrap();
        assert_eq!(handler.sent().len(), 1);
        session.tick(&mut handler, 4000).unwrap();
        assert_eq!(handler.sent().len(), 2);
    }

    #[test]
    fn keep_alive_disabled() {
        let config = Config {
            keep_alive: 0,
            ..Config::new("c")
        };
        let (mut session, mut handler) = connected(config);

        session.tick(&mut handler, 1_000_000).unwrap();
        assert!(handler.sent().is_empty());
    }

    #[test]
    fn retries_carry_dup_then_time_out() {
        let config = Config {
            retry_interval: 1,
            retry_count: 1,
            ..Config::new("c")
        };
        let (mut session, mut handler) = connected(config);
        publish(&mut session, &mut handler, QoS::AtLeastOnce);
        handler.clear();

        session.tick(&mut handler, 1000).unwrap();
        assert_eq!(handler.sent(), [&[0x3A, 6, 0, 1, b't', 0, 1, b'm'][..]]);

        session.tick(&mut handler, 2000).unwrap();
        assert_eq!(handler.sent().len(), 1);
        assert_eq!(
            handler.notes(),
            [&Note::Published(Outcome::Timeout, 1, "t".to_string())]
        );
        assert_eq!(session.pending(), 0);
    }

    #[test]
    fn failed_queued_write_is_retried() {
        let config = Config {
            retry_interval: 1,
            ..Config::new("c")
        };
        let (mut session, mut handler) = connected(config);

        handler.fail_writes = true;
        assert_eq!(publish(&mut session, &mut handler, QoS::AtLeastOnce), 1);
        assert_eq!(session.pending(), 1);

        handler.fail_writes = false;
        session.tick(&mut handler, 1000).unwrap();
        assert_eq!(handler.sent().len(), 1);
    }

    #[test]
    fn full_queue_is_no_memory() {
        let (mut session, mut handler) = connected(Config::new("c"));
        for _ in 0..4 {
            publish(&mut session, &mut handler, QoS::AtLeastOnce);
        }

        assert_eq!(
            session.publish(&mut handler, Message::new("t", b"m"), QoS::AtLeastOnce, false),
            Err(crate::Error::NoMemory)
        );
        assert_eq!(session.ping(&mut handler), Ok(()));
    }

    #[test]
    fn reset_forces_clean_connect() {
        let config = Config {
            clean_session: false,
            ..Config::new("c")
        };
        let (mut session, mut handler) = session(config);
        publish_before_open(&mut session);

        session.reset(&mut handler, 1000).unwrap();
        assert_eq!(session.status(), Status::Resetting);
        // fixed header, length, "MQTT" string, level, then connect flags
        let connect = handler.last_sent().unwrap();
        assert_eq!(connect[9] & 0x02, 0x02);
        assert_eq!(session.reset(&mut handler, 1000), Ok(()));
        assert_eq!(session.open(&mut handler, 1000), Err(crate::Error::BadSequence));

        session.read(&mut handler, &CONNACK).unwrap();
        assert_eq!(session.status(), Status::Open);
        assert_eq!(
            handler.notes(),
            [&Note::Opened(Outcome::Complete, Some(ConnectReturnCode::Accepted), false)]
        );
    }

    fn publish_before_open(session: &mut Session<'static, 4>) {
        assert_eq!(
            session.publish(
                &mut Recorder::default(),
                Message::new("t", b"m"),
                QoS::AtLeastOnce,
                false
            ),
            Err(crate::Error::BadSequence)
        );
    }

    #[test]
    fn reset_not_allowed_while_connected() {
        let (mut session, mut handler) = connected(Config::new("c"));

        assert_eq!(session.reset(&mut handler, 1000), Err(crate::Error::BadSequence));
    }

    #[test]
    fn stop_cancels_and_disconnects() {
        let (mut session, mut handler) = connected(Config::new("c"));
        session
            .subscribe(&mut handler, &[Subscription::new("a", QoS::AtLeastOnce)])
            .unwrap();
        handler.clear();

        session.stop(&mut handler).unwrap();

        assert_eq!(
            handler.log,
            vec![
                Record::Event(Note::Subscribed(
                    Outcome::Cancel,
                    1,
                    vec!["a".to_string()],
                    Vec::new()
                )),
                Record::Sent(vec![0xE0, 0x00]),
            ]
        );
        assert_eq!(session.status(), Status::Stopped);
        assert_eq!(session.stop(&mut handler), Err(crate::Error::UnexpectedError));
    }

    #[test]
    fn stop_while_open_drains_without_disconnect() {
        let config = Config {
            clean_session: false,
            ..Config::new("c")
        };
        let (mut session, mut handler) = connected(config);
        publish(&mut session, &mut handler, QoS::AtLeastOnce);
        session.close(&mut handler).unwrap();
        assert_eq!(session.pending(), 1);
        handler.clear();

        session.stop(&mut handler).unwrap();

        assert_eq!(
            handler.log,
            vec![Record::Event(Note::Published(Outcome::Cancel, 1, "t".to_string()))]
        );
        assert_eq!(session.pending(), 0);
        assert_eq!(session.status(), Status::Stopped);
    }

    #[test]
    fn close_while_open_sends_nothing() {
        let (mut session, mut handler) = session(Config::new("c"));

        assert_eq!(session.close(&mut handler), Ok(()));
        assert!(handler.log.is_empty());
        assert_eq!(session.status(), Status::Open);
    }

    #[test]
    fn restart_cancels_pending() {
        let (mut session, mut handler) = connected(Config::new("c"));
        publish(&mut session, &mut handler, QoS::AtLeastOnce);
        handler.clear();

        session.start(&mut handler, 0);

        assert_eq!(
            handler.log,
            vec![Record::Event(Note::Published(Outcome::Cancel, 1, "t".to_string()))]
        );
        assert_eq!(session.pending(), 0);
        assert_eq!(session.status(), Status::Open);
    }

    #[test]
    fn write_failure_is_callback_error() {
        let (mut session, mut handler) = session(Config::new("c"));
        handler.fail_writes = true;

        assert_eq!(session.open(&mut handler, 1000), Err(crate::Error::CallbackError));
        assert_eq!(session.status(), Status::Open);
    }

    #[test]
    fn tick_survives_clock_wrap() {
        let config = Config {
            keep_alive: 1,
            ..Config::new("c")
        };
        let (mut session, mut handler) = session(config);
        session.start(&mut handler, u32::MAX - 500);
        session.open(&mut handler, 1000).unwrap();
        session.read(&mut handler, &CONNACK).unwrap();
        handler.clear();

        session.tick(&mut handler, 499).unwrap();
        assert!(handler.sent().is_empty());
        session.tick(&mut handler, 500).unwrap();
        assert_eq!(handler.sent(), [&[0xC0, 0x00][..]]);
    }
}

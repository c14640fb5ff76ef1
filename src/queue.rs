use alloc::vec::Vec;

use crate::{
    buffer::{self, Topics},
    packet::{
        PacketId, QoS,
        publish::{Flags, Message, Publish},
    },
    protocol::{FixedHeader, PacketType},
    timer,
};

/// Retry settings every new entry starts from, in milliseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct RetryPolicy {
    pub(crate) interval: u32,
    pub(crate) count: u32,
}

/// One outbound packet waiting for its acknowledgement.
#[derive(Debug)]
pub(crate) struct Entry {
    packet_id: PacketId,
    send_count: u32,
    expire_time: u32,
    timeout: u32,
    packet: Vec<u8>,
}

/// What a stored packet is, decided by its own fixed header.
pub(crate) enum View<'a> {
    Subscribe(Topics<'a>),
    Unsubscribe(Topics<'a>),
    Publish(Message<'a>),
    Ack,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Tick {
    Wait,
    Retry,
    Expire,
}

impl Entry {
    pub(crate) fn new(packet_id: PacketId, packet: Vec<u8>, retry: RetryPolicy) -> Self {
        // with no interval the entry waits for its ack indefinitely
        let send_count = if retry.interval == 0 { 0 } else { retry.count };

        Self {
            packet_id,
            send_count,
            expire_time: retry.interval,
            timeout: retry.interval,
            packet,
        }
    }

    pub(crate) fn packet_id(&self) -> PacketId {
        self.packet_id
    }

    pub(crate) fn packet(&self) -> &[u8] {
        &self.packet
    }

    pub(crate) fn packet_type(&self) -> Option<PacketType> {
        let first = self.packet.first()?;
        PacketType::try_from(first >> 4).ok()
    }

    /// QoS of a stored PUBLISH.
    pub(crate) fn qos(&self) -> Option<QoS> {
        if self.packet_type()? != PacketType::Publish {
            return None;
        }

        let first = self.packet.first()?;
        Flags::try_from(first & 0x0F).ok().map(|flags| flags.qos)
    }

    pub(crate) fn view(&self) -> View<'_> {
        let Some((first, body)) = buffer::split_packet(&self.packet) else {
            return View::Ack;
        };

        // subscribe/unsubscribe payload starts after the packet id
        let payload = body.get(2..).unwrap_or_default();

        match self.packet_type() {
            Some(PacketType::Subscribe) => View::Subscribe(Topics::subscribe(payload)),
            Some(PacketType::Unsubscribe) => View::Unsubscribe(Topics::unsubscribe(payload)),
            Some(PacketType::Publish) => FixedHeader::parse(first)
                .and_then(|header| Publish::decode(&header, body))
                .map_or(View::Ack, |publish| View::Publish(publish.message())),
            _ => View::Ack,
        }
    }

    /// Sets DUP on a stored QoS>0 PUBLISH so that every retransmission
    /// carries it.
    pub(crate) fn mark_duplicate(&mut self) {
        if !matches!(self.qos(), Some(QoS::AtLeastOnce | QoS::ExactlyOnce)) {
            return;
        }

        if let Some(first) = self.packet.first_mut() {
            *first |= Flags::DUP;
        }
    }

    /// Schedules an immediate resend on the next sweep followed by the
    /// usual `retry_count` retries.
    pub(crate) fn mark_for_resend(&mut self, retry_count: u32) {
        self.send_count = retry_count.saturating_add(1);
        self.expire_time = 0;
    }

    pub(crate) fn tick(&mut self, elapsed: u32) -> Tick {
        if self.timeout == 0 {
            if self.send_count > 0 {
                self.send_count = 0;
                return Tick::Retry;
            }
            return Tick::Wait;
        }

        if elapsed < self.expire_time {
            self.expire_time -= elapsed;
            return Tick::Wait;
        }

        if self.send_count > 0 {
            self.send_count -= 1;
            self.expire_time = self.timeout;
            Tick::Retry
        } else {
            Tick::Expire
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Handle(usize);

pub(crate) enum Sweep<'e> {
    Retry(&'e Entry),
    Expire(Entry),
}

#[derive(Debug)]
struct Node {
    entry: Entry,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Pending packets in send order. Slots live in a fixed array and link to
/// each other by index, so removal by handle is O(1) and capacity is `N`.
pub(crate) struct Queue<const N: usize> {
    nodes: [Option<Node>; N],
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
    last_sweep: u32,
    packet_id: Option<PacketId>,
}

impl<const N: usize> Queue<N> {
    pub(crate) fn new(now: u32) -> Self {
        Self {
            nodes: [const { None }; N],
            head: None,
            tail: None,
            len: 0,
            last_sweep: now,
            packet_id: None,
        }
    }

    /// Drops every entry without notification and restarts the packet id
    /// counter.
    pub(crate) fn reset(&mut self, now: u32) {
        self.nodes.iter_mut().for_each(|node| *node = None);
        self.head = None;
        self.tail = None;
        self.len = 0;
        self.last_sweep = now;
        self.packet_id = None;
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn is_full(&self) -> bool {
        self.len == N
    }

    /// Next packet identifier, wrapping from 65535 to 1 and skipping ids
    /// still held by an outbound request.
    pub(crate) fn next_packet_id(&mut self) -> PacketId {
        let mut id = self.packet_id.map_or(PacketId::FIRST, PacketId::next);

        for _ in 0..N {
            if !self.in_use(id) {
                break;
            }
            id = id.next();
        }

        self.packet_id = Some(id);
        id
    }

    fn in_use(&self, id: PacketId) -> bool {
        self.iter()
            .any(|entry| entry.packet_id == id && entry.packet_type() != Some(PacketType::PubRec))
    }

    pub(crate) fn search(&self, id: PacketId, packet_type: PacketType) -> Option<Handle> {
        let mut cursor = self.head;

        while let Some(index) = cursor {
            let node = self.nodes.get(index)?.as_ref()?;
            if node.entry.packet_id == id && node.entry.packet_type() == Some(packet_type) {
                return Some(Handle(index));
            }
            cursor = node.next;
        }

        None
    }

    pub(crate) fn get(&self, handle: Handle) -> Option<&Entry> {
        self.nodes.get(handle.0)?.as_ref().map(|node| &node.entry)
    }

    pub(crate) fn get_mut(&mut self, handle: Handle) -> Option<&mut Entry> {
        self.nodes.get_mut(handle.0)?.as_mut().map(|node| &mut node.entry)
    }

    /// Appends at the tail. A full queue hands the entry back.
    pub(crate) fn push(&mut self, entry: Entry) -> Result<Handle, Entry> {
        let Some(index) = self.nodes.iter().position(Option::is_none) else {
            return Err(entry);
        };

        self.nodes[index] = Some(Node {
            entry,
            prev: self.tail,
            next: None,
        });

        match self.tail.and_then(|tail| self.nodes[tail].as_mut()) {
            Some(tail) => tail.next = Some(index),
            None => self.head = Some(index),
        }

        self.tail = Some(index);
        self.len += 1;

        Ok(Handle(index))
    }

    pub(crate) fn pop(&mut self) -> Option<Entry> {
        let head = self.head?;
        self.unlink(head)
    }

    pub(crate) fn slice(&mut self, handle: Handle) -> Option<Entry> {
        self.unlink(handle.0)
    }

    fn unlink(&mut self, index: usize) -> Option<Entry> {
        let node = self.nodes.get_mut(index)?.take()?;

        match node.prev.and_then(|prev| self.nodes[prev].as_mut()) {
            Some(prev) => prev.next = node.next,
            None => self.head = node.next,
        }

        match node.next.and_then(|next| self.nodes[next].as_mut()) {
            Some(next) => next.prev = node.prev,
            None => self.tail = node.prev,
        }

        self.len -= 1;
        Some(node.entry)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Entry> {
        let mut cursor = self.head;

        core::iter::from_fn(move || {
            let node = self.nodes.get(cursor?)?.as_ref()?;
            cursor = node.next;
            Some(&node.entry)
        })
    }

    pub(crate) fn for_each(&mut self, mut f: impl FnMut(&mut Entry)) {
        let mut cursor = self.head;

        while let Some(node) = cursor.and_then(|index| self.nodes[index].as_mut()) {
            f(&mut node.entry);
            cursor = node.next;
        }
    }

    /// Timer sweep. Entries due for a retry are handed out in place; those
    /// out of retries are unlinked first and handed out once the walk is
    /// over.
    pub(crate) fn process(&mut self, now: u32, mut visit: impl FnMut(Sweep<'_>)) {
        let elapsed = timer::elapsed(self.last_sweep, now);
        self.last_sweep = now;

        let mut expired = heapless::Vec::<Entry, N>::new();
        let mut cursor = self.head;

        while let Some(index) = cursor {
            let Some(node) = self.nodes[index].as_mut() else {
                break;
            };
            cursor = node.next;

            match node.entry.tick(elapsed) {
                Tick::Wait => {}
                Tick::Retry => visit(Sweep::Retry(&node.entry)),
                Tick::Expire => {
                    if let Some(entry) = self.unlink(index) {
                        if let Err(entry) = expired.push(entry) {
                            visit(Sweep::Expire(entry));
                        }
                    }
                }
            }
        }

        for entry in expired {
            visit(Sweep::Expire(entry));
        }
    }
}

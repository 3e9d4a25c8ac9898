//! Asynchronous notification queue.
//!
//! The engine may send a notification (break, edit, breakpoint change, ...)
//! at any time, including between the fragments of a reply. The receive
//! path copies such datagrams into the queue of the connection that
//! intercepted them; callers drain the queue oldest-first.

use std::collections::VecDeque;

use crate::core::{Opcode, HEADER_SIZE};

/// One intercepted notification datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    packet: Vec<u8>,
}

impl Notification {
    /// Wraps a raw datagram.
    ///
    /// Returns `None` unless the datagram is at least two bytes long and
    /// carries the notification opcode.
    pub fn from_packet(packet: &[u8]) -> Option<Self> {
        if packet.len() < 2 || packet[0] != Opcode::Notification.as_u8() {
            return None;
        }
        Some(Self {
            packet: packet.to_vec(),
        })
    }

    /// Notification type assigned by the engine.
    pub fn kind(&self) -> u8 {
        self.packet[1]
    }

    /// The complete datagram, header included.
    pub fn packet(&self) -> &[u8] {
        &self.packet
    }

    /// Bytes following the packet header.
    pub fn payload(&self) -> &[u8] {
        self.packet.get(HEADER_SIZE..).unwrap_or(&[])
    }
}

/// FIFO of intercepted notifications.
#[derive(Debug, Default)]
pub struct NotificationQueue {
    entries: VecDeque<Notification>,
}

impl NotificationQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a notification as the newest entry.
    pub fn push(&mut self, notification: Notification) {
        self.entries.push_back(notification);
    }

    /// Removes and returns the oldest entry.
    pub fn pop(&mut self) -> Option<Notification> {
        self.entries.pop_front()
    }

    /// Returns true if any notification is queued.
    pub fn is_pending(&self) -> bool {
        !self.entries.is_empty()
    }

    /// Number of queued notifications.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every queued notification.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(kind: u8) -> Notification {
        Notification::from_packet(&[0x06, kind, 0, 0, 0xAA]).unwrap()
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = NotificationQueue::new();
        assert!(!queue.is_pending());

        queue.push(notification(1));
        queue.push(notification(2));
        queue.push(notification(3));
        assert_eq!(queue.len(), 3);

        assert_eq!(queue.pop().unwrap().kind(), 1);
        assert_eq!(queue.pop().unwrap().kind(), 2);
        assert_eq!(queue.pop().unwrap().kind(), 3);
        assert!(queue.pop().is_none());
        assert!(!queue.is_pending());
    }

    #[test]
    fn test_from_packet_filters() {
        assert!(Notification::from_packet(&[0x06]).is_none());
        assert!(Notification::from_packet(&[0x01, 0x00, 0x00, 0x01, 0x55]).is_none());

        let n = Notification::from_packet(&[0x06, 0x02]).unwrap();
        assert_eq!(n.kind(), 2);
        assert!(n.payload().is_empty());

        let n = notification(5);
        assert_eq!(n.payload(), &[0xAA]);
        assert_eq!(n.packet().len(), 5);
    }
}

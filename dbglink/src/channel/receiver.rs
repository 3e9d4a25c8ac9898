//! Receiver side of the channel.
//!
//! Assembles one reply from sequenced data packets. Along the way it
//! ignores liveness probes, queues notifications, discards stale packets
//! and resends the last request when the engine echoes the sequence of the
//! previous reply.

use std::time::Duration;

use crate::connection::Connection;
use crate::core::{control_packet, Flag, Opcode, PacketHeader, HEADER_SIZE};
use crate::error::{Error, Result, Violation};
use crate::notify::Notification;
use crate::transport::Dialer;
use crate::{MAX_MESSAGE_SIZE, PCKLEN_MAX};

/// Single-byte datagram the engine sends to show it is alive.
const LIVENESS_PROBE: u8 = b'+';

impl<D: Dialer> Connection<D> {
    /// Receives one complete message.
    pub fn receive(&mut self) -> Result<Vec<u8>> {
        let mut message = Vec::new();
        self.receive_into(&mut message)?;
        Ok(message)
    }

    /// Receives one complete message into `out`, replacing its contents.
    ///
    /// Returns the message length.
    pub fn receive_into(&mut self, out: &mut Vec<u8>) -> Result<usize> {
        self.ensure_ready()?;
        out.clear();

        let first_seq = self.receive_seq;
        let timeout = self.config.timeout;

        loop {
            let flag = self.next_fragment(out, timeout)?;
            if flag == Flag::AckRequest {
                self.send_datagram(&control_packet(Opcode::Handshake, 0))?;
                log::debug!("acknowledged flow-control request at seq {}", self.receive_seq);
            }
            if !flag.continues() {
                break;
            }
        }

        self.last_receive_seq = first_seq;
        self.stats.messages_received += 1;
        log::debug!(
            "received message len={} first_seq={} next_seq={}",
            out.len(),
            first_seq,
            self.receive_seq
        );
        Ok(out.len())
    }

    /// Waits for the next in-sequence data packet and appends its payload.
    ///
    /// Returns the packet's continuation flag.
    fn next_fragment(&mut self, out: &mut Vec<u8>, timeout: Duration) -> Result<Flag> {
        loop {
            let len = self
                .poll_datagram(self.packet_size, timeout)?
                .ok_or(Error::ReceiveTimeout)?;

            if len == 1 && self.rx_buf[0] == LIVENESS_PROBE {
                self.stats.probes_ignored += 1;
                continue;
            }
            if len <= HEADER_SIZE {
                return Err(Violation::Undersized { len }.into());
            }

            let header = PacketHeader::parse(&self.rx_buf[..len]).ok_or(Violation::Undersized { len })?;

            if let Some(notification) = Notification::from_packet(&self.rx_buf[..len]) {
                log::debug!("queued notification kind={}", notification.kind());
                self.notifications.push(notification);
                self.stats.notifications_queued += 1;
                continue;
            }

            if !header.is(Opcode::Reply) {
                return Err(Violation::UnexpectedOpcode { opcode: header.opcode }.into());
            }

            if header.seq != self.receive_seq {
                if header.seq == self.last_receive_seq && !self.last_transmit.is_empty() {
                    self.retransmit()?;
                } else {
                    self.stats.stale_packets += 1;
                    log::trace!("discarded seq {} while expecting {}", header.seq, self.receive_seq);
                }
                continue;
            }

            let flag = Flag::from_u8(header.flag).unwrap_or_else(|| {
                log::warn!("unknown fragment flag {}, treating as continuation", header.flag);
                Flag::More
            });

            self.receive_seq = self.receive_seq.wrapping_add(1);
            out.extend_from_slice(&self.rx_buf[HEADER_SIZE..len]);
            if out.len() > MAX_MESSAGE_SIZE {
                return Err(Violation::MessageTooLarge {
                    limit: MAX_MESSAGE_SIZE,
                }
                .into());
            }
            return Ok(flag);
        }
    }

    /// Returns true if an intercepted notification is waiting in the queue.
    ///
    /// Datagrams still unread on the transport are not considered.
    pub fn notification_pending(&self) -> bool {
        self.notifications.is_pending()
    }

    /// Returns the oldest pending notification.
    ///
    /// Falls back to one non-blocking poll of the transport when the queue
    /// is empty. Any datagram that is not a notification is dropped.
    pub fn receive_notification(&mut self) -> Result<Option<Notification>> {
        if let Some(notification) = self.notifications.pop() {
            return Ok(Some(notification));
        }

        let Some(len) = self.poll_datagram(PCKLEN_MAX, Duration::ZERO)? else {
            return Ok(None);
        };

        let notification = Notification::from_packet(&self.rx_buf[..len]);
        if notification.is_none() {
            log::warn!("dropped non-notification datagram of {} bytes", len);
        }
        Ok(notification)
    }

    /// Returns every pending notification, oldest first.
    pub fn drain_notifications(&mut self) -> Result<Vec<Notification>> {
        let mut drained = Vec::new();
        while let Some(notification) = self.receive_notification()? {
            drained.push(notification);
        }
        Ok(drained)
    }
}

//! Connection state and main API.
//!
//! A `Connection` is the single mutable record describing one logical link
//! to the engine. The protocol operations live next to their subject:
//! handshake, resync and teardown in [`crate::session`], transmit and receive
//! in [`crate::channel`].

use std::time::Duration;

use crate::config::LineConfig;
use crate::error::{Error, Result, Violation};
use crate::notify::NotificationQueue;
use crate::transport::{Dialer, Transport, UdpDialer};
use crate::{MIN_PACKET_SIZE, PCKLEN_MAX};

/// Statistics about link operation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LineStats {
    /// Datagrams sent, control packets included.
    pub packets_sent: u64,

    /// Datagrams received.
    pub packets_received: u64,

    /// Messages handed to transmit (retransmissions included).
    pub messages_sent: u64,

    /// Messages completely assembled.
    pub messages_received: u64,

    /// Implicit retransmissions of the last message.
    pub retransmissions: u64,

    /// Notifications intercepted while receiving.
    pub notifications_queued: u64,

    /// Liveness probes ignored.
    pub probes_ignored: u64,

    /// Out-of-sequence data packets discarded.
    pub stale_packets: u64,

    /// Bytes sent on the wire.
    pub bytes_sent: u64,

    /// Bytes received from the wire.
    pub bytes_received: u64,
}

/// One link to a remote debug engine.
///
/// Every operation takes the connection explicitly; to drive several
/// engines, create several connections and keep each on its own thread.
///
/// # Example
///
/// ```rust
/// use dbglink::{Connection, LineConfig};
/// use dbglink::transport::{ScriptedDialer, ScriptedTransport};
///
/// let transport = ScriptedTransport::new(4000);
/// let line = Connection::new(LineConfig::default(), ScriptedDialer::new(transport));
/// assert!(!line.is_up());
/// assert_eq!(line.packet_size(), 1024);
/// ```
pub struct Connection<D: Dialer = UdpDialer> {
    /// Configuration.
    pub(crate) config: LineConfig,

    /// Creates the transport on first connect.
    pub(crate) dialer: D,

    /// Open transport; `None` until the first connect attempt.
    pub(crate) transport: Option<D::Transport>,

    /// True once the handshake succeeded.
    pub(crate) up: bool,

    /// Local port assigned at bind time.
    pub(crate) receive_port: u16,

    /// Negotiated packet size including the header.
    pub(crate) packet_size: usize,

    /// Sequence of the next data packet to send.
    pub(crate) transmit_seq: u16,

    /// Sequence of the next data packet expected.
    pub(crate) receive_seq: u16,

    /// First sequence of the cached message.
    pub(crate) last_transmit_seq: u16,

    /// First sequence of the last received message.
    pub(crate) last_receive_seq: u16,

    /// Copy of the last transmitted message, kept for resending.
    pub(crate) last_transmit: Vec<u8>,

    /// Request correlation counter.
    pub(crate) message_id: u8,

    /// Toggle state owned by the command layer.
    pub(crate) receive_toggle_bit: Option<bool>,

    /// Notifications intercepted on this line.
    pub(crate) notifications: NotificationQueue,

    /// Link statistics.
    pub(crate) stats: LineStats,

    /// Scratch buffer for outgoing datagrams.
    pub(crate) tx_buf: Vec<u8>,

    /// Scratch buffer for incoming datagrams.
    pub(crate) rx_buf: Vec<u8>,
}

impl Connection<UdpDialer> {
    /// Creates a UDP connection with the given configuration.
    pub fn udp(config: LineConfig) -> Self {
        Self::new(config, UdpDialer)
    }
}

impl Default for Connection<UdpDialer> {
    fn default() -> Self {
        Self::udp(LineConfig::default())
    }
}

impl<D: Dialer> Connection<D> {
    /// Creates a connection that opens its transport through `dialer`.
    pub fn new(config: LineConfig, dialer: D) -> Self {
        let packet_size = config.packet_len.min(PCKLEN_MAX);
        Self {
            config,
            dialer,
            transport: None,
            up: false,
            receive_port: 0,
            packet_size,
            transmit_seq: 0,
            receive_seq: 0,
            last_transmit_seq: 0,
            last_receive_seq: 0,
            last_transmit: Vec::new(),
            message_id: 0,
            receive_toggle_bit: None,
            notifications: NotificationQueue::new(),
            stats: LineStats::default(),
            tx_buf: Vec::with_capacity(PCKLEN_MAX),
            rx_buf: vec![0u8; PCKLEN_MAX],
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &LineConfig {
        &self.config
    }

    /// Returns the configuration for modification.
    ///
    /// Changes take effect on the next connect.
    pub fn config_mut(&mut self) -> &mut LineConfig {
        &mut self.config
    }

    /// Returns true if the handshake succeeded.
    pub fn is_up(&self) -> bool {
        self.up
    }

    /// Negotiated packet size including the header.
    pub fn packet_size(&self) -> usize {
        self.packet_size
    }

    /// Local port assigned to the line.
    pub fn receive_port(&self) -> u16 {
        self.receive_port
    }

    /// Sequence number of the next data packet to send.
    pub fn transmit_seq(&self) -> u16 {
        self.transmit_seq
    }

    /// Sequence number expected on the next data packet.
    pub fn receive_seq(&self) -> u16 {
        self.receive_seq
    }

    /// First sequence of the last received message.
    pub fn last_receive_seq(&self) -> u16 {
        self.last_receive_seq
    }

    /// First sequence of the cached outgoing message.
    pub fn last_transmit_seq(&self) -> u16 {
        self.last_transmit_seq
    }

    /// Current message id.
    pub fn message_id(&self) -> u8 {
        self.message_id
    }

    /// Advances and returns the message id.
    pub fn next_message_id(&mut self) -> u8 {
        self.message_id = self.message_id.wrapping_add(1);
        self.message_id
    }

    /// Toggle state stored for the command layer; `None` until set.
    pub fn receive_toggle_bit(&self) -> Option<bool> {
        self.receive_toggle_bit
    }

    /// Stores the toggle state for the command layer.
    pub fn set_receive_toggle_bit(&mut self, value: Option<bool>) {
        self.receive_toggle_bit = value;
    }

    /// Returns link statistics.
    pub fn stats(&self) -> &LineStats {
        &self.stats
    }

    /// Returns the open transport, if any.
    pub fn transport(&self) -> Option<&D::Transport> {
        self.transport.as_ref()
    }

    /// Returns the open transport for direct use, if any.
    pub fn transport_mut(&mut self) -> Option<&mut D::Transport> {
        self.transport.as_mut()
    }

    /// Returns the queue of intercepted notifications.
    pub fn notifications(&self) -> &NotificationQueue {
        &self.notifications
    }

    /// Checks the preconditions of transmit and receive.
    pub(crate) fn ensure_ready(&self) -> Result<()> {
        if self.transport.is_none() {
            return Err(Error::NotConnected);
        }
        if self.packet_size < MIN_PACKET_SIZE {
            return Err(Violation::PacketSizeTooSmall {
                size: self.packet_size,
                min: MIN_PACKET_SIZE,
            }
            .into());
        }
        Ok(())
    }

    /// Sends one datagram that must be accepted in full.
    pub(crate) fn send_datagram(&mut self, datagram: &[u8]) -> Result<()> {
        let transport = self.transport.as_mut().ok_or(Error::NotConnected)?;
        send_all(transport, datagram, &mut self.stats)
    }

    /// Sends the datagram staged in the transmit scratch buffer.
    pub(crate) fn send_staged(&mut self) -> Result<()> {
        let transport = self.transport.as_mut().ok_or(Error::NotConnected)?;
        send_all(transport, &self.tx_buf, &mut self.stats)
    }

    /// Waits for one datagram of at most `limit` bytes into the receive
    /// scratch buffer.
    pub(crate) fn poll_datagram(&mut self, limit: usize, timeout: Duration) -> Result<Option<usize>> {
        let transport = self.transport.as_mut().ok_or(Error::NotConnected)?;
        let limit = limit.min(self.rx_buf.len());
        let received = transport.recv_timeout(&mut self.rx_buf[..limit], timeout)?;
        if let Some(len) = received {
            self.stats.packets_received += 1;
            self.stats.bytes_received += len as u64;
            log::trace!("received datagram len={} head={:02x?}", len, &self.rx_buf[..len.min(4)]);
        }
        Ok(received)
    }
}

impl<D: Dialer> Drop for Connection<D> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn send_all<T: Transport>(transport: &mut T, datagram: &[u8], stats: &mut LineStats) -> Result<()> {
    let sent = transport.send(datagram)?;
    if sent != datagram.len() {
        return Err(Error::TransmitFailure {
            expected: datagram.len(),
            sent,
        });
    }
    stats.packets_sent += 1;
    stats.bytes_sent += sent as u64;
    log::trace!("sent datagram len={} head={:02x?}", sent, &datagram[..sent.min(4)]);
    Ok(())
}

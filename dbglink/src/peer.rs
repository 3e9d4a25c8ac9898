//! Debug engine emulator.
//!
//! `Engine` plays the remote side of the link over a plain UDP socket. It
//! accepts one host at a time, echoes every complete data message back as
//! reply fragments and can inject notifications ahead of replies. It backs
//! the `server` binary and the loopback integration tests.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::atomic::AtomicBool;
//! use dbglink::peer::Engine;
//!
//! let mut engine = Engine::bind("127.0.0.1:20000", 1024, 0).unwrap();
//! let stop = AtomicBool::new(false);
//! engine.serve_until(&stop).unwrap();
//! ```

use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::core::{control_packet, Flag, Fragments, Opcode, PacketHeader, CONTROL_PACKET_SIZE, HEADER_SIZE};
use crate::{MAX_MESSAGE_SIZE, PCKLEN_MAX};

/// Sequence number of the first reply after a connect.
const FIRST_REPLY_SEQ: u16 = 1;

/// Notification kind injected ahead of replies.
pub const NOTIFY_KIND: u8 = 1;

/// Poll interval of [`Engine::serve_until`].
const SERVE_POLL: Duration = Duration::from_millis(50);

/// What one served datagram caused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A host completed the handshake.
    Connected(SocketAddr),

    /// One data fragment was buffered.
    Fragment,

    /// A complete message was echoed back.
    Echoed {
        /// Message length.
        len: usize,
    },

    /// The host repeated its last request; the last reply was resent.
    Repeated,

    /// A resync request was answered.
    Synced,

    /// The host left.
    Disconnected,

    /// The datagram was not meant for the engine or not understood.
    Ignored,
}

/// Counters of an engine.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EngineStats {
    /// Handshakes accepted.
    pub connects: u64,

    /// Messages echoed.
    pub replies: u64,

    /// Replies resent for a repeated request.
    pub repeats: u64,

    /// Notifications injected.
    pub notifications: u64,

    /// Resync requests answered.
    pub syncs: u64,
}

/// Remote side of the link.
#[derive(Debug)]
pub struct Engine {
    socket: UdpSocket,
    packet_size: usize,
    /// Inject a notification before every Nth reply; 0 disables.
    notify_every: u64,
    host: Option<SocketAddr>,
    reply_seq: u16,
    /// First sequence of the request being assembled.
    request_seq: Option<u16>,
    /// First sequence of the last completed request.
    last_request_seq: Option<u16>,
    assembly: Vec<u8>,
    last_reply: Vec<Vec<u8>>,
    buf: Vec<u8>,
    stats: EngineStats,
}

impl Engine {
    /// Binds the engine socket.
    pub fn bind<A: ToSocketAddrs>(addr: A, packet_size: usize, notify_every: u64) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        log::info!("[UDP] engine listening on {}", socket.local_addr()?);
        Ok(Self {
            socket,
            packet_size: packet_size.clamp(CONTROL_PACKET_SIZE, PCKLEN_MAX),
            notify_every,
            host: None,
            reply_seq: FIRST_REPLY_SEQ,
            request_seq: None,
            last_request_seq: None,
            assembly: Vec::new(),
            last_reply: Vec::new(),
            buf: vec![0u8; PCKLEN_MAX],
            stats: EngineStats::default(),
        })
    }

    /// Address the engine listens on.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Address of the connected host, if any.
    pub fn host(&self) -> Option<SocketAddr> {
        self.host
    }

    /// Returns engine counters.
    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// Serves datagrams until `stop` is set.
    pub fn serve_until(&mut self, stop: &AtomicBool) -> io::Result<()> {
        while !stop.load(Ordering::Relaxed) {
            self.serve_one(SERVE_POLL)?;
        }
        Ok(())
    }

    /// Waits up to `timeout` for one datagram and handles it.
    ///
    /// Returns `Ok(None)` if nothing arrived.
    pub fn serve_one(&mut self, timeout: Duration) -> io::Result<Option<Event>> {
        self.socket.set_read_timeout(Some(timeout.max(Duration::from_millis(1))))?;
        let (len, from) = match self.socket.recv_from(&mut self.buf) {
            Ok(received) => received,
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let packet = self.buf[..len].to_vec();
        let event = self.handle(&packet, from)?;
        log::trace!("[UDP] engine from={} len={} event={:?}", from, len, event);
        Ok(Some(event))
    }

    fn handle(&mut self, packet: &[u8], from: SocketAddr) -> io::Result<Event> {
        let Some(header) = PacketHeader::parse(packet) else {
            return Ok(Event::Ignored);
        };

        if header.is(Opcode::ConnectRequest) {
            return self.accept(packet.len(), from);
        }
        if self.host != Some(from) {
            return Ok(Event::Ignored);
        }

        match header.opcode() {
            Some(Opcode::Data) => self.data(header, &packet[HEADER_SIZE..], from),
            Some(Opcode::SyncRequest) => {
                self.stats.syncs += 1;
                self.request_seq = None;
                self.assembly.clear();
                self.socket.send_to(&control_packet(Opcode::SyncAck, self.reply_seq), from)?;
                Ok(Event::Synced)
            }
            Some(Opcode::Disconnect) => {
                log::info!("[UDP] engine host {} left", from);
                self.host = None;
                self.assembly.clear();
                self.request_seq = None;
                Ok(Event::Disconnected)
            }
            _ => Ok(Event::Ignored),
        }
    }

    fn accept(&mut self, request_len: usize, from: SocketAddr) -> io::Result<Event> {
        self.host = Some(from);
        self.reply_seq = FIRST_REPLY_SEQ;
        self.request_seq = None;
        self.last_request_seq = None;
        self.assembly.clear();
        self.last_reply.clear();
        self.stats.connects += 1;

        let mut ack = control_packet(Opcode::ConnectAck, self.reply_seq).to_vec();
        ack.resize(request_len.min(self.packet_size).max(CONTROL_PACKET_SIZE), 0);
        self.socket.send_to(&ack, from)?;

        log::info!("[UDP] engine accepted host {} packet_size={}", from, ack.len());
        Ok(Event::Connected(from))
    }

    fn data(&mut self, header: PacketHeader, payload: &[u8], from: SocketAddr) -> io::Result<Event> {
        let first_seq = *self.request_seq.get_or_insert(header.seq);
        self.assembly.extend_from_slice(payload);
        if self.assembly.len() > MAX_MESSAGE_SIZE {
            log::warn!("[UDP] engine dropped oversized request");
            self.assembly.clear();
            self.request_seq = None;
            return Ok(Event::Ignored);
        }
        if Flag::from_u8(header.flag).is_some_and(Flag::continues) {
            return Ok(Event::Fragment);
        }

        let message = std::mem::take(&mut self.assembly);
        self.request_seq = None;

        if self.last_request_seq == Some(first_seq) && !self.last_reply.is_empty() {
            for packet in &self.last_reply {
                self.socket.send_to(packet, from)?;
            }
            self.stats.repeats += 1;
            return Ok(Event::Repeated);
        }
        self.last_request_seq = Some(first_seq);

        self.stats.replies += 1;
        if self.notify_every > 0 && self.stats.replies % self.notify_every == 0 {
            let mut notification = control_packet(Opcode::Notification, 0);
            notification[1] = NOTIFY_KIND;
            self.socket.send_to(&notification, from)?;
            self.stats.notifications += 1;
        }

        self.last_reply.clear();
        for fragment in Fragments::new(&message, self.packet_size) {
            let mut packet = PacketHeader::new(Opcode::Reply, fragment.flag as u8, self.reply_seq)
                .to_bytes()
                .to_vec();
            packet.extend_from_slice(fragment.payload);
            self.socket.send_to(&packet, from)?;
            self.last_reply.push(packet);
            self.reply_seq = self.reply_seq.wrapping_add(1);
        }

        Ok(Event::Echoed { len: message.len() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MAGIC;

    fn host_socket() -> UdpSocket {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        socket
    }

    fn connect_request(len: usize) -> Vec<u8> {
        let mut request = vec![0x03, 0x01, 0x00, 0x01, 0, 0, 0, 0];
        request.extend_from_slice(MAGIC);
        request.resize(len, 0);
        request
    }

    fn recv(socket: &UdpSocket) -> Vec<u8> {
        let mut buf = vec![0u8; PCKLEN_MAX];
        let (len, _) = socket.recv_from(&mut buf).unwrap();
        buf.truncate(len);
        buf
    }

    #[test]
    fn test_accepts_and_echoes() {
        let mut engine = Engine::bind("127.0.0.1:0", 64, 0).unwrap();
        let addr = engine.local_addr().unwrap();
        let host = host_socket();

        host.send_to(&connect_request(128), addr).unwrap();
        let event = engine.serve_one(Duration::from_secs(2)).unwrap();
        assert_eq!(event, Some(Event::Connected(host.local_addr().unwrap())));
        let ack = recv(&host);
        assert_eq!(ack.len(), 64);
        assert_eq!(&ack[..4], &[0x13, 0x00, 0x00, 0x01]);
        assert_eq!(&ack[8..16], MAGIC);

        host.send_to(&[0x11, 0x01, 0x00, 0x01, b'a', b'b'], addr).unwrap();
        assert_eq!(engine.serve_one(Duration::from_secs(2)).unwrap(), Some(Event::Fragment));
        host.send_to(&[0x11, 0x00, 0x00, 0x02, b'c'], addr).unwrap();
        assert_eq!(
            engine.serve_one(Duration::from_secs(2)).unwrap(),
            Some(Event::Echoed { len: 3 })
        );
        assert_eq!(recv(&host), vec![0x01, 0x00, 0x00, 0x01, b'a', b'b', b'c']);
    }

    #[test]
    fn test_ignores_unknown_host() {
        let mut engine = Engine::bind("127.0.0.1:0", 64, 0).unwrap();
        let addr = engine.local_addr().unwrap();
        let host = host_socket();

        host.send_to(&[0x11, 0x00, 0x00, 0x01, b'x'], addr).unwrap();
        assert_eq!(engine.serve_one(Duration::from_secs(2)).unwrap(), Some(Event::Ignored));
        assert_eq!(engine.serve_one(Duration::from_millis(10)).unwrap(), None);
    }

    #[test]
    fn test_sync_and_disconnect() {
        let mut engine = Engine::bind("127.0.0.1:0", 64, 0).unwrap();
        let addr = engine.local_addr().unwrap();
        let host = host_socket();

        host.send_to(&connect_request(16), addr).unwrap();
        engine.serve_one(Duration::from_secs(2)).unwrap();
        assert_eq!(recv(&host).len(), CONTROL_PACKET_SIZE);

        host.send_to(&control_packet(Opcode::SyncRequest, 9), addr).unwrap();
        assert_eq!(engine.serve_one(Duration::from_secs(2)).unwrap(), Some(Event::Synced));
        assert_eq!(recv(&host), control_packet(Opcode::SyncAck, FIRST_REPLY_SEQ).to_vec());

        host.send_to(&control_packet(Opcode::Disconnect, 0), addr).unwrap();
        assert_eq!(engine.serve_one(Duration::from_secs(2)).unwrap(), Some(Event::Disconnected));
        assert_eq!(engine.host(), None);
    }

    #[test]
    fn test_repeated_request_resends_reply() {
        let mut engine = Engine::bind("127.0.0.1:0", 64, 2).unwrap();
        let addr = engine.local_addr().unwrap();
        let host = host_socket();

        host.send_to(&connect_request(64), addr).unwrap();
        engine.serve_one(Duration::from_secs(2)).unwrap();
        recv(&host);

        let request = [0x11, 0x00, 0x00, 0x01, b'q'];
        host.send_to(&request, addr).unwrap();
        engine.serve_one(Duration::from_secs(2)).unwrap();
        let reply = recv(&host);

        host.send_to(&request, addr).unwrap();
        assert_eq!(engine.serve_one(Duration::from_secs(2)).unwrap(), Some(Event::Repeated));
        assert_eq!(recv(&host), reply);

        host.send_to(&[0x11, 0x00, 0x00, 0x02, b'r'], addr).unwrap();
        engine.serve_one(Duration::from_secs(2)).unwrap();
        let notification = recv(&host);
        assert_eq!(&notification[..2], &[0x06, NOTIFY_KIND]);
        assert_eq!(recv(&host), vec![0x01, 0x00, 0x00, 0x02, b'r']);
        assert_eq!(engine.stats().notifications, 1);
    }
}

//! Transport layer abstraction.
//!
//! This module provides the `Transport` trait that lets the link run over
//! any datagram mechanism, and the `Dialer` trait that performs the one-time
//! setup (name resolution, bind, buffer tuning) producing a transport.
//!
//! # Implementations
//!
//! - `UdpTransport` / `UdpDialer`: the real UDP socket
//! - `ScriptedTransport` / `ScriptedDialer`: in-memory datagram script for tests
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use dbglink::transport::{ScriptedTransport, Transport};
//!
//! let mut transport = ScriptedTransport::new(4000);
//! transport.push(b"\x01\x00\x00\x01hi");
//!
//! let mut buf = [0u8; 32];
//! let n = transport.recv_timeout(&mut buf, Duration::from_millis(10)).unwrap();
//! assert_eq!(n, Some(6));
//! ```

pub mod udp;

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;
use std::time::Duration;

use crate::config::LineConfig;
use crate::error::{Error, Result};

pub use udp::{UdpDialer, UdpTransport};

/// Datagram transport to the engine.
///
/// Each call to `send` carries exactly one datagram; each successful
/// `recv_timeout` yields exactly one datagram.
pub trait Transport {
    /// Sends one datagram.
    ///
    /// Returns the number of bytes the transport accepted.
    fn send(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Waits up to `timeout` for one datagram.
    ///
    /// Returns `Ok(None)` if nothing arrived in time. A zero timeout
    /// polls without blocking. Datagrams larger than `buf` are truncated.
    fn recv_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<Option<usize>>;

    /// Local port the transport is bound to.
    fn local_port(&self) -> u16;

    /// Receive buffer size of the underlying socket, if known.
    fn recv_buffer_size(&self) -> Option<usize> {
        None
    }
}

/// Creates transports for a line.
pub trait Dialer {
    /// Transport produced by this dialer.
    type Transport: Transport;

    /// Resolves the engine address and opens a bound transport.
    fn dial(&mut self, config: &LineConfig) -> Result<Self::Transport>;
}

/// One scripted inbound event.
#[derive(Debug)]
enum Inbound {
    Datagram(Vec<u8>),
    Timeout,
    Error(io::ErrorKind),
}

#[derive(Debug, Default)]
struct Script {
    inbound: VecDeque<Inbound>,
    sent: Vec<Vec<u8>>,
    /// Number of sends that still succeed; `None` is unlimited.
    sends_left: Option<usize>,
    /// Accept one byte less than requested instead of failing outright.
    short_sends: bool,
    polls: Vec<Duration>,
}

/// A scripted transport for testing.
///
/// Inbound datagrams are queued up front and handed out in order; every
/// sent datagram is recorded. Clones share the same script, so a test can
/// keep a handle while the connection owns another.
#[derive(Debug, Clone)]
pub struct ScriptedTransport {
    script: Rc<RefCell<Script>>,
    local_port: u16,
    recv_buffer: Option<usize>,
}

impl ScriptedTransport {
    /// Creates an empty script reporting the given local port.
    pub fn new(local_port: u16) -> Self {
        Self {
            script: Rc::new(RefCell::new(Script::default())),
            local_port,
            recv_buffer: None,
        }
    }

    /// Reports a socket receive buffer of `size` bytes.
    pub fn with_recv_buffer(mut self, size: usize) -> Self {
        self.recv_buffer = Some(size);
        self
    }

    /// Queues an inbound datagram.
    pub fn push(&self, datagram: &[u8]) {
        self.script
            .borrow_mut()
            .inbound
            .push_back(Inbound::Datagram(datagram.to_vec()));
    }

    /// Queues a receive timeout.
    pub fn push_timeout(&self) {
        self.script.borrow_mut().inbound.push_back(Inbound::Timeout);
    }

    /// Queues a receive error.
    pub fn push_error(&self, kind: io::ErrorKind) {
        self.script.borrow_mut().inbound.push_back(Inbound::Error(kind));
    }

    /// Lets `count` more sends succeed, then fails every send.
    pub fn fail_sends_after(&self, count: usize) {
        self.script.borrow_mut().sends_left = Some(count);
    }

    /// Makes failing sends report a short write instead of an error.
    pub fn short_sends(&self) {
        self.script.borrow_mut().short_sends = true;
    }

    /// Returns a copy of all datagrams sent so far.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.script.borrow().sent.clone()
    }

    /// Removes and returns all datagrams sent so far.
    pub fn take_sent(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.script.borrow_mut().sent)
    }

    /// Number of inbound events not consumed yet.
    pub fn pending_inbound(&self) -> usize {
        self.script.borrow().inbound.len()
    }

    /// Timeouts passed to every receive call so far.
    pub fn polls(&self) -> Vec<Duration> {
        self.script.borrow().polls.clone()
    }
}

impl Transport for ScriptedTransport {
    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut script = self.script.borrow_mut();
        if let Some(left) = script.sends_left {
            if left == 0 {
                if script.short_sends {
                    return Ok(buf.len().saturating_sub(1));
                }
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "scripted send failure"));
            }
            script.sends_left = Some(left - 1);
        }
        script.sent.push(buf.to_vec());
        Ok(buf.len())
    }

    fn recv_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<Option<usize>> {
        let mut script = self.script.borrow_mut();
        script.polls.push(timeout);
        match script.inbound.pop_front() {
            Some(Inbound::Datagram(datagram)) => {
                let n = datagram.len().min(buf.len());
                buf[..n].copy_from_slice(&datagram[..n]);
                Ok(Some(n))
            }
            Some(Inbound::Error(kind)) => Err(io::Error::new(kind, "scripted receive failure")),
            Some(Inbound::Timeout) | None => Ok(None),
        }
    }

    fn local_port(&self) -> u16 {
        self.local_port
    }

    fn recv_buffer_size(&self) -> Option<usize> {
        self.recv_buffer
    }
}

/// Dialer handing out a scripted transport.
///
/// Every dial returns a handle to the same script.
#[derive(Debug, Clone)]
pub struct ScriptedDialer {
    transport: Option<ScriptedTransport>,
    dials: usize,
}

impl ScriptedDialer {
    /// Creates a dialer for the given script.
    pub fn new(transport: ScriptedTransport) -> Self {
        Self {
            transport: Some(transport),
            dials: 0,
        }
    }

    /// Creates a dialer whose setup always fails.
    pub fn unreachable() -> Self {
        Self {
            transport: None,
            dials: 0,
        }
    }

    /// Number of dial attempts so far.
    pub fn dials(&self) -> usize {
        self.dials
    }
}

impl Dialer for ScriptedDialer {
    type Transport = ScriptedTransport;

    fn dial(&mut self, config: &LineConfig) -> Result<ScriptedTransport> {
        self.dials += 1;
        self.transport
            .clone()
            .ok_or_else(|| Error::Setup(format!("node name ({}) unknown", config.node)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_order() {
        let mut transport = ScriptedTransport::new(1234);
        transport.push(b"one");
        transport.push_timeout();
        transport.push(b"three");

        let mut buf = [0u8; 8];
        let wait = Duration::from_millis(5);
        assert_eq!(transport.recv_timeout(&mut buf, wait).unwrap(), Some(3));
        assert_eq!(&buf[..3], b"one");
        assert_eq!(transport.recv_timeout(&mut buf, wait).unwrap(), None);
        assert_eq!(transport.recv_timeout(&mut buf, wait).unwrap(), Some(5));
        assert_eq!(transport.recv_timeout(&mut buf, wait).unwrap(), None);
        assert_eq!(transport.polls().len(), 4);
    }

    #[test]
    fn test_scripted_truncates() {
        let mut transport = ScriptedTransport::new(1);
        transport.push(&[7u8; 10]);

        let mut buf = [0u8; 4];
        assert_eq!(transport.recv_timeout(&mut buf, Duration::ZERO).unwrap(), Some(4));
    }

    #[test]
    fn test_scripted_send_failures() {
        let mut transport = ScriptedTransport::new(1);
        let handle = transport.clone();
        transport.fail_sends_after(1);

        assert_eq!(transport.send(b"ok").unwrap(), 2);
        assert!(transport.send(b"lost").is_err());
        assert_eq!(handle.sent(), vec![b"ok".to_vec()]);

        handle.short_sends();
        assert_eq!(transport.send(b"short").unwrap(), 4);
    }

    #[test]
    fn test_dialer_shares_script() {
        let transport = ScriptedTransport::new(5);
        let mut dialer = ScriptedDialer::new(transport.clone());

        let mut dialed = dialer.dial(&LineConfig::default()).unwrap();
        dialed.send(b"x").unwrap();
        assert_eq!(transport.sent().len(), 1);
        assert_eq!(dialer.dials(), 1);

        let mut unreachable = ScriptedDialer::unreachable();
        assert!(matches!(
            unreachable.dial(&LineConfig::default()),
            Err(Error::Setup(_))
        ));
    }
}

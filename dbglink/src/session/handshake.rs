//! Connect handshake.
//!
//! The host sends a connect request padded to its packet size; the engine
//! answers with a connect acknowledgment whose length confirms the packet
//! size it accepts and whose sequence field is the first reply sequence.

use std::net::Ipv4Addr;
use std::time::Duration;

use super::Established;
use crate::connection::Connection;
use crate::core::{has_magic, Opcode, PacketHeader, CONTROL_PACKET_SIZE, HEADER_SIZE};
use crate::error::{Error, Result, Violation};
use crate::transport::{Dialer, Transport};
use crate::{MAGIC, MIN_PACKET_SIZE, PCKLEN_MAX};

/// Connect attempts before giving up.
pub const HANDSHAKE_ATTEMPTS: usize = 10;

/// Time to wait for each connect acknowledgment.
pub const HANDSHAKE_WAIT: Duration = Duration::from_millis(500);

/// Protocol version announced in the connect request flag.
const PROTOCOL_VERSION: u8 = 1;

/// Address reported for a legacy debug unit acknowledgment.
const LEGACY_UNIT_ADDR: Ipv4Addr = Ipv4Addr::new(1, 1, 1, 11);

/// Result of a single connect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    NoResponse,
    Accepted,
    Refused { addr: Ipv4Addr, legacy: bool },
}

impl<D: Dialer> Connection<D> {
    /// Establishes the line.
    ///
    /// Opens the transport if needed, then sends up to
    /// [`HANDSHAKE_ATTEMPTS`] connect requests. On failure the transport
    /// is released so the next call starts clean.
    pub fn connect(&mut self) -> Result<Established> {
        if self.up {
            return Ok(Established::Existing);
        }

        match self.establish() {
            Ok(()) => {
                self.up = true;
                log::info!(
                    "connected to {}:{} packet_size={} receive_port={}",
                    self.config.node,
                    self.config.port,
                    self.packet_size,
                    self.receive_port
                );
                Ok(Established::New)
            }
            Err(err) => {
                log::debug!("connect failed: {}", err);
                self.transport = None;
                self.up = false;
                Err(err)
            }
        }
    }

    fn establish(&mut self) -> Result<()> {
        if self.transport.is_none() {
            let transport = self.dialer.dial(&self.config)?;
            self.receive_port = transport.local_port();
            self.transport = Some(transport);
        }

        let mut packet_size = self.config.packet_len.min(PCKLEN_MAX);
        if let Some(buffer) = self.transport.as_ref().and_then(Transport::recv_buffer_size) {
            if buffer > 0 && buffer < packet_size {
                packet_size = buffer;
            }
        }
        if packet_size < MIN_PACKET_SIZE {
            return Err(Violation::PacketSizeTooSmall {
                size: packet_size,
                min: MIN_PACKET_SIZE,
            }
            .into());
        }
        self.packet_size = packet_size;

        for attempt in 1..=HANDSHAKE_ATTEMPTS {
            match self.connect_attempt()? {
                Attempt::Accepted => return Ok(()),
                Attempt::Refused { addr, legacy } => {
                    return Err(Error::HandshakeRefused { addr, legacy });
                }
                Attempt::NoResponse => {
                    log::debug!("no connect acknowledgment (attempt {}/{})", attempt, HANDSHAKE_ATTEMPTS);
                }
            }
        }

        Err(Error::HandshakeTimeout)
    }

    fn connect_attempt(&mut self) -> Result<Attempt> {
        self.transmit_seq = 1;

        // The request is padded to the packet size so the engine learns it.
        let request_len = self.packet_size.max(CONTROL_PACKET_SIZE);
        self.tx_buf.clear();
        PacketHeader::new(Opcode::ConnectRequest, PROTOCOL_VERSION, self.transmit_seq).write_to(&mut self.tx_buf);
        self.tx_buf.extend_from_slice(&self.config.port.to_be_bytes());
        self.tx_buf.extend_from_slice(&self.receive_port.to_be_bytes());
        self.tx_buf.extend_from_slice(MAGIC);
        self.tx_buf.resize(request_len, 0);

        if let Err(err) = self.send_staged() {
            log::debug!("connect request not sent: {}", err);
            return Ok(Attempt::NoResponse);
        }

        let len = match self.poll_datagram(request_len, HANDSHAKE_WAIT) {
            Ok(Some(len)) => len,
            Ok(None) => return Ok(Attempt::NoResponse),
            Err(err) => {
                log::debug!("connect acknowledgment not received: {}", err);
                return Ok(Attempt::NoResponse);
            }
        };

        let reply = &self.rx_buf[..len];
        let Some(header) = PacketHeader::parse(reply).filter(|_| has_magic(reply)) else {
            return Ok(Attempt::NoResponse);
        };
        self.receive_seq = header.seq;

        match header.opcode() {
            Some(Opcode::ConnectAck) => {
                self.packet_size = self.packet_size.min(len);
                Ok(Attempt::Accepted)
            }
            Some(Opcode::ConnectAckLegacy) => Ok(Attempt::Refused {
                addr: LEGACY_UNIT_ADDR,
                legacy: true,
            }),
            Some(Opcode::ConnectNak) => {
                let addr = Ipv4Addr::new(reply[HEADER_SIZE], reply[5], reply[6], reply[7]);
                Ok(Attempt::Refused { addr, legacy: false })
            }
            _ => Ok(Attempt::NoResponse),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LineConfig;
    use crate::core::control_packet;
    use crate::transport::{ScriptedDialer, ScriptedTransport};

    fn line_with(config: LineConfig) -> (Connection<ScriptedDialer>, ScriptedTransport) {
        let transport = ScriptedTransport::new(4711);
        let line = Connection::new(config, ScriptedDialer::new(transport.clone()));
        (line, transport)
    }

    fn connect_ack(opcode: Opcode, seq: u16, len: usize) -> Vec<u8> {
        let mut packet = control_packet(opcode, seq).to_vec();
        packet.resize(len, 0);
        packet
    }

    #[test]
    fn test_connect_success() {
        let (mut line, transport) = line_with(LineConfig::new().with_port(20000));
        transport.push(&connect_ack(Opcode::ConnectAck, 0x0200, 512));

        assert_eq!(line.connect().unwrap(), Established::New);
        assert!(line.is_up());
        assert_eq!(line.packet_size(), 512);
        assert_eq!(line.receive_seq(), 0x0200);
        assert_eq!(line.transmit_seq(), 1);
        assert_eq!(line.receive_port(), 4711);

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        let request = &sent[0];
        assert_eq!(request.len(), 1024);
        assert_eq!(&request[..8], &[0x03, 0x01, 0x00, 0x01, 0x4E, 0x20, 0x12, 0x67]);
        assert_eq!(&request[8..16], MAGIC);
        assert!(request[16..].iter().all(|&b| b == 0));
        assert_eq!(transport.polls(), vec![HANDSHAKE_WAIT]);
    }

    #[test]
    fn test_connect_when_up_sends_nothing() {
        let (mut line, transport) = line_with(LineConfig::default());
        transport.push(&connect_ack(Opcode::ConnectAck, 1, 1024));
        line.connect().unwrap();
        transport.take_sent();

        assert_eq!(line.connect().unwrap(), Established::Existing);
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn test_retries_until_answer() {
        let (mut line, transport) = line_with(LineConfig::default());
        transport.push_timeout();
        // Wrong magic.
        transport.push(&[0x13, 0, 0, 1, 0, 0, 0, 0, b'T', b'R', b'A', b'C', b'E', b'6', b'4', 0]);
        // Unknown opcode.
        transport.push(&connect_ack(Opcode::Handshake, 1, 16));
        transport.push(&connect_ack(Opcode::ConnectAck, 9, 1024));

        assert_eq!(line.connect().unwrap(), Established::New);
        assert_eq!(transport.sent().len(), 4);
        assert_eq!(line.receive_seq(), 9);
    }

    #[test]
    fn test_timeout_after_ten_attempts() {
        let (mut line, transport) = line_with(LineConfig::default());

        assert!(matches!(line.connect(), Err(Error::HandshakeTimeout)));
        assert_eq!(transport.sent().len(), HANDSHAKE_ATTEMPTS);
        assert!(!line.is_up());
        assert!(line.transport().is_none());
    }

    #[test]
    fn test_refused_is_terminal() {
        let (mut line, transport) = line_with(LineConfig::default());
        let mut nak = connect_ack(Opcode::ConnectNak, 0, 16);
        nak[4..8].copy_from_slice(&[192, 168, 1, 20]);
        transport.push(&nak);
        transport.push(&connect_ack(Opcode::ConnectAck, 0, 1024));

        match line.connect() {
            Err(Error::HandshakeRefused { addr, legacy }) => {
                assert_eq!(addr, Ipv4Addr::new(192, 168, 1, 20));
                assert!(!legacy);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(transport.sent().len(), 1);
        assert_eq!(transport.pending_inbound(), 1);
        assert!(line.transport().is_none());
    }

    #[test]
    fn test_legacy_unit() {
        let (mut line, transport) = line_with(LineConfig::default());
        transport.push(&connect_ack(Opcode::ConnectAckLegacy, 0, 16));

        match line.connect() {
            Err(Error::HandshakeRefused { addr, legacy }) => {
                assert_eq!(addr, LEGACY_UNIT_ADDR);
                assert!(legacy);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(!line.is_up());
    }

    #[test]
    fn test_packet_size_shrinks_to_socket_buffer() {
        let transport = ScriptedTransport::new(1).with_recv_buffer(600);
        let mut line = Connection::new(LineConfig::default(), ScriptedDialer::new(transport.clone()));
        transport.push(&connect_ack(Opcode::ConnectAck, 0, 1024));

        line.connect().unwrap();
        assert_eq!(line.packet_size(), 600);
        assert_eq!(transport.sent()[0].len(), 600);
    }

    #[test]
    fn test_send_failure_counts_as_no_response() {
        let (mut line, transport) = line_with(LineConfig::default());
        transport.fail_sends_after(0);

        assert!(matches!(line.connect(), Err(Error::HandshakeTimeout)));
        assert!(transport.polls().is_empty());
    }

    #[test]
    fn test_setup_failure_leaves_line_down() {
        let mut line = Connection::new(LineConfig::default(), ScriptedDialer::unreachable());
        assert!(matches!(line.connect(), Err(Error::Setup(_))));
        assert!(!line.is_up());
        assert!(line.transport().is_none());
    }

    #[test]
    fn test_rejects_tiny_packet_size() {
        let (mut line, transport) = line_with(LineConfig::new().with_packet_len(4));

        assert!(matches!(line.connect(), Err(Error::ProtocolViolation(_))));
        assert!(transport.sent().is_empty());
    }
}

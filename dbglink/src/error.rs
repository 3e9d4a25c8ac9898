//! Error types for the debug link.

use std::io;
use std::net::Ipv4Addr;

use thiserror::Error;

/// Ways in which the engine broke the wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Violation {
    /// Datagram too short to carry a header and payload.
    #[error("undersized packet of {len} bytes")]
    Undersized {
        /// Received length.
        len: usize,
    },

    /// Opcode not valid at this point of the exchange.
    #[error("unexpected opcode {opcode:#04x}")]
    UnexpectedOpcode {
        /// Received opcode.
        opcode: u8,
    },

    /// Assembled message grew beyond the maximum message size.
    #[error("message exceeds {limit} bytes")]
    MessageTooLarge {
        /// The size limit that was exceeded.
        limit: usize,
    },

    /// Negotiated packet size cannot carry any payload.
    #[error("packet size {size} is below the minimum of {min}")]
    PacketSizeTooSmall {
        /// Negotiated packet size.
        size: usize,
        /// Smallest usable packet size.
        min: usize,
    },
}

/// Errors reported by connection operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad configuration key or value.
    #[error("configuration error: {0}")]
    Config(String),

    /// Socket creation, bind, option tuning or name resolution failed.
    #[error("setup error: {0}")]
    Setup(String),

    /// The engine explicitly refused the connection.
    #[error("access refused by {addr}{}", legacy_note(.legacy))]
    HandshakeRefused {
        /// Address reported by the engine.
        addr: Ipv4Addr,
        /// True for the legacy debug-unit acknowledgment.
        legacy: bool,
    },

    /// No usable handshake reply within the attempt ceiling.
    #[error("engine not responding")]
    HandshakeTimeout,

    /// Resync exhausted its receive attempts or timed out.
    #[error("sequence resync failed")]
    SyncFailed,

    /// No datagram arrived within the poll timeout.
    #[error("receive timed out")]
    ReceiveTimeout,

    /// The engine violated the protocol.
    #[error("protocol violation: {0}")]
    ProtocolViolation(#[from] Violation),

    /// A datagram was not accepted completely by the transport.
    #[error("transmit failure: sent {sent} of {expected} bytes")]
    TransmitFailure {
        /// Datagram length.
        expected: usize,
        /// Bytes the transport accepted.
        sent: usize,
    },

    /// Attempted to transmit a zero-length message.
    #[error("empty message")]
    EmptyMessage,

    /// Operation requires an allocated transport.
    #[error("line not connected")]
    NotConnected,

    /// I/O error from the transport.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Result alias for link operations.
pub type Result<T> = std::result::Result<T, Error>;

fn legacy_note(legacy: &bool) -> &'static str {
    if *legacy { " (legacy debug unit)" } else { "" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refused_display() {
        let err = Error::HandshakeRefused {
            addr: Ipv4Addr::new(10, 0, 0, 7),
            legacy: false,
        };
        assert_eq!(err.to_string(), "access refused by 10.0.0.7");

        let err = Error::HandshakeRefused {
            addr: Ipv4Addr::new(1, 1, 1, 11),
            legacy: true,
        };
        assert_eq!(err.to_string(), "access refused by 1.1.1.11 (legacy debug unit)");
    }

    #[test]
    fn test_violation_converts() {
        let err: Error = Violation::Undersized { len: 3 }.into();
        assert!(matches!(
            err,
            Error::ProtocolViolation(Violation::Undersized { len: 3 })
        ));
        assert_eq!(err.to_string(), "protocol violation: undersized packet of 3 bytes");
    }
}

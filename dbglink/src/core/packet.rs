//! Packet header definition and serialization.
//!
//! Every datagram starts with a 4-byte header. Multi-byte fields are in
//! network byte order.
//!
//! # Packet Format
//!
//! ```text
//! 0                   1                   2                   3
//! 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |    Opcode     |     Flag      |        Sequence Number        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                          Payload...                           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Control packets (disconnect, handshake, sync) are always 16 bytes: the
//! header, four zero bytes and the NUL-terminated magic `TRACE32`.

use crate::MAGIC;

/// Packet header size in bytes.
pub const HEADER_SIZE: usize = 4;

/// Size of a control packet.
pub const CONTROL_PACKET_SIZE: usize = 16;

/// Offset of the magic tag inside control and connect packets.
const MAGIC_OFFSET: usize = 8;

/// Opcodes understood by the engine. Values are fixed by the engine side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    /// Reply data from the engine.
    Reply = 0x01,

    /// Sequence resync request.
    SyncRequest = 0x02,

    /// Connection request.
    ConnectRequest = 0x03,

    /// Disconnect.
    Disconnect = 0x04,

    /// Legacy request to restart a resync exchange.
    SyncRestart = 0x05,

    /// Asynchronous notification.
    Notification = 0x06,

    /// Flow-control handshake acknowledgment.
    Handshake = 0x07,

    /// Request data from the host.
    Data = 0x11,

    /// Resync acknowledgment.
    SyncAck = 0x12,

    /// Positive connect acknowledgment.
    ConnectAck = 0x13,

    /// Resync confirmation.
    SyncBack = 0x22,

    /// Negative connect acknowledgment.
    ConnectNak = 0x23,

    /// Positive connect acknowledgment from a legacy debug unit.
    ConnectAckLegacy = 0x53,
}

impl Opcode {
    /// Converts a byte to an Opcode.
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Reply),
            0x02 => Some(Self::SyncRequest),
            0x03 => Some(Self::ConnectRequest),
            0x04 => Some(Self::Disconnect),
            0x05 => Some(Self::SyncRestart),
            0x06 => Some(Self::Notification),
            0x07 => Some(Self::Handshake),
            0x11 => Some(Self::Data),
            0x12 => Some(Self::SyncAck),
            0x13 => Some(Self::ConnectAck),
            0x22 => Some(Self::SyncBack),
            0x23 => Some(Self::ConnectNak),
            0x53 => Some(Self::ConnectAckLegacy),
            _ => None,
        }
    }

    /// Returns the wire value.
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Continuation flag of a data fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Flag {
    /// Last fragment of the message.
    Last = 0,

    /// More fragments follow.
    More = 1,

    /// Sender waits for a handshake acknowledgment before continuing.
    AckRequest = 2,
}

impl Flag {
    /// Converts a byte to a Flag.
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Last),
            1 => Some(Self::More),
            2 => Some(Self::AckRequest),
            _ => None,
        }
    }

    /// Returns true if the message continues after this fragment.
    pub const fn continues(self) -> bool {
        !matches!(self, Self::Last)
    }
}

/// The 4-byte header in front of every packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Raw opcode byte.
    pub opcode: u8,

    /// Raw flag byte; meaning depends on the opcode.
    pub flag: u8,

    /// Packet sequence number.
    pub seq: u16,
}

impl PacketHeader {
    /// Creates a header.
    pub const fn new(opcode: Opcode, flag: u8, seq: u16) -> Self {
        Self {
            opcode: opcode as u8,
            flag,
            seq,
        }
    }

    /// Parses the header at the start of `buf`.
    ///
    /// Returns `None` if the buffer is shorter than a header.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            opcode: buf[0],
            flag: buf[1],
            seq: u16::from_be_bytes([buf[2], buf[3]]),
        })
    }

    /// Serializes the header.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let seq = self.seq.to_be_bytes();
        [self.opcode, self.flag, seq[0], seq[1]]
    }

    /// Appends the serialized header to `buf`.
    pub fn write_to(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_bytes());
    }

    /// Returns the decoded opcode, if known.
    pub fn opcode(&self) -> Option<Opcode> {
        Opcode::from_u8(self.opcode)
    }

    /// Returns true if the header carries the given opcode.
    pub fn is(&self, opcode: Opcode) -> bool {
        self.opcode == opcode as u8
    }
}

/// Builds a 16-byte control packet.
pub fn control_packet(opcode: Opcode, seq: u16) -> [u8; CONTROL_PACKET_SIZE] {
    let mut packet = [0u8; CONTROL_PACKET_SIZE];
    packet[..HEADER_SIZE].copy_from_slice(&PacketHeader::new(opcode, 0, seq).to_bytes());
    packet[MAGIC_OFFSET..].copy_from_slice(MAGIC);
    packet
}

/// Returns true if `packet` carries the magic tag at its usual offset.
pub fn has_magic(packet: &[u8]) -> bool {
    packet.len() >= MAGIC_OFFSET + MAGIC.len() && &packet[MAGIC_OFFSET..MAGIC_OFFSET + MAGIC.len()] == MAGIC
}

//! Core data structures for the link protocol.
//!
//! This module contains fundamental building blocks:
//! - Packet: wire header, opcodes and control packets
//! - Fragment: splitting a message into packet-sized payloads

mod fragment;
mod packet;

pub use fragment::{fragment_count, Fragment, Fragments};
pub use packet::{control_packet, has_magic, Flag, Opcode, PacketHeader, CONTROL_PACKET_SIZE, HEADER_SIZE};

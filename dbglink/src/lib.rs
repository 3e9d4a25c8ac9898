//! # dbglink - Reliable Message Link to a Remote Debug Engine
//!
//! dbglink carries request/reply messages between a host and a single remote
//! debug engine over plain UDP datagrams. It provides:
//!
//! - **Session setup**: a connect handshake that negotiates the packet size
//! - **Fragmentation**: messages larger than one datagram are split into
//!   sequenced fragments and reassembled on receive
//! - **Implicit retransmission**: when the engine echoes the previous reply
//!   sequence, the last request is resent verbatim
//! - **Notification interception**: asynchronous engine notifications that
//!   arrive in the middle of a reply are queued instead of consumed
//! - **Resync**: sequence realignment without tearing down the socket
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    Command Layer (caller)                │
//! ├─────────────────────────────────────────────────────────┤
//! │                    Connection                            │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────┐   │
//! │  │  Handshake  │ │   Resync    │ │ Notifications   │   │
//! │  └─────────────┘ └─────────────┘ └─────────────────┘   │
//! ├─────────────────────────────────────────────────────────┤
//! │                    Channel                               │
//! │  ┌─────────────┐ ┌─────────────────────────────────┐   │
//! │  │  Transmit   │ │  Receive (reassembly, dup-ack)  │   │
//! │  └─────────────┘ └─────────────────────────────────┘   │
//! ├─────────────────────────────────────────────────────────┤
//! │                    Transport (UDP / scripted)            │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use dbglink::{Connection, LineConfig};
//!
//! # fn main() -> dbglink::Result<()> {
//! let config: LineConfig = "NODE=localhost PORT=20000 PACKLEN=1024".parse()?;
//! let mut line = Connection::udp(config);
//! line.connect()?;
//!
//! line.transmit(b"\x02\x00\x00\x00\x00")?;
//! let reply = line.receive()?;
//!
//! while let Some(notification) = line.receive_notification()? {
//!     println!("notification kind {}", notification.kind());
//! }
//! # let _ = reply;
//! line.disconnect();
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod channel;
pub mod config;
pub mod core;
pub mod error;
pub mod notify;
pub mod peer;
pub mod session;
pub mod transport;

mod connection;

// Re-export commonly used types
pub use config::LineConfig;
pub use connection::{Connection, LineStats};
pub use crate::core::{Flag, Opcode, PacketHeader, HEADER_SIZE};
pub use error::{Error, Result, Violation};
pub use notify::{Notification, NotificationQueue};
pub use session::Established;
pub use transport::{Dialer, Transport};

/// Maximum size of a single datagram, header included.
pub const PCKLEN_MAX: usize = 0x4000;

/// Maximum size of an assembled message.
pub const MAX_MESSAGE_SIZE: usize = PCKLEN_MAX + 256;

/// Smallest packet size that still carries one payload byte.
pub const MIN_PACKET_SIZE: usize = HEADER_SIZE + 1;

/// Minimum socket buffer size required on both directions.
pub const MIN_SOCKET_BUFFER: usize = 0x4000;

/// Magic tag carried by every control packet.
pub const MAGIC: &[u8; 8] = b"TRACE32\0";

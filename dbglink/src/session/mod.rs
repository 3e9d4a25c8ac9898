//! Session management.
//!
//! - Handshake: establishes the line and negotiates the packet size
//! - Resync: realigns sequence numbers without a new handshake
//! - Teardown: tells the engine the line is going away

mod handshake;
mod resync;
mod teardown;

pub use handshake::{HANDSHAKE_ATTEMPTS, HANDSHAKE_WAIT};
pub use resync::{SYNC_ATTEMPTS, SYNC_WAIT};
pub use teardown::DISCONNECT_REPEAT;

/// Outcome of a successful connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Established {
    /// A new session was negotiated.
    New,

    /// The line was already up; nothing was sent.
    Existing,
}

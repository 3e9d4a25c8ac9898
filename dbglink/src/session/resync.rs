//! Sequence resynchronization.
//!
//! ```text
//!   host                          engine
//!    |  SyncRequest(tx_seq)  ------> |
//!    |  <------  SyncAck(rx_seq)     |     (or SyncRestart: start over)
//!    |  SyncBack(tx_seq)     ------> |
//! ```

use std::time::Duration;

use crate::connection::Connection;
use crate::core::{control_packet, has_magic, Opcode, PacketHeader, CONTROL_PACKET_SIZE};
use crate::error::{Error, Result};
use crate::transport::Dialer;
use crate::PCKLEN_MAX;

/// Receive attempts shared by all rounds of one resync.
pub const SYNC_ATTEMPTS: usize = 20;

/// Time to wait for each answer.
pub const SYNC_WAIT: Duration = Duration::from_millis(500);

/// Distance of the duplicate marker from the adopted receive sequence.
const SEQUENCE_GAP: u16 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncStep {
    Sending,
    Waiting,
    Done,
    Failed,
}

impl<D: Dialer> Connection<D> {
    /// Realigns sequence numbers with the engine.
    ///
    /// On success the receive sequence is the engine's, and the duplicate
    /// marker is moved far enough behind it that the next reply cannot be
    /// mistaken for a repeat.
    pub fn sync(&mut self) -> Result<()> {
        if self.transport.is_none() {
            return Err(Error::NotConnected);
        }

        let mut attempts = 0;
        let mut step = SyncStep::Sending;
        loop {
            step = match step {
                SyncStep::Sending => {
                    self.send_datagram(&control_packet(Opcode::SyncRequest, self.transmit_seq))?;
                    SyncStep::Waiting
                }
                SyncStep::Waiting if attempts >= SYNC_ATTEMPTS => SyncStep::Failed,
                SyncStep::Waiting => {
                    attempts += 1;
                    match self.poll_datagram(PCKLEN_MAX, SYNC_WAIT)? {
                        Some(len) => self.sync_answer(len)?,
                        None => SyncStep::Failed,
                    }
                }
                SyncStep::Done => {
                    log::info!(
                        "resynced receive_seq={} transmit_seq={}",
                        self.receive_seq,
                        self.transmit_seq
                    );
                    return Ok(());
                }
                SyncStep::Failed => {
                    log::warn!("resync failed after {} receive attempts", attempts);
                    return Err(Error::SyncFailed);
                }
            };
        }
    }

    fn sync_answer(&mut self, len: usize) -> Result<SyncStep> {
        let packet = &self.rx_buf[..len];
        if len != CONTROL_PACKET_SIZE {
            return Ok(SyncStep::Waiting);
        }
        let Some(header) = PacketHeader::parse(packet) else {
            return Ok(SyncStep::Waiting);
        };

        if header.is(Opcode::SyncAck) && has_magic(packet) {
            self.receive_seq = header.seq;
            self.last_receive_seq = header.seq.wrapping_sub(SEQUENCE_GAP);
            self.send_datagram(&control_packet(Opcode::SyncBack, self.transmit_seq))?;
            return Ok(SyncStep::Done);
        }
        if header.is(Opcode::SyncRestart) {
            log::debug!("engine restarted resync");
            return Ok(SyncStep::Sending);
        }
        Ok(SyncStep::Waiting)
    }
}

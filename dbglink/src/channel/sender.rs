//! Sender side of the channel.
//!
//! Handles message fragmentation and caches the last message so the
//! receiver can resend it when the engine asks for it again.

use crate::connection::Connection;
use crate::core::{Fragments, Opcode, PacketHeader};
use crate::error::{Error, Result};
use crate::transport::Dialer;

impl<D: Dialer> Connection<D> {
    /// Sends a message, fragmenting it if necessary.
    ///
    /// Each fragment is a data packet carrying the next transmit sequence.
    /// If any fragment is not accepted by the transport the whole message
    /// must be treated as undelivered.
    ///
    /// Returns the message length.
    pub fn transmit(&mut self, message: &[u8]) -> Result<usize> {
        self.ensure_ready()?;
        if message.is_empty() {
            return Err(Error::EmptyMessage);
        }

        self.last_transmit.clear();
        self.last_transmit.extend_from_slice(message);
        self.last_transmit_seq = self.transmit_seq;

        self.send_fragments(message)?;
        Ok(message.len())
    }

    /// Resends the cached message starting from its original sequence.
    pub(crate) fn retransmit(&mut self) -> Result<()> {
        self.transmit_seq = self.last_transmit_seq;
        self.stats.retransmissions += 1;
        log::warn!(
            "engine repeated seq {}, resending {} bytes from seq {}",
            self.last_receive_seq,
            self.last_transmit.len(),
            self.last_transmit_seq
        );

        let cached = std::mem::take(&mut self.last_transmit);
        let result = self.send_fragments(&cached);
        self.last_transmit = cached;
        result
    }

    fn send_fragments(&mut self, message: &[u8]) -> Result<()> {
        self.stats.messages_sent += 1;

        let mut count = 0usize;
        for fragment in Fragments::new(message, self.packet_size) {
            let header = PacketHeader::new(Opcode::Data, fragment.flag as u8, self.transmit_seq);

            self.tx_buf.clear();
            header.write_to(&mut self.tx_buf);
            self.tx_buf.extend_from_slice(fragment.payload);
            self.send_staged()?;

            self.transmit_seq = self.transmit_seq.wrapping_add(1);
            count += 1;
        }

        log::debug!(
            "transmitted message len={} fragments={} next_seq={}",
            message.len(),
            count,
            self.transmit_seq
        );
        Ok(())
    }
}

//! Line teardown.

use crate::connection::Connection;
use crate::core::{control_packet, Opcode};
use crate::transport::Dialer;

/// Disconnect packets sent per teardown; there is no acknowledgment.
pub const DISCONNECT_REPEAT: usize = 5;

impl<D: Dialer> Connection<D> {
    /// Tears the line down and releases the transport.
    ///
    /// Safe to call any number of times. Send failures are logged and
    /// otherwise ignored.
    pub fn disconnect(&mut self) {
        if self.up {
            let packet = control_packet(Opcode::Disconnect, 0);
            for _ in 0..DISCONNECT_REPEAT {
                if let Err(err) = self.send_datagram(&packet) {
                    log::warn!("disconnect packet not sent: {}", err);
                }
            }
            log::info!("disconnected from {}:{}", self.config.node, self.config.port);
        }

        self.transport = None;
        self.up = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LineConfig;
    use crate::transport::{ScriptedDialer, ScriptedTransport};

    fn open_line() -> (Connection<ScriptedDialer>, ScriptedTransport) {
        let transport = ScriptedTransport::new(4000);
        let mut line = Connection::new(LineConfig::default(), ScriptedDialer::new(transport.clone()));
        line.transport = Some(transport.clone());
        line.up = true;
        (line, transport)
    }

    #[test]
    fn test_sends_disconnect_packets() {
        let (mut line, transport) = open_line();
        line.disconnect();

        let expected = control_packet(Opcode::Disconnect, 0).to_vec();
        assert_eq!(transport.sent(), vec![expected; DISCONNECT_REPEAT]);
        assert!(!line.is_up());
        assert!(line.transport().is_none());
    }

    #[test]
    fn test_idempotent() {
        let (mut line, transport) = open_line();
        line.disconnect();
        line.disconnect();
        drop(line);

        assert_eq!(transport.sent().len(), DISCONNECT_REPEAT);
    }

    #[test]
    fn test_never_connected_sends_nothing() {
        let transport = ScriptedTransport::new(4000);
        let mut line = Connection::new(LineConfig::default(), ScriptedDialer::new(transport.clone()));
        line.transport = Some(transport.clone());

        line.disconnect();
        assert!(transport.sent().is_empty());
        assert!(line.transport().is_none());
    }

    #[test]
    fn test_send_failures_are_ignored() {
        let (mut line, transport) = open_line();
        transport.fail_sends_after(2);

        line.disconnect();
        assert_eq!(transport.sent().len(), 2);
        assert!(!line.is_up());
    }

    #[test]
    fn test_drop_disconnects() {
        let (line, transport) = open_line();
        drop(line);
        assert_eq!(transport.sent().len(), DISCONNECT_REPEAT);
    }

    #[test]
    fn test_reconnect_after_disconnect() {
        let (mut line, transport) = open_line();
        line.disconnect();
        transport.take_sent();

        let mut ack = control_packet(Opcode::ConnectAck, 1).to_vec();
        ack.resize(1024, 0);
        transport.push(&ack);

        assert_eq!(line.connect().unwrap(), crate::session::Established::New);
        assert_eq!(transport.sent().len(), 1);
    }
}

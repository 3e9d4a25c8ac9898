//! Message channel of a connection.
//!
//! - Sender: fragments outgoing messages into sequenced data packets
//! - Receiver: reassembles replies, resends on duplicate sequence echoes and
//!   diverts notifications into the connection's queue

mod receiver;
mod sender;

//! UDP transport.
//!
//! One socket per line, bound to `0.0.0.0:HOSTPORT`, sending to the engine's
//! address and accepting datagrams from any source.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

use super::{Dialer, Transport};
use crate::config::LineConfig;
use crate::error::{Error, Result};
use crate::MIN_SOCKET_BUFFER;

/// UDP socket connected to one engine.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    remote: SocketAddr,
    local_port: u16,
    recv_buffer: usize,
}

impl UdpTransport {
    /// Opens a socket for the given configuration.
    ///
    /// Resolves `config.node`, binds the local port and makes sure both
    /// socket buffers hold at least [`MIN_SOCKET_BUFFER`] bytes.
    pub fn open(config: &LineConfig) -> Result<Self> {
        let remote_ip = resolve_ipv4(&config.node)?;
        let remote = SocketAddr::V4(SocketAddrV4::new(remote_ip, config.port));

        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(|e| Error::Setup(format!("cannot create socket: {e}")))?;

        let bind_addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, config.host_port));
        socket
            .bind(&bind_addr.into())
            .map_err(|e| Error::Setup(format!("cannot bind socket: {e}")))?;

        let recv_buffer = ensure_buffer(
            &socket,
            "rcvsocket",
            Socket::recv_buffer_size,
            Socket::set_recv_buffer_size,
        )?;
        ensure_buffer(
            &socket,
            "sndsocket",
            Socket::send_buffer_size,
            Socket::set_send_buffer_size,
        )?;

        let socket: UdpSocket = socket.into();
        let local_port = socket
            .local_addr()
            .map_err(|e| Error::Setup(format!("cannot identify port: {e}")))?
            .port();

        log::debug!(
            "[UDP] bound port={} remote={} rcvbuf={}",
            local_port,
            remote,
            recv_buffer
        );

        Ok(Self {
            socket,
            remote,
            local_port,
            recv_buffer,
        })
    }

    /// Address of the engine.
    pub fn remote(&self) -> SocketAddr {
        self.remote
    }
}

impl Transport for UdpTransport {
    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.socket.send_to(buf, self.remote)
    }

    fn recv_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<Option<usize>> {
        // A zero read timeout is rejected by the socket, so poll non-blocking instead.
        let result = if timeout.is_zero() {
            self.socket.set_nonblocking(true)?;
            let result = self.socket.recv_from(buf);
            self.socket.set_nonblocking(false)?;
            result
        } else {
            self.socket.set_read_timeout(Some(timeout))?;
            self.socket.recv_from(buf)
        };

        match result {
            Ok((len, _from)) => Ok(Some(len)),
            Err(ref e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn local_port(&self) -> u16 {
        self.local_port
    }

    fn recv_buffer_size(&self) -> Option<usize> {
        Some(self.recv_buffer)
    }
}

/// Dialer opening [`UdpTransport`] sockets.
#[derive(Debug, Default, Clone, Copy)]
pub struct UdpDialer;

impl Dialer for UdpDialer {
    type Transport = UdpTransport;

    fn dial(&mut self, config: &LineConfig) -> Result<UdpTransport> {
        UdpTransport::open(config)
    }
}

/// Resolves a dotted quad or host name to an IPv4 address.
///
/// An all-zero dotted quad falls through to name resolution.
pub fn resolve_ipv4(node: &str) -> Result<Ipv4Addr> {
    if let Ok(ip) = node.parse::<Ipv4Addr>() {
        if !ip.is_unspecified() {
            return Ok(ip);
        }
    }

    let unknown = |detail: String| Error::Setup(format!("node name ({node}) unknown{detail}"));
    (node, 0)
        .to_socket_addrs()
        .map_err(|e| unknown(format!(" ({e})")))?
        .find_map(|addr| match addr {
            SocketAddr::V4(v4) => Some(*v4.ip()),
            SocketAddr::V6(_) => None,
        })
        .ok_or_else(|| unknown(String::new()))
}

/// Grows a socket buffer to the required minimum and returns its final size.
fn ensure_buffer(
    socket: &Socket,
    name: &str,
    get: fn(&Socket) -> io::Result<usize>,
    set: fn(&Socket, usize) -> io::Result<()>,
) -> Result<usize> {
    let failed = || Error::Setup(format!("cannot alloc buffer for {name}"));

    let size = get(socket).unwrap_or(0);
    if size >= MIN_SOCKET_BUFFER {
        return Ok(size);
    }

    set(socket, MIN_SOCKET_BUFFER).map_err(|_| failed())?;
    let size = get(socket).map_err(|_| failed())?;
    if size < MIN_SOCKET_BUFFER {
        return Err(failed());
    }
    Ok(size)
}

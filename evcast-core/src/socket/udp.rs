//! UDP multicast sockets built with `socket2`.
//!
//! `std`/`tokio` sockets cannot set multicast options before binding, so
//! sockets are assembled with `socket2` and then handed over.

use async_trait::async_trait;
use futures::FutureExt;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::debug;

use super::{AsyncDatagramSocket, DatagramSocket};
use crate::error::socket_closed;
use crate::options::SocketOptions;

fn new_udp_socket() -> io::Result<Socket> {
    Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
}

/// Bind to the group's port on all interfaces and join the group.
fn bind_group(group: SocketAddrV4, options: &SocketOptions) -> io::Result<Socket> {
    let socket = new_udp_socket()?;
    if options.reuse_address {
        socket.set_reuse_address(true)?;
        #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
        socket.set_reuse_port(true)?;
    }
    if let Some(size) = options.recv_buffer_size {
        socket.set_recv_buffer_size(size)?;
    }
    let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, group.port());
    socket.bind(&SockAddr::from(bind_addr))?;
    socket.join_multicast_v4(group.ip(), &options.interface)?;
    socket.set_multicast_loop_v4(options.multicast_loop)?;
    debug!(group = %group, interface = %options.interface, "joined multicast group");
    Ok(socket)
}

#[inline]
fn is_poll_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}

/// Blocking UDP multicast socket.
///
/// Receives wake every [`SocketOptions::poll_interval`] to observe `close`.
#[derive(Debug)]
pub struct UdpMulticastSocket {
    socket: UdpSocket,
    group: SocketAddrV4,
    joined: bool,
    closed: AtomicBool,
}

impl UdpMulticastSocket {
    /// Join `group` for receiving.
    pub fn join(group: SocketAddrV4, options: &SocketOptions) -> io::Result<Self> {
        let socket = bind_group(group, options)?;
        socket.set_read_timeout(Some(options.poll_interval))?;
        Ok(Self {
            socket: socket.into(),
            group,
            joined: true,
            closed: AtomicBool::new(false),
        })
    }

    /// Open an ephemeral socket that sends to `group`.
    pub fn sender(group: SocketAddrV4, options: &SocketOptions) -> io::Result<Self> {
        let socket = new_udp_socket()?;
        socket.set_multicast_ttl_v4(options.multicast_ttl)?;
        socket.set_multicast_loop_v4(options.multicast_loop)?;
        socket.set_multicast_if_v4(&options.interface)?;
        if let Some(size) = options.send_buffer_size {
            socket.set_send_buffer_size(size)?;
        }
        socket.bind(&SockAddr::from(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)))?;
        debug!(group = %group, ttl = options.multicast_ttl, "opened multicast sender");
        Ok(Self {
            socket: socket.into(),
            group,
            joined: false,
            closed: AtomicBool::new(false),
        })
    }

    pub fn group(&self) -> SocketAddrV4 {
        self.group
    }
}

impl DatagramSocket for UdpMulticastSocket {
    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(socket_closed());
            }
            match self.socket.recv_from(buf) {
                Ok(received) => return Ok(received),
                Err(e) if is_poll_timeout(&e) => continue,
                Err(_) if self.closed.load(Ordering::Acquire) => return Err(socket_closed()),
                Err(e) => return Err(e),
            }
        }
    }

    fn send(&self, datagram: &[u8]) -> io::Result<usize> {
        if self.closed.load(Ordering::Acquire) {
            return Err(socket_closed());
        }
        self.socket.send_to(datagram, self.group)
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.joined {
            if let Err(e) = self
                .socket
                .leave_multicast_v4(self.group.ip(), &Ipv4Addr::UNSPECIFIED)
            {
                debug!(group = %self.group, error = %e, "leave multicast group failed");
            }
        }
        debug!(group = %self.group, "socket closed");
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

/// Non-blocking UDP multicast socket registered with a tokio runtime.
#[derive(Debug)]
pub struct AsyncUdpMulticastSocket {
    socket: tokio::net::UdpSocket,
    group: SocketAddrV4,
    closed: watch::Sender<bool>,
}

impl AsyncUdpMulticastSocket {
    /// Join `group` and register the socket with `handle`'s reactor.
    pub fn join(group: SocketAddrV4, options: &SocketOptions, handle: &Handle) -> io::Result<Self> {
        let socket = bind_group(group, options)?;
        socket.set_nonblocking(true)?;
        let std_socket: UdpSocket = socket.into();
        let socket = {
            let _guard = handle.enter();
            tokio::net::UdpSocket::from_std(std_socket)?
        };
        let (closed, _) = watch::channel(false);
        Ok(Self {
            socket,
            group,
            closed,
        })
    }
}

#[async_trait]
impl AsyncDatagramSocket for AsyncUdpMulticastSocket {
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow_and_update() {
            return Err(socket_closed());
        }
        futures::select! {
            received = self.socket.recv_from(buf).fuse() => received,
            _ = closed.changed().fuse() => Err(socket_closed()),
        }
    }

    fn close(&self) {
        if self.closed.send_replace(true) {
            return;
        }
        if let Err(e) = self
            .socket
            .leave_multicast_v4(*self.group.ip(), Ipv4Addr::UNSPECIFIED)
        {
            debug!(group = %self.group, error = %e, "leave multicast group failed");
        }
        debug!(group = %self.group, "async socket closed");
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

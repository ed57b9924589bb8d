//! Datagram socket abstraction.
//!
//! Pipelines hold a socket behind one of two traits so that the real UDP
//! multicast socket and the in-process transport are interchangeable:
//!
//! - [`DatagramSocket`]: blocking receive, used by the threaded listener
//!   and by every emitter
//! - [`AsyncDatagramSocket`]: async receive, used by the parallel listener
//!
//! Closing a socket is how a pipeline unblocks its receivers. Every pending
//! and future receive on a closed socket fails with
//! [`socket_closed`](crate::error::socket_closed), which callers treat as a
//! stop signal rather than a fault.

pub mod inproc;
pub mod udp;

use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::runtime::Handle;

use crate::endpoint::Endpoint;
use crate::options::SocketOptions;

pub use inproc::InprocSocket;
pub use udp::{AsyncUdpMulticastSocket, UdpMulticastSocket};

/// A socket joined to (or sending into) one multicast group.
pub trait DatagramSocket: Send + Sync {
    /// Block until a datagram arrives. Datagrams longer than `buf` are
    /// truncated.
    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;

    /// Send one datagram to the socket's group.
    fn send(&self, datagram: &[u8]) -> io::Result<usize>;

    /// Close the socket, releasing every blocked receiver. Idempotent.
    fn close(&self);

    fn is_closed(&self) -> bool;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// Receive side of a group membership driven by an async runtime.
#[async_trait]
pub trait AsyncDatagramSocket: Send + Sync {
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;

    /// Close the socket and cancel every pending receive. Idempotent.
    fn close(&self);

    fn is_closed(&self) -> bool;
}

/// Join the group named by `endpoint` for blocking receives.
pub fn join_group(
    endpoint: &Endpoint,
    options: &SocketOptions,
) -> io::Result<Arc<dyn DatagramSocket>> {
    match endpoint {
        Endpoint::Udp(group) => Ok(Arc::new(UdpMulticastSocket::join(*group, options)?)),
        Endpoint::Inproc(name) => Ok(Arc::new(InprocSocket::join(name))),
    }
}

/// Join the group named by `endpoint` for async receives on `handle`'s runtime.
pub fn join_group_async(
    endpoint: &Endpoint,
    options: &SocketOptions,
    handle: &Handle,
) -> io::Result<Arc<dyn AsyncDatagramSocket>> {
    match endpoint {
        Endpoint::Udp(group) => Ok(Arc::new(AsyncUdpMulticastSocket::join(
            *group, options, handle,
        )?)),
        Endpoint::Inproc(name) => Ok(Arc::new(InprocSocket::join(name))),
    }
}

/// Open a send-only socket targeting the group named by `endpoint`.
pub fn open_sender(
    endpoint: &Endpoint,
    options: &SocketOptions,
) -> io::Result<Arc<dyn DatagramSocket>> {
    match endpoint {
        Endpoint::Udp(group) => Ok(Arc::new(UdpMulticastSocket::sender(*group, options)?)),
        Endpoint::Inproc(name) => Ok(Arc::new(InprocSocket::sender(name))),
    }
}

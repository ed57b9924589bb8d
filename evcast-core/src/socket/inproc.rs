//! In-process multicast transport.
//!
//! Named groups live in a process-wide registry. Every member joined to a
//! group gets its own channel, and a send copies the datagram into every
//! member's channel, so in-process delivery has the same fan-out shape as
//! a multicast group on the wire.
//!
//! # Usage
//!
//! ```rust
//! use evcast_core::socket::{DatagramSocket, InprocSocket};
//!
//! let member = InprocSocket::join("doc-group");
//! let sender = InprocSocket::sender("doc-group");
//! sender.send(b"hello").unwrap();
//!
//! let mut buf = [0u8; 16];
//! let (n, _from) = member.recv_from(&mut buf).unwrap();
//! assert_eq!(&buf[..n], b"hello");
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use flume::{Receiver, Sender};
use once_cell::sync::Lazy;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tracing::trace;

use super::{AsyncDatagramSocket, DatagramSocket};
use crate::error::socket_closed;

/// One datagram in flight: payload and the sender's synthetic address.
type Datagram = (Bytes, SocketAddr);

struct Member {
    id: u32,
    tx: Sender<Datagram>,
}

/// Global registry of inproc groups and their members.
static GROUPS: Lazy<DashMap<String, Vec<Member>>> = Lazy::new(DashMap::new);

static NEXT_ID: AtomicU32 = AtomicU32::new(0);

/// Synthetic loopback address identifying socket `id` as a sender.
fn synthetic_addr(id: u32) -> SocketAddr {
    let port = (id % u32::from(u16::MAX)) as u16 + 1;
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port))
}

/// A socket attached to a named in-process group.
///
/// Created with [`InprocSocket::join`] it receives everything sent to the
/// group (its own sends included); created with [`InprocSocket::sender`]
/// it can only send.
pub struct InprocSocket {
    group: String,
    id: u32,
    addr: SocketAddr,
    rx: Option<Receiver<Datagram>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for InprocSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InprocSocket")
            .field("group", &self.group)
            .field("addr", &self.addr)
            .field("member", &self.rx.is_some())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl InprocSocket {
    /// Join `group` as a receiving member.
    pub fn join(group: &str) -> Self {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = flume::unbounded();
        GROUPS
            .entry(group.to_string())
            .or_default()
            .push(Member { id, tx });
        trace!(group, member = id, "joined inproc group");
        Self {
            group: group.to_string(),
            id,
            addr: synthetic_addr(id),
            rx: Some(rx),
            closed: AtomicBool::new(false),
        }
    }

    /// Open a send-only handle on `group`. The group need not exist yet.
    pub fn sender(group: &str) -> Self {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        Self {
            group: group.to_string(),
            id,
            addr: synthetic_addr(id),
            rx: None,
            closed: AtomicBool::new(false),
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close the socket and leave the group. Idempotent.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.leave();
        }
    }

    fn leave(&self) {
        if self.rx.is_none() {
            return;
        }
        // Dropping our registry sender disconnects the channel, which
        // releases every receive blocked on it.
        GROUPS.remove_if_mut(&self.group, |_, members| {
            members.retain(|m| m.id != self.id);
            members.is_empty()
        });
        trace!(group = %self.group, member = self.id, "left inproc group");
    }

    fn receiver(&self) -> io::Result<&Receiver<Datagram>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(socket_closed());
        }
        self.rx.as_ref().ok_or_else(|| {
            io::Error::new(io::ErrorKind::Unsupported, "send-only inproc socket")
        })
    }

    fn deliver(&self, (payload, from): Datagram, buf: &mut [u8]) -> (usize, SocketAddr) {
        let n = payload.len().min(buf.len());
        buf[..n].copy_from_slice(&payload[..n]);
        (n, from)
    }
}

impl DatagramSocket for InprocSocket {
    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let rx = self.receiver()?;
        match rx.recv() {
            Ok(datagram) if !self.is_closed() => Ok(self.deliver(datagram, buf)),
            _ => Err(socket_closed()),
        }
    }

    fn send(&self, datagram: &[u8]) -> io::Result<usize> {
        if self.closed.load(Ordering::Acquire) {
            return Err(socket_closed());
        }
        let payload = Bytes::copy_from_slice(datagram);
        if let Some(members) = GROUPS.get(&self.group) {
            for member in members.iter() {
                // A member that closed between lookup and send just misses it.
                let _ = member.tx.send((payload.clone(), self.addr));
            }
        }
        Ok(datagram.len())
    }

    fn close(&self) {
        InprocSocket::close(self);
    }

    fn is_closed(&self) -> bool {
        InprocSocket::is_closed(self)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.addr)
    }
}

#[async_trait]
impl AsyncDatagramSocket for InprocSocket {
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let rx = self.receiver()?;
        match rx.recv_async().await {
            Ok(datagram) if !self.is_closed() => Ok(self.deliver(datagram, buf)),
            _ => Err(socket_closed()),
        }
    }

    fn close(&self) {
        InprocSocket::close(self);
    }

    fn is_closed(&self) -> bool {
        InprocSocket::is_closed(self)
    }
}

impl Drop for InprocSocket {
    fn drop(&mut self) {
        self.close();
    }
}

/// Number of members currently joined to `group`.
pub fn member_count(group: &str) -> usize {
    GROUPS.get(group).map_or(0, |members| members.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::is_closed_socket;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn send_fans_out_to_every_member() {
        let a = InprocSocket::join("fanout");
        let b = InprocSocket::join("fanout");
        let tx = InprocSocket::sender("fanout");
        assert_eq!(member_count("fanout"), 2);

        tx.send(b"ping").unwrap();

        let mut buf = [0u8; 8];
        for socket in [&a, &b] {
            let (n, from) = DatagramSocket::recv_from(socket, &mut buf).unwrap();
            assert_eq!(&buf[..n], b"ping");
            assert_eq!(from, tx.local_addr().unwrap());
        }
    }

    #[test]
    fn long_datagram_is_truncated() {
        let a = InprocSocket::join("truncate");
        InprocSocket::sender("truncate").send(b"abcdef").unwrap();
        let mut buf = [0u8; 3];
        let (n, _) = DatagramSocket::recv_from(&a, &mut buf).unwrap();
        assert_eq!(n, 3);
        assert_eq!(&buf, b"abc");
    }

    #[test]
    fn close_releases_blocked_receiver() {
        let member = Arc::new(InprocSocket::join("close-release"));
        let blocked = Arc::clone(&member);
        let handle = thread::spawn(move || {
            let mut buf = [0u8; 8];
            DatagramSocket::recv_from(&*blocked, &mut buf)
        });
        thread::sleep(Duration::from_millis(20));
        member.close();

        let err = handle.join().unwrap().unwrap_err();
        assert!(is_closed_socket(&err));
        assert_eq!(member_count("close-release"), 0);
    }

    #[test]
    fn dropping_member_leaves_group() {
        {
            let _member = InprocSocket::join("drop-leave");
            assert_eq!(member_count("drop-leave"), 1);
        }
        assert_eq!(member_count("drop-leave"), 0);
    }

    #[test]
    fn sender_cannot_receive() {
        let tx = InprocSocket::sender("send-only");
        let mut buf = [0u8; 8];
        let err = DatagramSocket::recv_from(&tx, &mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
    }
}

//! Datagram socket configuration options
//!
//! Options applied to multicast sockets when they are created, in the
//! spirit of `setsockopt`.

use std::net::Ipv4Addr;
use std::time::Duration;

/// Socket configuration options.
///
/// # Examples
///
/// ```
/// use evcast_core::options::SocketOptions;
/// use std::time::Duration;
///
/// let opts = SocketOptions::default()
///     .with_multicast_ttl(4)
///     .with_poll_interval(Duration::from_millis(50));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketOptions {
    /// Multicast time-to-live (IP_MULTICAST_TTL)
    ///
    /// Number of router hops an emitted datagram may cross.
    /// - Default: 1 (stay on the local subnet)
    pub multicast_ttl: u32,

    /// Multicast loopback (IP_MULTICAST_LOOP)
    ///
    /// - `true` (default): listeners on the sending host see emitted events
    /// - `false`: emitted events only leave the host
    pub multicast_loop: bool,

    /// Interface used to join groups and send (IP_MULTICAST_IF)
    ///
    /// - Default: `0.0.0.0` (let the OS choose)
    pub interface: Ipv4Addr,

    /// Kernel receive buffer size (SO_RCVBUF)
    ///
    /// - `None`: OS default
    /// - `Some(bytes)`: request a larger buffer to absorb bursts
    pub recv_buffer_size: Option<usize>,

    /// Kernel send buffer size (SO_SNDBUF)
    pub send_buffer_size: Option<usize>,

    /// Address reuse (SO_REUSEADDR, and SO_REUSEPORT where available)
    ///
    /// - `true` (default): several listeners on one host may join the same group
    pub reuse_address: bool,

    /// Poll interval for blocking receives
    ///
    /// A blocking receive wakes at least this often to observe that its
    /// socket has been closed.
    /// - Default: 100ms
    pub poll_interval: Duration,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            multicast_ttl: 1,
            multicast_loop: true,
            interface: Ipv4Addr::UNSPECIFIED,
            recv_buffer_size: None,
            send_buffer_size: None,
            reuse_address: true,
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl SocketOptions {
    /// Create new socket options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set multicast time-to-live.
    pub fn with_multicast_ttl(mut self, ttl: u32) -> Self {
        self.multicast_ttl = ttl;
        self
    }

    /// Enable or disable multicast loopback.
    pub fn with_multicast_loop(mut self, enabled: bool) -> Self {
        self.multicast_loop = enabled;
        self
    }

    /// Set the multicast interface.
    pub fn with_interface(mut self, interface: Ipv4Addr) -> Self {
        self.interface = interface;
        self
    }

    /// Set kernel receive buffer size.
    pub fn with_recv_buffer_size(mut self, bytes: usize) -> Self {
        self.recv_buffer_size = Some(bytes);
        self
    }

    /// Set kernel send buffer size.
    pub fn with_send_buffer_size(mut self, bytes: usize) -> Self {
        self.send_buffer_size = Some(bytes);
        self
    }

    /// Enable or disable address reuse.
    pub fn with_reuse_address(mut self, enabled: bool) -> Self {
        self.reuse_address = enabled;
        self
    }

    /// Set the blocking receive poll interval. Zero is raised to 1ms.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }
}

//! Listener and emitter configuration
//!
//! Plain structs with defaults and builder methods. Loading them from files
//! or the environment is left to the embedding application.

use std::time::Duration;

use evcast_core::endpoint::Endpoint;
use evcast_core::options::SocketOptions;

use crate::encoding::CharacterEncoding;
use crate::garbage::GarbageHandling;

/// Largest UDP payload over IPv4 (65535 - 8 byte UDP header - 20 byte IP header).
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Default number of receives kept in flight by the parallel strategy.
pub const DEFAULT_IN_FLIGHT_RECEIVES: usize = 4;

/// Default time `stop` waits for every stage to report stopped.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// How a listener runs its pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ExecutionStrategy {
    /// One receiver thread and one notifier thread per listener.
    #[default]
    Threaded,
    /// Async receives plus decode / dispatch tasks on a worker pool.
    Parallel,
}

/// How an emitter hands datagrams to its socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SendStrategy {
    /// Send on the caller's thread and report errors.
    #[default]
    Sequential,
    /// Queue the send on a worker pool and return immediately.
    ParallelFireAndForget,
}

/// Listener configuration
///
/// # Examples
///
/// ```
/// use evcast_wire::config::{ExecutionStrategy, ListenerConfig};
/// use evcast_wire::garbage::GarbageHandling;
///
/// let config = ListenerConfig::default()
///     .with_strategy(ExecutionStrategy::Parallel)
///     .with_garbage_handling(GarbageHandling::AskSinksToVote);
/// ```
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Group to join.
    pub endpoint: Endpoint,
    pub strategy: ExecutionStrategy,
    pub garbage_handling: GarbageHandling,
    /// Receive buffer size; longer datagrams are truncated (and fail to decode).
    pub max_datagram_size: usize,
    /// Receives kept outstanding at once (parallel only).
    pub in_flight_receives: usize,
    /// Worker threads when the listener owns its pool (parallel only).
    pub worker_threads: usize,
    pub shutdown_timeout: Duration,
    pub socket: SocketOptions,
    /// Publish [`ListenerEvent`](evcast_core::monitor::ListenerEvent)s.
    pub monitor: bool,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            strategy: ExecutionStrategy::default(),
            garbage_handling: GarbageHandling::default(),
            max_datagram_size: MAX_DATAGRAM_SIZE,
            in_flight_receives: DEFAULT_IN_FLIGHT_RECEIVES,
            worker_threads: num_cpus::get().max(2),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            socket: SocketOptions::default(),
            monitor: false,
        }
    }
}

impl ListenerConfig {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoint = endpoint;
        self
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    #[must_use]
    pub fn with_garbage_handling(mut self, policy: GarbageHandling) -> Self {
        self.garbage_handling = policy;
        self
    }

    /// Clamped to `1..=MAX_DATAGRAM_SIZE`.
    #[must_use]
    pub fn with_max_datagram_size(mut self, size: usize) -> Self {
        self.max_datagram_size = size.clamp(1, MAX_DATAGRAM_SIZE);
        self
    }

    #[must_use]
    pub fn with_in_flight_receives(mut self, count: usize) -> Self {
        self.in_flight_receives = count.max(1);
        self
    }

    #[must_use]
    pub fn with_worker_threads(mut self, count: usize) -> Self {
        self.worker_threads = count.max(1);
        self
    }

    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_socket_options(mut self, options: SocketOptions) -> Self {
        self.socket = options;
        self
    }

    #[must_use]
    pub fn with_monitor(mut self, enabled: bool) -> Self {
        self.monitor = enabled;
        self
    }
}

/// Emitter configuration
#[derive(Debug, Clone)]
pub struct EmitterConfig {
    /// Group to send to.
    pub endpoint: Endpoint,
    /// String encoding applied to every emitted event.
    pub encoding: CharacterEncoding,
    pub strategy: SendStrategy,
    /// Stamped on every event as `SiteID` when set.
    pub site_id: Option<u16>,
    /// Encoded events above this size are rejected.
    pub max_datagram_size: usize,
    /// Worker threads for fire-and-forget sends.
    pub worker_threads: usize,
    /// TTL, loopback and interface live here.
    pub socket: SocketOptions,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            encoding: CharacterEncoding::default(),
            strategy: SendStrategy::default(),
            site_id: None,
            max_datagram_size: MAX_DATAGRAM_SIZE,
            worker_threads: num_cpus::get().max(2),
            socket: SocketOptions::default(),
        }
    }
}

impl EmitterConfig {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoint = endpoint;
        self
    }

    #[must_use]
    pub fn with_encoding(mut self, encoding: CharacterEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy: SendStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    #[must_use]
    pub fn with_site_id(mut self, site_id: u16) -> Self {
        self.site_id = Some(site_id);
        self
    }

    /// Multicast time-to-live, stored in the socket options.
    #[must_use]
    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.socket.multicast_ttl = ttl;
        self
    }

    /// Clamped to `1..=MAX_DATAGRAM_SIZE`.
    #[must_use]
    pub fn with_max_datagram_size(mut self, size: usize) -> Self {
        self.max_datagram_size = size.clamp(1, MAX_DATAGRAM_SIZE);
        self
    }

    #[must_use]
    pub fn with_worker_threads(mut self, count: usize) -> Self {
        self.worker_threads = count.max(1);
        self
    }

    #[must_use]
    pub fn with_socket_options(mut self, options: SocketOptions) -> Self {
        self.socket = options;
        self
    }
}

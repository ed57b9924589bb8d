//! Evcast Core
//!
//! This crate contains the transport-level building blocks that know
//! nothing about the event format:
//! - Bounded byte-accounted buffer pool (`pool`)
//! - Non-blocking MPMC FIFO queue (`queue`)
//! - Pipeline stage lifecycle state cell and wake signal (`lifecycle`)
//! - Spin / yield backoff (`backoff`)
//! - Endpoint addressing (`endpoint`)
//! - Datagram socket traits, UDP multicast and inproc transports (`socket`)
//! - Socket options and listener monitoring (`options`, `monitor`)
//! - Error types (`error`)

// The queue module owns the only unsafe code
#![cfg_attr(not(test), deny(unsafe_code))]
// Allow some pedantic lints that are intentional in this crate
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::match_same_arms)]
pub mod backoff;
pub mod endpoint;
pub mod error;
pub mod lifecycle;
pub mod monitor;
pub mod options;
pub mod pool;
pub mod queue;
pub mod socket;

// Keep it minimal to avoid API lock-in.
pub mod prelude {
    pub use crate::endpoint::Endpoint;
    pub use crate::error::{EvcastError, Result, WireFormatError};
    pub use crate::lifecycle::{StageState, StateCell};
    pub use crate::monitor::{ListenerEvent, ListenerMonitor};
    pub use crate::options::SocketOptions;
    pub use crate::pool::{BufferPool, BufferPoolOptions, PooledBuffer};
    pub use crate::queue::{FifoQueue, LockFreeQueue};
    pub use crate::socket::{AsyncDatagramSocket, DatagramSocket};
}

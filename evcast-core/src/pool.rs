//! Bounded buffer pool.
//!
//! Tracks the total number of bytes checked out against a configured
//! ceiling. Acquisition under pressure is backpressure, not an error:
//! the caller spins until enough memory is released or its cancellation
//! predicate fires.
//!
//! Design principle:
//! - Accounting scales with **bytes**, not buffer count
//! - One pool object is constructed once and shared by every emitter and
//!   listener that should draw from the same budget
//! - Release is tied to `Drop`, so every exit path returns memory
//!
//! There is no wait queue: under sustained overload a late arrival may be
//! overtaken indefinitely by callers that keep re-acquiring.
//!
//! ```rust
//! use evcast_core::pool::{BufferPool, BufferPoolOptions};
//!
//! let pool = BufferPool::new(BufferPoolOptions::default().with_max_bytes(64 * 1024));
//! let buffer = pool.acquire(1500, || false).expect("within budget");
//! assert!(pool.bytes_in_use() >= 1500);
//! drop(buffer);
//! assert_eq!(pool.bytes_in_use(), 0);
//! ```

use bytes::BytesMut;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{trace, warn};

use crate::backoff::SpinBackoff;

/// Default allocation unit (1 KiB).
pub const DEFAULT_UNIT_SIZE: usize = 1024;

/// Default ceiling on bytes checked out (16 MiB).
pub const DEFAULT_MAX_BYTES: usize = 16 * 1024 * 1024;

/// Buffer pool configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferPoolOptions {
    /// Requests are rounded up to a multiple of this size.
    pub unit_size: usize,
    /// Maximum total bytes checked out at any instant.
    pub max_bytes: usize,
}

impl Default for BufferPoolOptions {
    fn default() -> Self {
        Self {
            unit_size: DEFAULT_UNIT_SIZE,
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

impl BufferPoolOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the allocation unit. Zero is treated as one byte.
    pub fn with_unit_size(mut self, unit_size: usize) -> Self {
        self.unit_size = unit_size.max(1);
        self
    }

    /// Set the ceiling on bytes checked out.
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}

struct PoolShared {
    options: BufferPoolOptions,
    in_use: AtomicUsize,
}

/// Shared handle to a bounded pool. Cloning shares the same budget.
#[derive(Clone)]
pub struct BufferPool {
    shared: Arc<PoolShared>,
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("unit_size", &self.shared.options.unit_size)
            .field("max_bytes", &self.shared.options.max_bytes)
            .field("bytes_in_use", &self.bytes_in_use())
            .finish()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(BufferPoolOptions::default())
    }
}

impl BufferPool {
    pub fn new(options: BufferPoolOptions) -> Self {
        let options = BufferPoolOptions {
            unit_size: options.unit_size.max(1),
            ..options
        };
        Self {
            shared: Arc::new(PoolShared {
                options,
                in_use: AtomicUsize::new(0),
            }),
        }
    }

    #[inline]
    pub fn options(&self) -> BufferPoolOptions {
        self.shared.options
    }

    /// Bytes currently checked out.
    #[inline]
    pub fn bytes_in_use(&self) -> usize {
        self.shared.in_use.load(Ordering::Acquire)
    }

    /// Size actually charged for a request of `size` bytes.
    #[inline]
    pub fn charge_for(&self, size: usize) -> usize {
        let unit = self.shared.options.unit_size;
        size.div_ceil(unit).max(1) * unit
    }

    /// Acquire a buffer of at least `size` bytes, spinning under pressure.
    ///
    /// `cancel` is consulted after every failed attempt; once it returns
    /// `true` the call gives up and returns `None`. A request that could
    /// never fit under the ceiling returns `None` immediately.
    pub fn acquire(&self, size: usize, cancel: impl Fn() -> bool) -> Option<PooledBuffer> {
        let charge = self.charge_for(size);
        if charge > self.shared.options.max_bytes {
            warn!(
                requested = size,
                max = self.shared.options.max_bytes,
                "buffer request exceeds pool ceiling"
            );
            return None;
        }

        let mut backoff = SpinBackoff::new();
        loop {
            if self.try_reserve(charge) {
                return Some(self.issue(charge));
            }
            if cancel() {
                trace!(requested = size, "buffer acquisition cancelled");
                return None;
            }
            backoff.snooze();
        }
    }

    /// Single acquisition attempt; never blocks.
    pub fn try_acquire(&self, size: usize) -> Option<PooledBuffer> {
        let charge = self.charge_for(size);
        if charge <= self.shared.options.max_bytes && self.try_reserve(charge) {
            Some(self.issue(charge))
        } else {
            None
        }
    }

    /// Return a buffer to the pool. Equivalent to dropping it.
    pub fn release(&self, buffer: PooledBuffer) {
        debug_assert!(Arc::ptr_eq(&self.shared, &buffer.pool));
        drop(buffer);
    }

    fn try_reserve(&self, charge: usize) -> bool {
        let max = self.shared.options.max_bytes;
        let mut current = self.shared.in_use.load(Ordering::Acquire);
        loop {
            let Some(next) = current.checked_add(charge).filter(|n| *n <= max) else {
                return false;
            };
            match self.shared.in_use.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    fn issue(&self, charge: usize) -> PooledBuffer {
        PooledBuffer {
            buf: BytesMut::zeroed(charge),
            charge,
            pool: Arc::clone(&self.shared),
        }
    }
}

/// A buffer whose bytes are charged against a [`BufferPool`] until dropped.
///
/// Dereferences to the filled region, which starts as the whole buffer and
/// shrinks with [`PooledBuffer::truncate`].
pub struct PooledBuffer {
    buf: BytesMut,
    charge: usize,
    pool: Arc<PoolShared>,
}

impl PooledBuffer {
    /// Bytes charged to the pool for this buffer.
    #[inline]
    pub fn charge(&self) -> usize {
        self.charge
    }

    /// Shrink the visible region to `len` bytes (e.g. after a receive).
    pub fn truncate(&mut self, len: usize) {
        self.buf.truncate(len);
    }
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}

impl fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.buf.len())
            .field("charge", &self.charge)
            .finish()
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        self.pool.in_use.fetch_sub(self.charge, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_pool() -> BufferPool {
        BufferPool::new(
            BufferPoolOptions::new()
                .with_unit_size(100)
                .with_max_bytes(1000),
        )
    }

    #[test]
    fn requests_round_up_to_unit() {
        let pool = small_pool();
        let buf = pool.acquire(150, || false).unwrap();
        assert_eq!(buf.charge(), 200);
        assert_eq!(buf.len(), 200);
        assert_eq!(pool.bytes_in_use(), 200);
    }

    #[test]
    fn drop_releases_bytes() {
        let pool = small_pool();
        let a = pool.acquire(300, || false).unwrap();
        let b = pool.acquire(300, || false).unwrap();
        assert_eq!(pool.bytes_in_use(), 600);
        pool.release(a);
        assert_eq!(pool.bytes_in_use(), 300);
        drop(b);
        assert_eq!(pool.bytes_in_use(), 0);
    }

    #[test]
    fn try_acquire_fails_at_ceiling() {
        let pool = small_pool();
        let _held = pool.try_acquire(1000).unwrap();
        assert!(pool.try_acquire(1).is_none());
    }

    #[test]
    fn cancelled_acquire_returns_none() {
        let pool = small_pool();
        let _held = pool.acquire(900, || false).unwrap();
        assert!(pool.acquire(200, || true).is_none());
        assert_eq!(pool.bytes_in_use(), 900);
    }

    #[test]
    fn oversized_request_never_blocks() {
        let pool = small_pool();
        assert!(pool.acquire(5000, || false).is_none());
    }

    #[test]
    fn truncate_shrinks_view_not_charge() {
        let pool = small_pool();
        let mut buf = pool.acquire(100, || false).unwrap();
        buf[..3].copy_from_slice(b"abc");
        buf.truncate(3);
        assert_eq!(&buf[..], b"abc");
        assert_eq!(buf.charge(), 100);
    }
}

//! Non-blocking multi-producer / multi-consumer FIFO queue.
//!
//! This module is the ONLY place where unsafe memory manipulation is allowed.
//! All invariants are enforced here so the rest of the system can remain 100% safe.
//!
//! # Design
//!
//! A Michael–Scott linked-list queue with a dummy head node. Nodes live in
//! an append-only arena and are addressed by `u32` index, which lets every
//! link be a counted pointer packed into one `AtomicU64`:
//!
//! ```text
//!  63            32 31             0
//! +----------------+----------------+
//! |    version     |   node index   |
//! +----------------+----------------+
//! ```
//!
//! Every successful CAS bumps the version, so a node that is released and
//! reused can never be mistaken for its former identity (ABA).
//!
//! A node goes back to the free list only after two independent events:
//! its value has been taken by the winning dequeuer, and it has been
//! retired as the dummy head. Until both happen the node's memory stays
//! owned by the queue.
//!
//! Arena memory is only returned to the allocator when the queue is dropped.

#![allow(unsafe_code)]

use crossbeam_queue::SegQueue;
use once_cell::sync::OnceCell;
use std::cell::UnsafeCell;
use std::fmt;
use std::mem::MaybeUninit;
use std::ops::Deref;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, AtomicUsize, Ordering};

/// The enqueue / dequeue contract shared by every queue the pipeline can use.
///
/// Implementations must preserve FIFO order of completed enqueues and must
/// never block in `dequeue`.
pub trait FifoQueue<T>: Send + Sync {
    fn enqueue(&self, value: T);

    /// Remove the oldest item, or `None` if the queue is momentarily empty.
    fn dequeue(&self) -> Option<T>;

    /// Momentary snapshot; may be stale by the time the caller acts on it.
    fn is_empty(&self) -> bool;
}

impl<T: Send> FifoQueue<T> for SegQueue<T> {
    #[inline]
    fn enqueue(&self, value: T) {
        self.push(value);
    }

    #[inline]
    fn dequeue(&self) -> Option<T> {
        self.pop()
    }

    #[inline]
    fn is_empty(&self) -> bool {
        SegQueue::is_empty(self)
    }
}

/// Sentinel index meaning "no node".
const NIL: u32 = u32::MAX;

/// Nodes in segment 0. Segment `s` holds `BASE << s` nodes.
const BASE: u64 = 32;

/// Enough segments to address close to `u32::MAX` nodes.
const SEGMENTS: usize = 26;

/// Steps needed before a node can be recycled (value taken + retired).
const RELEASE_STEPS: u8 = 2;

#[inline]
const fn pack(index: u32, version: u32) -> u64 {
    ((version as u64) << 32) | index as u64
}

#[inline]
const fn unpack(word: u64) -> (u32, u32) {
    (word as u32, (word >> 32) as u32)
}

/// Padding to keep head and tail on separate cache lines.
#[repr(align(128))]
struct CachePadded<T>(T);

impl<T> Deref for CachePadded<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

struct Node<T> {
    value: UnsafeCell<MaybeUninit<T>>,
    /// Queue link: counted pointer to the successor.
    next: AtomicU64,
    /// Free-list link (index only; the free-list head carries the version).
    free_next: AtomicU32,
    /// Completed release steps.
    released: AtomicU8,
}

impl<T> Node<T> {
    fn vacant() -> Self {
        Self {
            value: UnsafeCell::new(MaybeUninit::uninit()),
            next: AtomicU64::new(pack(NIL, 0)),
            free_next: AtomicU32::new(NIL),
            released: AtomicU8::new(0),
        }
    }
}

/// Append-only node storage with geometric segment growth.
struct Arena<T> {
    segments: [OnceCell<Box<[Node<T>]>>; SEGMENTS],
    fresh: AtomicU32,
    /// Treiber stack of recycled nodes, as a counted pointer.
    free_head: AtomicU64,
}

impl<T> Arena<T> {
    fn new() -> Self {
        Self {
            segments: std::array::from_fn(|_| OnceCell::new()),
            fresh: AtomicU32::new(0),
            free_head: AtomicU64::new(pack(NIL, 0)),
        }
    }

    #[inline]
    fn locate(index: u32) -> (usize, usize) {
        let k = u64::from(index) / BASE + 1;
        let segment = 63 - k.leading_zeros() as usize;
        let offset = u64::from(index) - BASE * ((1 << segment) - 1);
        (segment, offset as usize)
    }

    /// Resolve an index previously handed out by `alloc`.
    #[inline]
    fn node(&self, index: u32) -> &Node<T> {
        let (segment, offset) = Self::locate(index);
        match self.segments[segment].get() {
            Some(nodes) => &nodes[offset],
            None => unreachable!("node {index} resolved before its segment was allocated"),
        }
    }

    fn alloc(&self) -> u32 {
        if let Some(index) = self.pop_free() {
            return index;
        }
        let index = self.fresh.fetch_add(1, Ordering::Relaxed);
        assert!(index != NIL, "queue node arena exhausted");
        let (segment, _) = Self::locate(index);
        self.segments[segment].get_or_init(|| {
            let len = (BASE << segment) as usize;
            (0..len).map(|_| Node::vacant()).collect()
        });
        index
    }

    fn pop_free(&self) -> Option<u32> {
        let mut head = self.free_head.load(Ordering::Acquire);
        loop {
            let (index, version) = unpack(head);
            if index == NIL {
                return None;
            }
            let next = self.node(index).free_next.load(Ordering::Acquire);
            match self.free_head.compare_exchange_weak(
                head,
                pack(next, version.wrapping_add(1)),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(index),
                Err(actual) => head = actual,
            }
        }
    }

    fn push_free(&self, index: u32) {
        let node = self.node(index);
        let mut head = self.free_head.load(Ordering::Acquire);
        loop {
            let (top, version) = unpack(head);
            node.free_next.store(top, Ordering::Release);
            match self.free_head.compare_exchange_weak(
                head,
                pack(index, version.wrapping_add(1)),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(actual) => head = actual,
            }
        }
    }
}

/// Lock-free FIFO queue (Michael–Scott with counted pointers).
///
/// `dequeue` never waits: an empty queue returns `None` immediately.
pub struct LockFreeQueue<T> {
    head: CachePadded<AtomicU64>,
    tail: CachePadded<AtomicU64>,
    len: AtomicUsize,
    arena: Arena<T>,
}

unsafe impl<T: Send> Send for LockFreeQueue<T> {}
unsafe impl<T: Send> Sync for LockFreeQueue<T> {}

impl<T> Default for LockFreeQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for LockFreeQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockFreeQueue")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl<T> LockFreeQueue<T> {
    pub fn new() -> Self {
        let arena = Arena::new();
        let dummy = arena.alloc();
        // The initial dummy never carried a value.
        arena.node(dummy).released.store(1, Ordering::Relaxed);
        Self {
            head: CachePadded(AtomicU64::new(pack(dummy, 0))),
            tail: CachePadded(AtomicU64::new(pack(dummy, 0))),
            len: AtomicUsize::new(0),
            arena,
        }
    }

    /// Append `value` at the tail.
    pub fn enqueue(&self, value: T) {
        let index = self.arena.alloc();
        let node = self.arena.node(index);
        // SAFETY: `index` came from `alloc`, so no other thread owns this
        // node's value slot until it is linked below.
        unsafe { (*node.value.get()).write(value) };
        node.released.store(0, Ordering::Relaxed);
        let (_, stale) = unpack(node.next.load(Ordering::Acquire));
        node.next
            .store(pack(NIL, stale.wrapping_add(1)), Ordering::Release);
        self.len.fetch_add(1, Ordering::Relaxed);

        loop {
            let tail = self.tail.load(Ordering::Acquire);
            let (t, tv) = unpack(tail);
            let t_node = self.arena.node(t);
            let next = t_node.next.load(Ordering::Acquire);
            let (n, nv) = unpack(next);
            if tail != self.tail.load(Ordering::Acquire) {
                continue;
            }
            if n == NIL {
                if t_node
                    .next
                    .compare_exchange(
                        next,
                        pack(index, nv.wrapping_add(1)),
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok()
                {
                    let _ = self.tail.compare_exchange(
                        tail,
                        pack(index, tv.wrapping_add(1)),
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    );
                    return;
                }
            } else {
                // Tail is lagging; help swing it forward.
                let _ = self.tail.compare_exchange(
                    tail,
                    pack(n, tv.wrapping_add(1)),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                );
            }
        }
    }

    /// Remove the oldest value, or `None` if the queue is empty right now.
    pub fn dequeue(&self) -> Option<T> {
        loop {
            let head = self.head.load(Ordering::Acquire);
            let (h, hv) = unpack(head);
            let tail = self.tail.load(Ordering::Acquire);
            let (t, tv) = unpack(tail);
            let (n, _) = unpack(self.arena.node(h).next.load(Ordering::Acquire));
            if head != self.head.load(Ordering::Acquire) {
                continue;
            }
            if n == NIL {
                return None;
            }
            if h == t {
                let _ = self.tail.compare_exchange(
                    tail,
                    pack(n, tv.wrapping_add(1)),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                );
                continue;
            }
            if self
                .head
                .compare_exchange(
                    head,
                    pack(n, hv.wrapping_add(1)),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                // SAFETY: winning the head CAS makes this thread the only
                // reader of `n`'s value, and `n` cannot be recycled before
                // the release step below.
                let value = unsafe { (*self.arena.node(n).value.get()).assume_init_read() };
                self.len.fetch_sub(1, Ordering::Relaxed);
                self.release_step(n);
                self.release_step(h);
                return Some(value);
            }
        }
    }

    /// Momentary emptiness snapshot.
    pub fn is_empty(&self) -> bool {
        let (h, _) = unpack(self.head.load(Ordering::Acquire));
        let (n, _) = unpack(self.arena.node(h).next.load(Ordering::Acquire));
        n == NIL
    }

    /// Approximate number of queued values.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    fn release_step(&self, index: u32) {
        let node = self.arena.node(index);
        if node.released.fetch_add(1, Ordering::AcqRel) + 1 == RELEASE_STEPS {
            self.arena.push_free(index);
        }
    }
}

impl<T: Send> FifoQueue<T> for LockFreeQueue<T> {
    #[inline]
    fn enqueue(&self, value: T) {
        LockFreeQueue::enqueue(self, value);
    }

    #[inline]
    fn dequeue(&self) -> Option<T> {
        LockFreeQueue::dequeue(self)
    }

    #[inline]
    fn is_empty(&self) -> bool {
        LockFreeQueue::is_empty(self)
    }
}

impl<T> Drop for LockFreeQueue<T> {
    fn drop(&mut self) {
        // Drop values still queued; vacant slots are MaybeUninit and free nothing.
        while self.dequeue().is_some() {}
    }
}

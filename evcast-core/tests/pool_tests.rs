//! Integration tests for the bounded buffer pool

use evcast_core::pool::{BufferPool, BufferPoolOptions};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_bytes_in_use_tracks_outstanding_buffers() {
    let pool = BufferPool::new(
        BufferPoolOptions::new()
            .with_unit_size(64)
            .with_max_bytes(64 * 1024),
    );
    let outstanding = Arc::new(AtomicUsize::new(0));
    let violated = Arc::new(AtomicBool::new(false));

    let workers: Vec<_> = (0..8)
        .map(|t| {
            let pool = pool.clone();
            let outstanding = Arc::clone(&outstanding);
            let violated = Arc::clone(&violated);
            thread::spawn(move || {
                for i in 0..2_000 {
                    let size = 1 + (t * 131 + i * 17) % 4000;
                    let buf = pool.acquire(size, || false).unwrap();
                    assert!(buf.len() >= size);
                    outstanding.fetch_add(buf.charge(), Ordering::AcqRel);
                    if pool.bytes_in_use() > pool.options().max_bytes {
                        violated.store(true, Ordering::Release);
                    }
                    outstanding.fetch_sub(buf.charge(), Ordering::AcqRel);
                    drop(buf);
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }
    assert!(!violated.load(Ordering::Acquire));
    assert_eq!(outstanding.load(Ordering::Acquire), 0);
    assert_eq!(pool.bytes_in_use(), 0);
}

#[test]
fn test_acquire_blocks_until_release() {
    let pool = BufferPool::new(
        BufferPoolOptions::new()
            .with_unit_size(1024)
            .with_max_bytes(4096),
    );
    let held = pool.acquire(4096, || false).unwrap();

    let waiter_pool = pool.clone();
    let waiter = thread::spawn(move || {
        let start = Instant::now();
        let buf = waiter_pool.acquire(2048, || false);
        (buf.map(|b| b.charge()), start.elapsed())
    });

    thread::sleep(Duration::from_millis(50));
    assert_eq!(pool.bytes_in_use(), 4096);
    drop(held);

    let (charge, waited) = waiter.join().unwrap();
    assert_eq!(charge, Some(2048));
    assert!(waited >= Duration::from_millis(40));
    assert_eq!(pool.bytes_in_use(), 0);
}

#[test]
fn test_cancellation_releases_blocked_acquirer() {
    let pool = BufferPool::new(BufferPoolOptions::new().with_max_bytes(1024));
    let _held = pool.acquire(1024, || false).unwrap();
    let stopping = Arc::new(AtomicBool::new(false));

    let waiter_pool = pool.clone();
    let flag = Arc::clone(&stopping);
    let waiter = thread::spawn(move || {
        waiter_pool
            .acquire(512, || flag.load(Ordering::Acquire))
            .is_none()
    });

    thread::sleep(Duration::from_millis(20));
    stopping.store(true, Ordering::Release);
    assert!(waiter.join().unwrap());
    assert_eq!(pool.bytes_in_use(), 1024);
}

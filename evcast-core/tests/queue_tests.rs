//! Stress tests for the non-blocking queue

use crossbeam_queue::SegQueue;
use evcast_core::queue::{FifoQueue, LockFreeQueue};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

const ITEMS: usize = 100_000;
const PRODUCERS: usize = 4;
const CONSUMERS: usize = 4;

/// Each producer tags its items so per-producer order can be checked.
fn encode(producer: usize, seq: usize) -> u64 {
    ((producer as u64) << 32) | seq as u64
}

fn run_mpmc<Q>(queue: Arc<Q>)
where
    Q: FifoQueue<u64> + 'static,
{
    let per_producer = ITEMS / PRODUCERS;
    let consumed = Arc::new(AtomicUsize::new(0));

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for seq in 0..per_producer {
                    queue.enqueue(encode(p, seq));
                }
            })
        })
        .collect();

    let consumers: Vec<_> = (0..CONSUMERS)
        .map(|_| {
            let queue = Arc::clone(&queue);
            let consumed = Arc::clone(&consumed);
            thread::spawn(move || {
                let mut seen = Vec::new();
                while consumed.load(Ordering::Acquire) < ITEMS {
                    match queue.dequeue() {
                        Some(item) => {
                            seen.push(item);
                            consumed.fetch_add(1, Ordering::AcqRel);
                        }
                        None => thread::yield_now(),
                    }
                }
                seen
            })
        })
        .collect();

    for producer in producers {
        producer.join().unwrap();
    }

    let mut all = HashSet::with_capacity(ITEMS);
    for consumer in consumers {
        let seen = consumer.join().unwrap();
        // Within one consumer, items from one producer arrive in order.
        let mut last = vec![None; PRODUCERS];
        for item in &seen {
            let producer = (item >> 32) as usize;
            let seq = (item & 0xffff_ffff) as usize;
            if let Some(prev) = last[producer] {
                assert!(seq > prev, "producer {producer} reordered: {prev} then {seq}");
            }
            last[producer] = Some(seq);
            assert!(all.insert(*item), "duplicate item {item:#x}");
        }
    }

    assert_eq!(all.len(), ITEMS);
    assert!(queue.is_empty());
}

#[test]
fn test_lock_free_queue_mpmc_exactly_once() {
    run_mpmc(Arc::new(LockFreeQueue::new()));
}

#[test]
fn test_seg_queue_satisfies_same_contract() {
    run_mpmc(Arc::new(SegQueue::new()));
}

#[test]
fn test_single_thread_order_is_fifo() {
    let queue = LockFreeQueue::new();
    for i in 0..ITEMS {
        queue.enqueue(i);
    }
    for i in 0..ITEMS {
        assert_eq!(queue.dequeue(), Some(i));
    }
    assert_eq!(queue.dequeue(), None);
}

#[test]
fn test_interleaved_enqueue_dequeue_reuses_nodes() {
    let queue = LockFreeQueue::new();
    for round in 0..10_000u32 {
        queue.enqueue(round);
        queue.enqueue(round + 1);
        assert_eq!(queue.dequeue(), Some(round));
        assert_eq!(queue.dequeue(), Some(round + 1));
    }
    assert!(queue.is_empty());
    assert_eq!(queue.len(), 0);
}

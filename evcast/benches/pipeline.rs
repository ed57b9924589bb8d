//! Pipeline benchmarks
//!
//! - `queue`: enqueue/dequeue cost of the linked queue that joins stages
//! - `deliver`: emit-to-sink latency for a batch over the inproc transport,
//!   for both listener strategies

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use evcast::prelude::*;
use evcast_core::queue::LockFreeQueue;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const BATCH: u64 = 256;

fn queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue");
    group.throughput(Throughput::Elements(BATCH));

    group.bench_function("single_thread", |b| {
        let queue = LockFreeQueue::new();
        b.iter(|| {
            for i in 0..BATCH {
                queue.enqueue(i);
            }
            while let Some(v) = queue.dequeue() {
                black_box(v);
            }
        });
    });

    group.bench_function("producer_consumer", |b| {
        b.iter(|| {
            let queue = Arc::new(LockFreeQueue::new());
            let producer = {
                let queue = queue.clone();
                thread::spawn(move || {
                    for i in 0..BATCH {
                        queue.enqueue(i);
                    }
                })
            };
            let mut seen = 0;
            while seen < BATCH {
                if queue.dequeue().is_some() {
                    seen += 1;
                } else {
                    std::hint::spin_loop();
                }
            }
            producer.join().unwrap();
        });
    });

    group.finish();
}

struct Forward(flume::Sender<Event>);

impl EventSink for Forward {
    fn handle_event_arrival(&self, _key: &SinkKey, event: &Event) -> bool {
        self.0.send(event.clone()).is_ok()
    }
}

fn deliver(c: &mut Criterion) {
    let mut group = c.benchmark_group("deliver");
    group.throughput(Throughput::Elements(BATCH));
    group.measurement_time(Duration::from_secs(5));

    for (label, strategy) in [
        ("threaded", ExecutionStrategy::Threaded),
        ("parallel", ExecutionStrategy::Parallel),
    ] {
        let name = format!("bench-deliver-{label}");
        let listener = Listener::new(
            ListenerConfig::new(Endpoint::inproc(name.as_str()).unwrap())
                .with_strategy(strategy)
                .with_worker_threads(2),
        );
        let (tx, rx) = flume::unbounded();
        listener.add_sink(Arc::new(Forward(tx)));
        listener.start().unwrap();

        let emitter =
            Emitter::new(EmitterConfig::new(Endpoint::inproc(name.as_str()).unwrap())).unwrap();
        let event = Event::new("Ping").with("seq", 7u32).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(label), &event, |b, event| {
            b.iter(|| {
                for _ in 0..BATCH {
                    emitter.emit(event).unwrap();
                }
                for _ in 0..BATCH {
                    black_box(rx.recv_timeout(Duration::from_secs(5)).unwrap());
                }
            });
        });

        listener.stop().unwrap();
    }

    group.finish();
}

criterion_group!(benches, queue, deliver);
criterion_main!(benches);

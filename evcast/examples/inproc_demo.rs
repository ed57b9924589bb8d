//! In-process event demonstration
//!
//! Runs an emitter and a listener on the same in-process group, sends a
//! handful of typed events plus one garbage datagram, and prints what the
//! sink and the monitor saw.
//!
//! # Run
//!
//! ```sh
//! cargo run --example inproc_demo
//! RUST_LOG=evcast_wire=debug cargo run --example inproc_demo
//! ```

use evcast::prelude::*;
use evcast_core::socket::{DatagramSocket, InprocSocket};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const GROUP: &str = "inproc-demo";

#[derive(Default)]
struct Printer {
    seen: AtomicU64,
}

impl EventSink for Printer {
    fn handle_event_arrival(&self, _key: &SinkKey, event: &Event) -> bool {
        self.seen.fetch_add(1, Ordering::Relaxed);
        println!("   [sink] {event}");
        true
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    evcast::dev_tracing::init_tracing();
    println!("=== Inproc Event Demo ===\n");

    println!("1. Starting listener on inproc://{GROUP}...");
    let listener = Listener::new(
        ListenerConfig::new(Endpoint::inproc(GROUP)?)
            .with_strategy(ExecutionStrategy::Parallel)
            .with_garbage_handling(GarbageHandling::IgnoreEndpointsThatSendGarbage)
            .with_monitor(true),
    );
    let monitor = listener.monitor();
    let printer = Arc::new(Printer::default());
    listener.add_sink(printer.clone());
    listener.start()?;

    println!("2. Emitting events...");
    let emitter = Emitter::new(EmitterConfig::new(Endpoint::inproc(GROUP)?).with_site_id(7))?;
    for (user, ok) in [("alice", true), ("bob", false), ("carol", true)] {
        let event = Event::new("UserLogin")
            .with("username", user)?
            .with("successful", ok)?;
        emitter.emit(&event)?;
    }

    println!("3. Sending one garbage datagram from a raw socket...");
    let raw = InprocSocket::sender(GROUP);
    DatagramSocket::send(&raw, b"\x05hello\x00")?;

    thread::sleep(Duration::from_millis(100));
    listener.stop()?;

    println!("\n4. Results");
    println!("   events delivered: {}", printer.seen.load(Ordering::Relaxed));
    println!("   stats: {:?}", listener.stats());
    if let Some(monitor) = monitor {
        for event in monitor.try_iter() {
            println!("   [monitor] {event}");
        }
    }
    Ok(())
}

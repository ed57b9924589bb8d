//! Two-thread pipeline.
//!
//! The receiver thread blocks on the socket, decodes each datagram and
//! enqueues the event. The notifier thread drains the queue into the sinks
//! and parks on a [`WakeSignal`] whenever it runs dry.
//!
//! The receiver only wakes the notifier when its own `try_activate` moved
//! it out of `Suspended`, so a busy notifier is never signaled.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, trace, warn};

use evcast_core::error::{is_closed_socket, Result};
use evcast_core::lifecycle::{Settle, StageState, StateCell, WakeSignal};
use evcast_core::queue::LockFreeQueue;
use evcast_core::socket::{join_group, DatagramSocket};

use super::{wait_stopped, Pipeline, RunningPipeline};
use crate::event::Event;

/// Upper bound on a single park; the notifier re-checks its state after each.
const PARK_INTERVAL: Duration = Duration::from_millis(100);

struct Stages {
    pipeline: Arc<Pipeline>,
    socket: Arc<dyn DatagramSocket>,
    events: LockFreeQueue<Event>,
    receiver: StateCell,
    notifier: StateCell,
    wake: WakeSignal,
}

pub(super) struct ThreadedPipeline {
    stages: Arc<Stages>,
    threads: Vec<JoinHandle<()>>,
}

impl ThreadedPipeline {
    pub(super) fn start(pipeline: Arc<Pipeline>) -> io::Result<Self> {
        let socket = join_group(&pipeline.config.endpoint, &pipeline.config.socket)?;
        let stages = Arc::new(Stages {
            pipeline,
            socket,
            events: LockFreeQueue::new(),
            receiver: StateCell::new("receiver"),
            notifier: StateCell::new("notifier"),
            wake: WakeSignal::new(),
        });
        stages.receiver.set(StageState::Active);
        stages.notifier.set(StageState::Active);

        let receiver = spawn_stage("evcast-recv", &stages, Stages::run_receiver)?;
        let notifier = match spawn_stage("evcast-notify", &stages, Stages::run_notifier) {
            Ok(notifier) => notifier,
            Err(e) => {
                stages.receiver.signal_stop();
                stages.socket.close();
                let _ = receiver.join();
                return Err(e);
            }
        };
        let threads = vec![receiver, notifier];
        Ok(Self { stages, threads })
    }
}

fn spawn_stage(
    name: &str,
    stages: &Arc<Stages>,
    run: fn(&Stages),
) -> io::Result<JoinHandle<()>> {
    let stages = Arc::clone(stages);
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || run(&stages))
}

impl Stages {
    fn run_receiver(&self) {
        let size = self.pipeline.config.max_datagram_size;
        loop {
            if self.receiver.current().is_stopping() {
                break;
            }
            let Some(mut buf) = self
                .pipeline
                .pool
                .acquire(size, || self.receiver.is_greater_than(StageState::Active))
            else {
                if self.receiver.current().is_stopping() {
                    break;
                }
                // Oversized request; nothing will ever fit.
                warn!(size, "receive buffer exceeds pool ceiling");
                self.pipeline.record_fault(io::Error::new(
                    io::ErrorKind::OutOfMemory,
                    "receive buffer exceeds pool ceiling",
                ));
                break;
            };

            match self.socket.recv_from(&mut buf) {
                Ok((len, remote)) => {
                    if !self.pipeline.accepts(&remote) {
                        continue;
                    }
                    let decoded = self.pipeline.decode(&buf[..len], remote);
                    drop(buf);
                    if let Some(event) = decoded {
                        self.events.enqueue(event);
                        if self.notifier.try_activate() {
                            self.wake.notify();
                        }
                    }
                }
                Err(e) if is_closed_socket(&e) => break,
                Err(e) => {
                    self.pipeline.record_fault(e);
                    break;
                }
            }
        }

        // Also reached on a fault, before anyone requested a stop.
        self.socket.close();
        self.receiver.signal_stop();
        self.receiver
            .try_finish_stop(|| trace!(endpoint = %self.pipeline.config.endpoint, "receiver stopped"));
    }

    fn run_notifier(&self) {
        'run: loop {
            while let Some(event) = self.events.dequeue() {
                if self.notifier.current().is_stopping() {
                    break 'run;
                }
                self.pipeline.dispatch(&event);
            }

            match self.notifier.settle_idle(|| !self.events.is_empty()) {
                Settle::Resume => {}
                Settle::Stop => break,
                Settle::Idle => loop {
                    self.wake.wait(PARK_INTERVAL);
                    match self.notifier.current() {
                        StageState::Active => break,
                        state if state.is_stopping() => break 'run,
                        _ => {}
                    }
                },
            }
        }

        self.notifier.signal_stop();
        self.notifier.try_finish_stop(|| {
            let mut discarded = 0usize;
            while self.events.dequeue().is_some() {
                discarded += 1;
            }
            trace!(discarded, "notifier stopped");
        });
    }
}

impl RunningPipeline for ThreadedPipeline {
    fn stop(&mut self, timeout: Duration) -> Result<()> {
        let stages = &self.stages;
        stages.receiver.signal_stop();
        stages.notifier.signal_stop();
        stages.socket.close();
        stages.wake.notify();

        wait_stopped(&[&stages.receiver, &stages.notifier], timeout)?;
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                warn!("listener thread panicked");
            }
        }
        debug!(endpoint = %stages.pipeline.config.endpoint, "threaded pipeline stopped");
        Ok(())
    }
}

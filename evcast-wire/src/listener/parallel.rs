//! Pooled-task pipeline.
//!
//! A single driver task keeps up to `in_flight_receives` async receives
//! outstanding. As each completes it issues a replacement if the pool has
//! room and then hands the captured datagram to the decode stage. The
//! driver never waits on the pool while it holds a buffer; when the pool is
//! short it runs with fewer receives and only blocks once all of its
//! buffers have gone downstream. Decode and
//! dispatch are not long-lived: each runs as a task on the worker pool only
//! while its queue has work, and is rescheduled by whoever finds it idle.
//!
//! Design principle:
//! - `try_activate` elects exactly one scheduler per idle stage
//! - `settle_idle` closes the race with a producer that enqueues while the
//!   stage is going idle
//! - A stage that is idle when stop lands is finished by the stopper;
//!   a running stage finishes itself

use futures::stream::{FuturesUnordered, StreamExt};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, trace, warn};

use evcast_core::backoff::AdaptiveYield;
use evcast_core::error::{is_closed_socket, Result};
use evcast_core::lifecycle::{Settle, StageState, StateCell};
use evcast_core::pool::PooledBuffer;
use evcast_core::queue::LockFreeQueue;
use evcast_core::socket::{join_group_async, AsyncDatagramSocket};

use super::{wait_stopped, Pipeline, RunningPipeline};
use crate::event::Event;
use crate::workers::WorkerPool;

/// A received datagram waiting for decode.
struct Capture {
    remote: SocketAddr,
    datagram: PooledBuffer,
}

struct Stages {
    pipeline: Arc<Pipeline>,
    socket: Arc<dyn AsyncDatagramSocket>,
    handle: Handle,
    captures: LockFreeQueue<Capture>,
    events: LockFreeQueue<Event>,
    receiver: StateCell,
    decoder: StateCell,
    dispatcher: StateCell,
}

pub(super) struct ParallelPipeline {
    stages: Arc<Stages>,
    // Dropped after the stages have stopped.
    _workers: WorkerPool,
}

impl ParallelPipeline {
    pub(super) fn start(pipeline: Arc<Pipeline>, shared: Option<Handle>) -> io::Result<Self> {
        let workers = WorkerPool::shared_or_owned(
            shared,
            pipeline.config.worker_threads,
            "evcast-listen",
        )?;
        let handle = workers.handle();
        let socket = join_group_async(&pipeline.config.endpoint, &pipeline.config.socket, &handle)?;

        let stages = Arc::new(Stages {
            pipeline,
            socket,
            handle: handle.clone(),
            captures: LockFreeQueue::new(),
            events: LockFreeQueue::new(),
            receiver: StateCell::new("receiver"),
            decoder: StateCell::new("decoder"),
            dispatcher: StateCell::new("dispatcher"),
        });
        stages.receiver.set(StageState::Active);
        handle.spawn(Arc::clone(&stages).receive_loop());

        Ok(Self {
            stages,
            _workers: workers,
        })
    }
}

async fn receive(
    socket: Arc<dyn AsyncDatagramSocket>,
    mut datagram: PooledBuffer,
) -> (PooledBuffer, io::Result<(usize, SocketAddr)>) {
    let received = socket.recv_from(&mut datagram).await;
    (datagram, received)
}

impl Stages {
    async fn receive_loop(self: Arc<Self>) {
        let target = self.pipeline.config.in_flight_receives.max(1);
        let mut in_flight = FuturesUnordered::new();
        let mut open = self.buffer_fits_pool();

        loop {
            if open && !self.receiver.is_greater_than(StageState::Active) {
                // Top up with whatever the pool has free right now.
                let before = in_flight.len();
                while in_flight.len() < target {
                    match self.try_buffer() {
                        Some(buf) => in_flight.push(receive(Arc::clone(&self.socket), buf)),
                        None => break,
                    }
                }
                if in_flight.len() != before {
                    trace!(in_flight = in_flight.len(), "receives issued");
                }
                if in_flight.is_empty() {
                    // Every buffer we held has been captured, so only the
                    // decoder can free memory now.
                    match self.acquire_buffer().await {
                        Some(buf) => in_flight.push(receive(Arc::clone(&self.socket), buf)),
                        None => open = false,
                    }
                }
            }
            let Some((mut datagram, received)) = in_flight.next().await else {
                break;
            };
            match received {
                Ok((len, remote)) => {
                    if let Some(buf) = self.try_buffer() {
                        in_flight.push(receive(Arc::clone(&self.socket), buf));
                    }
                    datagram.truncate(len);
                    self.capture(remote, datagram);
                }
                Err(e) if is_closed_socket(&e) => open = false,
                Err(e) => {
                    self.pipeline.record_fault(e);
                    open = false;
                    // Release the remaining receives.
                    self.socket.close();
                }
            }
        }

        self.socket.close();
        self.receiver.signal_stop();
        self.receiver.try_finish_stop(|| trace!("receiver stopped"));
    }

    fn buffer_fits_pool(&self) -> bool {
        let pool = &self.pipeline.pool;
        let size = self.pipeline.config.max_datagram_size;
        if pool.charge_for(size) <= pool.options().max_bytes {
            return true;
        }
        warn!(size, "receive buffer exceeds pool ceiling");
        self.pipeline.record_fault(io::Error::new(
            io::ErrorKind::OutOfMemory,
            "receive buffer exceeds pool ceiling",
        ));
        false
    }

    #[inline]
    fn try_buffer(&self) -> Option<PooledBuffer> {
        self.pipeline
            .pool
            .try_acquire(self.pipeline.config.max_datagram_size)
    }

    /// Spin-yield until the pool has room, or until the receiver is asked
    /// to stop. Only called while no receive buffer is held.
    async fn acquire_buffer(&self) -> Option<PooledBuffer> {
        let mut backoff = AdaptiveYield::new();
        loop {
            if self.receiver.is_greater_than(StageState::Active) {
                return None;
            }
            if let Some(buf) = self.try_buffer() {
                return Some(buf);
            }
            backoff.snooze().await;
        }
    }

    fn capture(self: &Arc<Self>, remote: SocketAddr, datagram: PooledBuffer) {
        if self.receiver.current().is_stopping() || !self.pipeline.accepts(&remote) {
            return;
        }
        self.captures.enqueue(Capture { remote, datagram });
        if self.decoder.try_activate() {
            let stages = Arc::clone(self);
            self.handle.spawn(async move { stages.run_decoder() });
        }
    }

    fn run_decoder(self: &Arc<Self>) {
        loop {
            while let Some(capture) = self.captures.dequeue() {
                if self.decoder.current().is_stopping() {
                    break;
                }
                let decoded = self.pipeline.decode(&capture.datagram, capture.remote);
                drop(capture);
                if let Some(event) = decoded {
                    self.events.enqueue(event);
                    self.ensure_dispatching();
                }
            }
            match self.decoder.settle_idle(|| !self.captures.is_empty()) {
                Settle::Resume => {}
                Settle::Idle => return,
                Settle::Stop => {
                    self.finish_decoder();
                    return;
                }
            }
        }
    }

    fn ensure_dispatching(self: &Arc<Self>) {
        if self.dispatcher.try_activate() {
            let stages = Arc::clone(self);
            self.handle.spawn(async move { stages.run_dispatcher() });
        }
    }

    fn run_dispatcher(&self) {
        loop {
            while let Some(event) = self.events.dequeue() {
                if self.dispatcher.current().is_stopping() {
                    break;
                }
                self.pipeline.dispatch(&event);
            }
            match self.dispatcher.settle_idle(|| !self.events.is_empty()) {
                Settle::Resume => {}
                Settle::Idle => return,
                Settle::Stop => {
                    self.finish_dispatcher();
                    return;
                }
            }
        }
    }

    fn finish_decoder(&self) {
        self.decoder.try_finish_stop(|| {
            let mut discarded = 0usize;
            while self.captures.dequeue().is_some() {
                discarded += 1;
            }
            trace!(discarded, "decoder stopped");
        });
    }

    fn finish_dispatcher(&self) {
        self.dispatcher.try_finish_stop(|| {
            let mut discarded = 0usize;
            while self.events.dequeue().is_some() {
                discarded += 1;
            }
            trace!(discarded, "dispatcher stopped");
        });
    }
}

impl RunningPipeline for ParallelPipeline {
    fn stop(&mut self, timeout: Duration) -> Result<()> {
        let stages = &self.stages;
        stages.receiver.signal_stop();
        stages.socket.close();

        // No task is running for an idle stage, so finish it here.
        if let Some(StageState::Unknown | StageState::Suspended) = stages.decoder.signal_stop() {
            stages.finish_decoder();
        }
        if let Some(StageState::Unknown | StageState::Suspended) = stages.dispatcher.signal_stop()
        {
            stages.finish_dispatcher();
        }

        wait_stopped(
            &[&stages.receiver, &stages.decoder, &stages.dispatcher],
            timeout,
        )?;
        debug!(endpoint = %stages.pipeline.config.endpoint, "parallel pipeline stopped");
        Ok(())
    }
}

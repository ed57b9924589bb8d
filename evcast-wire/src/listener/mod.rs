//! Event listener.
//!
//! A listener joins one multicast group, decodes every datagram it hears and
//! hands the resulting events to its registered sinks. Two interchangeable
//! strategies run the pipeline:
//!
//! ```text
//! Threaded                                  Parallel
//! ┌──────────────┐   events   ┌──────────┐  ┌─────────────┐ captures ┌────────┐ events ┌────────────┐
//! │ receiver     │──────────▶│ notifier │  │ N in-flight │────────▶│ decode │──────▶│ dispatch   │
//! │ thread       │  MS queue  │ thread   │  │ receives    │ MS queue │ task   │MS queue│ task       │
//! │ recv+decode  │           │ dispatch │  │ (async)     │          │        │       │            │
//! └──────────────┘           └──────────┘  └─────────────┘          └────────┘       └────────────┘
//! ```
//!
//! Both strategies share the [`Pipeline`] context below: ignore and
//! suspension filtering, decoding with receipt metadata, the garbage policy,
//! dispatch, counters and the monitor channel.
//!
//! Every stage carries a [`StateCell`], and so does the listener itself.
//! `stop` cascades a stop signal through all of them and returns once each
//! stage has run its terminal action and reported `Stopped`.

mod parallel;
mod threaded;

use parking_lot::Mutex;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::runtime::Handle;
use tracing::{debug, error, info, trace, warn};

use evcast_core::endpoint::Endpoint;
use evcast_core::error::{EvcastError, Result};
use evcast_core::lifecycle::{StageState, StateCell};
use evcast_core::monitor::{create_monitor, ListenerEvent, ListenerEventSender, ListenerMonitor};
use evcast_core::pool::BufferPool;

use crate::codec::EventCodec;
use crate::config::{ExecutionStrategy, ListenerConfig};
use crate::db::EventTemplateDb;
use crate::event::Event;
use crate::garbage::{most_restrictive, GarbageHandling, GarbageTracker, GarbageVote};
use crate::sink::{EventSink, SinkKey, SinkRegistry};
use crate::template::meta;

use parallel::ParallelPipeline;
use threaded::ThreadedPipeline;

/// Listener counters.
#[derive(Debug, Default)]
pub struct ListenerStats {
    received: AtomicU64,
    decoded: AtomicU64,
    dispatched: AtomicU64,
    garbage: AtomicU64,
    dropped_ignored: AtomicU64,
    dropped_suspended: AtomicU64,
}

/// Point-in-time copy of [`ListenerStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListenerStatsSnapshot {
    /// Datagrams read off the socket.
    pub received: u64,
    pub decoded: u64,
    /// Events handed to at least the sink snapshot (possibly empty).
    pub dispatched: u64,
    pub garbage: u64,
    /// Datagrams from ignored endpoints.
    pub dropped_ignored: u64,
    /// Datagrams discarded while the listener was suspended.
    pub dropped_suspended: u64,
}

impl ListenerStats {
    pub fn snapshot(&self) -> ListenerStatsSnapshot {
        ListenerStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            decoded: self.decoded.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            garbage: self.garbage.load(Ordering::Relaxed),
            dropped_ignored: self.dropped_ignored.load(Ordering::Relaxed),
            dropped_suspended: self.dropped_suspended.load(Ordering::Relaxed),
        }
    }
}

/// State shared by every stage of a running pipeline.
pub(crate) struct Pipeline {
    pub(crate) config: ListenerConfig,
    pub(crate) codec: EventCodec,
    pub(crate) pool: BufferPool,
    state: Arc<StateCell>,
    sinks: Arc<SinkRegistry>,
    garbage: Arc<GarbageTracker>,
    stats: Arc<ListenerStats>,
    monitor: Option<ListenerEventSender>,
    fault: Mutex<Option<io::Error>>,
}

impl Pipeline {
    /// Whether a datagram from `remote` should be looked at at all.
    pub(crate) fn accepts(&self, remote: &SocketAddr) -> bool {
        self.stats.received.fetch_add(1, Ordering::Relaxed);
        if self.garbage.is_ignored(remote) {
            self.stats.dropped_ignored.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        if !self.state.is(StageState::Active) {
            self.stats.dropped_suspended.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        true
    }

    /// Decode one datagram and attach receipt metadata. Garbage is routed
    /// through the configured policy and yields `None`.
    pub(crate) fn decode(&self, bytes: &[u8], remote: SocketAddr) -> Option<Event> {
        match self.codec.decode(bytes) {
            Ok(mut event) => {
                self.stats.decoded.fetch_add(1, Ordering::Relaxed);
                stamp_receipt(&mut event, remote);
                Some(event)
            }
            Err(e) => {
                debug!(%remote, "garbage datagram: {}", e);
                self.handle_garbage(remote, bytes);
                None
            }
        }
    }

    fn handle_garbage(&self, remote: SocketAddr, bytes: &[u8]) {
        self.stats.garbage.fetch_add(1, Ordering::Relaxed);
        let prior = self.garbage.record(remote);
        self.publish(ListenerEvent::GarbageReceived {
            remote,
            count: prior + 1,
        });

        let ignore = match self.config.garbage_handling {
            GarbageHandling::FailSilently => false,
            GarbageHandling::IgnoreEndpointsThatSendGarbage => true,
            GarbageHandling::AskSinksToVote => {
                let votes = self
                    .sinks
                    .active()
                    .into_iter()
                    .filter(|entry| entry.key.notifies_garbage())
                    .map(|entry| entry.sink.handle_garbage_data(&entry.key, remote, prior, bytes));
                most_restrictive(votes) == GarbageVote::IgnoreAllTrafficFromEndpoint
            }
        };

        if ignore && self.garbage.ignore(remote) {
            warn!(%remote, "ignoring all further traffic from endpoint");
            self.publish(ListenerEvent::EndpointIgnored(remote));
        }
    }

    /// Deliver `event` to every active sink. A sink that declines is
    /// unregistered.
    pub(crate) fn dispatch(&self, event: &Event) {
        self.stats.dispatched.fetch_add(1, Ordering::Relaxed);
        for entry in self.sinks.active() {
            if !entry.sink.handle_event_arrival(&entry.key, event) {
                entry.key.cancel();
            }
        }
    }

    /// Record an unexpected receive error; `stop` reports it.
    pub(crate) fn record_fault(&self, err: io::Error) {
        error!(endpoint = %self.config.endpoint, "receive failed: {}", err);
        let mut fault = self.fault.lock();
        if fault.is_none() {
            *fault = Some(err);
        }
    }

    fn take_fault(&self) -> Option<io::Error> {
        self.fault.lock().take()
    }

    fn publish(&self, event: ListenerEvent) {
        if let Some(monitor) = &self.monitor {
            let _ = monitor.send(event);
        }
    }
}

fn stamp_receipt(event: &mut Event, remote: SocketAddr) {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as i64);
    let stamped = event
        .set(meta::RECEIPT_TIME, now)
        .and_then(|()| match remote.ip() {
            IpAddr::V4(ip) => event.set(meta::SENDER_IP, ip),
            IpAddr::V6(ip) => match ip.to_ipv4_mapped() {
                Some(ip) => event.set(meta::SENDER_IP, ip),
                None => Ok(()),
            },
        })
        .and_then(|()| event.set(meta::SENDER_PORT, remote.port()));
    if let Err(e) = stamped {
        trace!(event = event.name(), "receipt metadata not applied: {}", e);
    }
}

/// Wait for every cell to reach `Stopped`, sharing one deadline.
pub(crate) fn wait_stopped(cells: &[&StateCell], timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;
    for cell in cells {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if !cell.wait_for_timeout(StageState::Stopped, remaining) {
            return Err(EvcastError::invalid_state(format!(
                "{} stage did not stop within {:?} (state: {})",
                cell.name(),
                timeout,
                cell.current()
            )));
        }
    }
    Ok(())
}

/// A started strategy.
trait RunningPipeline: Send {
    /// Signal every stage, release blocked receivers and wait for all
    /// stages to report stopped.
    fn stop(&mut self, timeout: Duration) -> Result<()>;
}

/// Multicast event listener.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use evcast_wire::config::ListenerConfig;
/// use evcast_wire::event::Event;
/// use evcast_wire::listener::Listener;
/// use evcast_wire::sink::{EventSink, SinkKey};
///
/// struct Print;
///
/// impl EventSink for Print {
///     fn handle_event_arrival(&self, _key: &SinkKey, event: &Event) -> bool {
///         println!("{event}");
///         true
///     }
/// }
///
/// # fn main() -> evcast_core::error::Result<()> {
/// let listener = Listener::new(ListenerConfig::default());
/// listener.add_sink(Arc::new(Print));
/// listener.start()?;
/// // ...
/// listener.stop()?;
/// # Ok(())
/// # }
/// ```
pub struct Listener {
    config: ListenerConfig,
    codec: EventCodec,
    pool: BufferPool,
    runtime: Option<Handle>,
    state: Arc<StateCell>,
    sinks: Arc<SinkRegistry>,
    garbage: Arc<GarbageTracker>,
    stats: Arc<ListenerStats>,
    monitor: Option<(ListenerEventSender, ListenerMonitor)>,
    running: Mutex<Option<(Arc<Pipeline>, Box<dyn RunningPipeline>)>>,
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("endpoint", &self.config.endpoint)
            .field("strategy", &self.config.strategy)
            .field("state", &self.state.current())
            .field("sinks", &self.sinks.len())
            .finish_non_exhaustive()
    }
}

impl Listener {
    pub fn new(config: ListenerConfig) -> Self {
        let monitor = config.monitor.then(create_monitor);
        Self {
            config,
            codec: EventCodec::new(),
            pool: BufferPool::default(),
            runtime: None,
            state: Arc::new(StateCell::new("listener")),
            sinks: Arc::new(SinkRegistry::new()),
            garbage: Arc::new(GarbageTracker::new()),
            stats: Arc::new(ListenerStats::default()),
            monitor,
            running: Mutex::new(None),
        }
    }

    /// Decode against templates from `db`.
    #[must_use]
    pub fn with_template_db(mut self, db: Arc<dyn EventTemplateDb>) -> Self {
        self.codec = EventCodec::with_template_db(db);
        self
    }

    /// Draw receive buffers from `pool`.
    #[must_use]
    pub fn with_buffer_pool(mut self, pool: BufferPool) -> Self {
        self.pool = pool;
        self
    }

    /// Run a parallel pipeline on an existing runtime instead of an owned one.
    #[must_use]
    pub fn with_worker_pool(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    #[inline]
    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }

    #[inline]
    pub fn endpoint(&self) -> &Endpoint {
        &self.config.endpoint
    }

    #[inline]
    pub fn state(&self) -> StageState {
        self.state.current()
    }

    /// Register a sink. It receives events until its key is cancelled or it
    /// returns `false`.
    pub fn add_sink(&self, sink: Arc<dyn EventSink>) -> SinkKey {
        self.sinks.register(sink)
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    pub fn stats(&self) -> ListenerStatsSnapshot {
        self.stats.snapshot()
    }

    /// Listener events, if enabled in the config.
    pub fn monitor(&self) -> Option<ListenerMonitor> {
        self.monitor.as_ref().map(|(_, rx)| rx.clone())
    }

    /// Garbage datagrams seen from `remote`.
    pub fn garbage_count(&self, remote: &SocketAddr) -> u64 {
        self.garbage.count(remote)
    }

    pub fn is_ignored(&self, remote: &SocketAddr) -> bool {
        self.garbage.is_ignored(remote)
    }

    /// Join the group and start the pipeline. Only valid once.
    pub fn start(&self) -> Result<()> {
        let mut running = self.running.lock();
        if !self.state.try_transition(StageState::Active, StageState::Unknown) {
            return Err(EvcastError::invalid_state(format!(
                "listener cannot start from {}",
                self.state.current()
            )));
        }

        let pipeline = Arc::new(Pipeline {
            config: self.config.clone(),
            codec: self.codec.clone(),
            pool: self.pool.clone(),
            state: Arc::clone(&self.state),
            sinks: Arc::clone(&self.sinks),
            garbage: Arc::clone(&self.garbage),
            stats: Arc::clone(&self.stats),
            monitor: self.monitor.as_ref().map(|(tx, _)| tx.clone()),
            fault: Mutex::new(None),
        });

        let started: io::Result<Box<dyn RunningPipeline>> = match self.config.strategy {
            ExecutionStrategy::Threaded => {
                ThreadedPipeline::start(Arc::clone(&pipeline)).map(|p| Box::new(p) as _)
            }
            ExecutionStrategy::Parallel => {
                ParallelPipeline::start(Arc::clone(&pipeline), self.runtime.clone())
                    .map(|p| Box::new(p) as _)
            }
        };
        match started {
            Ok(strategy) => {
                *running = Some((Arc::clone(&pipeline), strategy));
                info!(
                    endpoint = %self.config.endpoint,
                    strategy = ?self.config.strategy,
                    "listener started"
                );
                pipeline.publish(ListenerEvent::Started(self.config.endpoint.clone()));
                Ok(())
            }
            Err(e) => {
                self.state.set(StageState::Unknown);
                Err(e.into())
            }
        }
    }

    /// Discard incoming datagrams until [`resume`](Self::resume).
    pub fn suspend(&self) -> Result<()> {
        if !self.state.try_transition(StageState::Suspending, StageState::Active) {
            return Err(EvcastError::invalid_state(format!(
                "listener cannot suspend from {}",
                self.state.current()
            )));
        }
        self.state.try_transition(StageState::Suspended, StageState::Suspending);
        debug!(endpoint = %self.config.endpoint, "listener suspended");
        self.publish(ListenerEvent::Suspended);
        Ok(())
    }

    pub fn resume(&self) -> Result<()> {
        if !self.state.try_transition(StageState::Active, StageState::Suspended) {
            return Err(EvcastError::invalid_state(format!(
                "listener cannot resume from {}",
                self.state.current()
            )));
        }
        debug!(endpoint = %self.config.endpoint, "listener resumed");
        self.publish(ListenerEvent::Resumed);
        Ok(())
    }

    /// Stop every stage and leave the group.
    ///
    /// Returns once all stages report stopped. If a stage misses the
    /// configured shutdown timeout the call fails with `InvalidState`, the
    /// listener stays in a stopping state and a later `stop` waits again.
    /// A receive fault recorded while running is returned here as `Io`.
    /// Must not be called from a sink.
    pub fn stop(&self) -> Result<()> {
        let signaled = self.state.signal_stop().is_some();
        let mut running = self.running.lock();
        if !signaled && running.is_none() {
            drop(running);
            // Someone else is stopping; wait for them.
            return if self
                .state
                .wait_for_timeout(StageState::Stopped, self.config.shutdown_timeout)
            {
                Ok(())
            } else {
                Err(EvcastError::invalid_state("listener stop timed out"))
            };
        }

        let mut fault = None;
        if let Some((pipeline, strategy)) = running.as_mut() {
            // On timeout the strategy stays in place for the next attempt.
            strategy.stop(self.config.shutdown_timeout)?;
            fault = pipeline.take_fault();
        }
        running.take();
        drop(running);

        self.state.try_finish_stop(|| {
            info!(endpoint = %self.config.endpoint, "listener stopped");
            self.publish(ListenerEvent::Stopped(self.config.endpoint.clone()));
        });
        match fault {
            Some(fault) => Err(fault.into()),
            None => Ok(()),
        }
    }

    fn publish(&self, event: ListenerEvent) {
        if let Some((tx, _)) = &self.monitor {
            let _ = tx.send(event);
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if !self.state.is(StageState::Stopped) {
            if let Err(e) = self.stop() {
                warn!("listener stop on drop failed: {}", e);
            }
        }
    }
}

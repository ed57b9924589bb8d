//! Event sinks and their registrations.
//!
//! A sink is registered with a listener and receives every decoded event
//! while its registration is active. The [`SinkKey`] handed back on
//! registration controls delivery: it can suspend, resume or cancel the
//! sink, and turn garbage notification off independently.

use parking_lot::RwLock;
use smallvec::SmallVec;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::event::Event;
use crate::garbage::GarbageVote;

/// Consumer of listener output.
pub trait EventSink: Send + Sync {
    /// Handle one event. Returning `false` cancels this registration.
    fn handle_event_arrival(&self, key: &SinkKey, event: &Event) -> bool;

    /// Handle a datagram from `remote` that failed to decode.
    /// `prior_count` is the number of earlier garbage datagrams from it.
    fn handle_garbage_data(
        &self,
        key: &SinkKey,
        remote: SocketAddr,
        prior_count: u64,
        bytes: &[u8],
    ) -> GarbageVote {
        let _ = (key, remote, prior_count, bytes);
        GarbageVote::None
    }
}

const ACTIVE: u8 = 0;
const SUSPENDED: u8 = 1;
const CANCELLED: u8 = 2;

struct Registration {
    id: u64,
    state: AtomicU8,
    garbage: AtomicBool,
}

/// Handle controlling one sink registration. Clones share the registration.
#[derive(Clone)]
pub struct SinkKey {
    inner: Arc<Registration>,
}

impl fmt::Debug for SinkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkKey")
            .field("id", &self.inner.id)
            .field("active", &self.is_active())
            .field("cancelled", &self.is_cancelled())
            .field("garbage", &self.notifies_garbage())
            .finish()
    }
}

impl PartialEq for SinkKey {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for SinkKey {}

impl SinkKey {
    fn new(id: u64) -> Self {
        Self {
            inner: Arc::new(Registration {
                id,
                state: AtomicU8::new(ACTIVE),
                garbage: AtomicBool::new(true),
            }),
        }
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Resume delivery. Has no effect once cancelled.
    pub fn activate(&self) -> bool {
        self.inner
            .state
            .compare_exchange(SUSPENDED, ACTIVE, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Pause delivery without giving up the registration.
    pub fn suspend(&self) -> bool {
        self.inner
            .state
            .compare_exchange(ACTIVE, SUSPENDED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// End the registration. Permanent.
    pub fn cancel(&self) {
        if self.inner.state.swap(CANCELLED, Ordering::AcqRel) != CANCELLED {
            debug!(sink = self.inner.id, "sink registration cancelled");
        }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) == ACTIVE
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) == CANCELLED
    }

    /// Turn garbage notification on or off for this sink.
    pub fn set_garbage_notification(&self, enabled: bool) {
        self.inner.garbage.store(enabled, Ordering::Release);
    }

    #[inline]
    pub fn notifies_garbage(&self) -> bool {
        self.inner.garbage.load(Ordering::Acquire)
    }
}

/// A registered sink with its key.
#[derive(Clone)]
pub struct SinkEntry {
    pub key: SinkKey,
    pub sink: Arc<dyn EventSink>,
}

/// The set of sinks attached to one listener.
///
/// Dispatch works from a snapshot, so the lock is never held while a sink
/// runs.
#[derive(Default)]
pub struct SinkRegistry {
    entries: RwLock<Vec<SinkEntry>>,
    next_id: AtomicU64,
}

impl SinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, sink: Arc<dyn EventSink>) -> SinkKey {
        let key = SinkKey::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.write().push(SinkEntry {
            key: key.clone(),
            sink,
        });
        debug!(sink = key.id(), "sink registered");
        key
    }

    /// Active sinks at this instant. Cancelled registrations are pruned.
    pub fn active(&self) -> SmallVec<[SinkEntry; 4]> {
        let entries = self.entries.read();
        let snapshot = entries.iter().filter(|e| e.key.is_active()).cloned().collect();
        let stale = entries.iter().any(|e| e.key.is_cancelled());
        drop(entries);
        if stale {
            self.entries.write().retain(|e| !e.key.is_cancelled());
        }
        snapshot
    }

    /// Registrations that are not cancelled.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .iter()
            .filter(|e| !e.key.is_cancelled())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    impl EventSink for Noop {
        fn handle_event_arrival(&self, _key: &SinkKey, _event: &Event) -> bool {
            true
        }
    }

    #[test]
    fn key_state_transitions() {
        let registry = SinkRegistry::new();
        let key = registry.register(Arc::new(Noop));
        assert!(key.is_active());
        assert!(key.suspend());
        assert!(!key.suspend());
        assert!(registry.active().is_empty());
        assert!(key.activate());
        assert_eq!(registry.active().len(), 1);

        key.cancel();
        assert!(!key.activate());
        assert!(registry.active().is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn garbage_notification_is_independent() {
        let registry = SinkRegistry::new();
        let key = registry.register(Arc::new(Noop));
        key.set_garbage_notification(false);
        assert!(!key.notifies_garbage());
        assert!(key.is_active());
    }

    #[test]
    fn default_garbage_vote_is_none() {
        let registry = SinkRegistry::new();
        let key = registry.register(Arc::new(Noop));
        let remote: SocketAddr = "10.0.0.1:9".parse().unwrap();
        assert_eq!(Noop.handle_garbage_data(&key, remote, 0, b"x"), GarbageVote::None);
    }
}

//! Listener event monitoring.
//!
//! Provides an event stream for tracking listener lifecycle changes and
//! garbage traffic without installing a sink.

use crate::endpoint::Endpoint;
use std::fmt;
use std::net::SocketAddr;

/// Listener lifecycle and traffic events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerEvent {
    /// Listener joined its group and started receiving.
    Started(Endpoint),

    /// Dispatch was suspended; datagrams are discarded until resumed.
    Suspended,

    /// Dispatch resumed after a suspension.
    Resumed,

    /// A datagram from `remote` failed to decode.
    GarbageReceived {
        remote: SocketAddr,
        /// Garbage datagrams seen from `remote`, this one included.
        count: u64,
    },

    /// All further traffic from `remote` will be dropped.
    EndpointIgnored(SocketAddr),

    /// Every pipeline stage has stopped.
    Stopped(Endpoint),
}

impl fmt::Display for ListenerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started(ep) => write!(f, "Listening on {ep}"),
            Self::Suspended => f.write_str("Suspended"),
            Self::Resumed => f.write_str("Resumed"),
            Self::GarbageReceived { remote, count } => {
                write!(f, "Garbage #{count} from {remote}")
            }
            Self::EndpointIgnored(remote) => write!(f, "Ignoring traffic from {remote}"),
            Self::Stopped(ep) => write!(f, "Stopped listening on {ep}"),
        }
    }
}

/// Handle for receiving listener events.
pub type ListenerMonitor = flume::Receiver<ListenerEvent>;

/// Sending half used by listener pipelines.
pub type ListenerEventSender = flume::Sender<ListenerEvent>;

/// Creates a new monitoring channel pair.
#[must_use]
pub fn create_monitor() -> (ListenerEventSender, ListenerMonitor) {
    flume::unbounded()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_event_display() {
        let remote: SocketAddr = "10.0.0.7:5000".parse().unwrap();
        let event = ListenerEvent::GarbageReceived { remote, count: 3 };
        assert_eq!(event.to_string(), "Garbage #3 from 10.0.0.7:5000");
        assert_eq!(
            ListenerEvent::Started(Endpoint::default()).to_string(),
            "Listening on udp://224.1.1.11:9191"
        );
    }

    #[test]
    fn test_monitor_channel() {
        let (sender, receiver) = create_monitor();
        sender.send(ListenerEvent::Suspended).unwrap();

        let event = receiver.recv().unwrap();
        assert_eq!(event, ListenerEvent::Suspended);
    }
}

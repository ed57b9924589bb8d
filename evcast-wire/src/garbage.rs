//! Per-endpoint garbage handling.
//!
//! A datagram that fails to decode is garbage. The listener counts garbage
//! per remote endpoint and applies the configured [`GarbageHandling`]
//! policy to decide whether that endpoint keeps being heard.

use dashmap::DashMap;
use std::net::SocketAddr;

/// Listener policy for endpoints that send garbage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GarbageHandling {
    /// Drop the datagram and carry on.
    #[default]
    FailSilently,
    /// Drop all traffic from an endpoint after its first garbage datagram.
    IgnoreEndpointsThatSendGarbage,
    /// Ask every active sink and apply the most restrictive vote.
    AskSinksToVote,
}

/// A sink's opinion about a garbage datagram, least to most restrictive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum GarbageVote {
    #[default]
    None,
    TreatAsGarbage,
    IgnoreAllTrafficFromEndpoint,
}

/// The most restrictive of `votes`, or [`GarbageVote::None`] if empty.
pub fn most_restrictive(votes: impl IntoIterator<Item = GarbageVote>) -> GarbageVote {
    votes.into_iter().max().unwrap_or_default()
}

/// Garbage counts and the ignore list, keyed by remote endpoint.
#[derive(Debug, Default)]
pub struct GarbageTracker {
    counts: DashMap<SocketAddr, u64>,
    ignored: DashMap<SocketAddr, ()>,
}

impl GarbageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one garbage datagram from `remote`. Returns the count before
    /// this one.
    pub fn record(&self, remote: SocketAddr) -> u64 {
        let mut count = self.counts.entry(remote).or_insert(0);
        let prior = *count;
        *count += 1;
        prior
    }

    pub fn count(&self, remote: &SocketAddr) -> u64 {
        self.counts.get(remote).map_or(0, |c| *c)
    }

    /// Stop hearing `remote`. Returns `false` if it was already ignored.
    pub fn ignore(&self, remote: SocketAddr) -> bool {
        self.ignored.insert(remote, ()).is_none()
    }

    #[inline]
    pub fn is_ignored(&self, remote: &SocketAddr) -> bool {
        !self.ignored.is_empty() && self.ignored.contains_key(remote)
    }

    pub fn ignored_count(&self) -> usize {
        self.ignored.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn votes_are_ordered_by_restrictiveness() {
        assert_eq!(
            most_restrictive([GarbageVote::None, GarbageVote::TreatAsGarbage]),
            GarbageVote::TreatAsGarbage
        );
        assert_eq!(
            most_restrictive([
                GarbageVote::IgnoreAllTrafficFromEndpoint,
                GarbageVote::TreatAsGarbage
            ]),
            GarbageVote::IgnoreAllTrafficFromEndpoint
        );
        assert_eq!(most_restrictive(std::iter::empty()), GarbageVote::None);
    }

    #[test]
    fn tracker_counts_per_endpoint() {
        let tracker = GarbageTracker::new();
        let a: SocketAddr = "10.0.0.1:1000".parse().unwrap();
        let b: SocketAddr = "10.0.0.2:1000".parse().unwrap();
        assert_eq!(tracker.record(a), 0);
        assert_eq!(tracker.record(a), 1);
        assert_eq!(tracker.record(b), 0);
        assert_eq!(tracker.count(&a), 2);

        assert!(!tracker.is_ignored(&a));
        assert!(tracker.ignore(a));
        assert!(!tracker.ignore(a));
        assert!(tracker.is_ignored(&a));
        assert!(!tracker.is_ignored(&b));
    }
}

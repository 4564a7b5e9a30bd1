//! Per-channel join state.
//!
//! The tracker owns one [`ChannelState`] per joined or pending-join
//! channel. Mutations happen only on the connection task; everything
//! else reads an immutable [`ChannelSnapshot`], so readers never observe
//! a torn intermediate state.

use std::collections::BTreeSet;

use parking_lot::RwLock;
use streamkit_common::{ChannelRef, UserRef};

/// Whether our join has been confirmed by the server yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinStatus {
    /// Join requested, self-join confirmation not yet received.
    Pending,
    /// Self-join confirmed; events for this channel flow normally.
    Active,
}

/// Mutable per-channel record. Exists iff the channel is joined or
/// pending-join.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelState {
    pub channel: ChannelRef,
    pub status: JoinStatus,
    /// Known member logins. Populated from membership events and NAMES
    /// replies; sorted for deterministic iteration.
    pub members: BTreeSet<String>,
    /// Our own last-known role flags in this channel.
    pub our_state: UserRef,
}

impl ChannelState {
    fn new(channel: ChannelRef) -> Self {
        Self {
            channel,
            status: JoinStatus::Pending,
            members: BTreeSet::new(),
            our_state: UserRef::default(),
        }
    }
}

/// Tracks the set of joined channels for one connection.
///
/// Kept in insertion order so rejoin-after-reconnect re-issues joins in
/// the order the caller joined them.
#[derive(Debug, Default)]
pub struct ChannelTracker {
    inner: RwLock<Vec<ChannelState>>,
}

impl ChannelTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pending join. Returns `false` if the channel was already
    /// tracked (join is idempotent).
    pub(crate) fn mark_pending(&self, channel: ChannelRef) -> bool {
        let mut inner = self.inner.write();
        if inner.iter().any(|c| c.channel == channel) {
            return false;
        }
        inner.push(ChannelState::new(channel));
        true
    }

    /// Confirm our own join. Creates the state if the server joined us to
    /// a channel we did not request.
    pub(crate) fn confirm_join(&self, channel: &ChannelRef) {
        let mut inner = self.inner.write();
        match inner.iter_mut().find(|c| &c.channel == channel) {
            Some(state) => state.status = JoinStatus::Active,
            None => {
                let mut state = ChannelState::new(channel.clone());
                state.status = JoinStatus::Active;
                inner.push(state);
            }
        }
    }

    /// Drop a channel's state. Returns `false` if it was not tracked.
    pub(crate) fn remove(&self, channel: &ChannelRef) -> bool {
        let mut inner = self.inner.write();
        let before = inner.len();
        inner.retain(|c| &c.channel != channel);
        inner.len() != before
    }

    pub(crate) fn member_joined(&self, channel: &ChannelRef, login: &str) {
        let mut inner = self.inner.write();
        if let Some(state) = inner.iter_mut().find(|c| &c.channel == channel) {
            state.members.insert(login.to_string());
        }
    }

    pub(crate) fn member_parted(&self, channel: &ChannelRef, login: &str) {
        let mut inner = self.inner.write();
        if let Some(state) = inner.iter_mut().find(|c| &c.channel == channel) {
            state.members.remove(login);
        }
    }

    /// Merge a NAMES reply chunk into the membership set.
    pub(crate) fn add_members(&self, channel: &ChannelRef, logins: impl IntoIterator<Item = String>) {
        let mut inner = self.inner.write();
        if let Some(state) = inner.iter_mut().find(|c| &c.channel == channel) {
            state.members.extend(logins);
        }
    }

    /// Update our own role flags from a USERSTATE event.
    pub(crate) fn set_our_state(&self, channel: &ChannelRef, user: UserRef) {
        let mut inner = self.inner.write();
        if let Some(state) = inner.iter_mut().find(|c| &c.channel == channel) {
            state.our_state = user;
        }
    }

    /// After a transport loss every channel goes back to pending until
    /// the rejoin is confirmed. Membership is stale and dropped.
    pub(crate) fn reset_for_reconnect(&self) {
        let mut inner = self.inner.write();
        for state in inner.iter_mut() {
            state.status = JoinStatus::Pending;
            state.members.clear();
            state.our_state = UserRef::default();
        }
    }

    /// Release all channel state (connection teardown).
    pub(crate) fn clear(&self) {
        self.inner.write().clear();
    }

    /// Channels to (re)join, in insertion order.
    pub(crate) fn channels_in_order(&self) -> Vec<ChannelRef> {
        self.inner.read().iter().map(|c| c.channel.clone()).collect()
    }

    /// Stable copy of all channel state for readers.
    pub fn snapshot(&self) -> ChannelSnapshot {
        ChannelSnapshot {
            channels: self.inner.read().clone(),
        }
    }
}

/// Read-only copy of the tracker's state at one point in time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelSnapshot {
    channels: Vec<ChannelState>,
}

impl ChannelSnapshot {
    pub fn contains(&self, channel: &ChannelRef) -> bool {
        self.channels.iter().any(|c| &c.channel == channel)
    }

    pub fn get(&self, channel: &ChannelRef) -> Option<&ChannelState> {
        self.channels.iter().find(|c| &c.channel == channel)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChannelState> {
        self.channels.iter()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn from_channels(channels: Vec<ChannelState>) -> Self {
        Self { channels }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chan(name: &str) -> ChannelRef {
        ChannelRef::from_name(name)
    }

    #[test]
    fn join_then_confirm() {
        let tracker = ChannelTracker::new();
        assert!(tracker.mark_pending(chan("a")));
        assert_eq!(tracker.snapshot().get(&chan("a")).unwrap().status, JoinStatus::Pending);

        tracker.confirm_join(&chan("a"));
        assert_eq!(tracker.snapshot().get(&chan("a")).unwrap().status, JoinStatus::Active);
    }

    #[test]
    fn join_is_idempotent() {
        let tracker = ChannelTracker::new();
        assert!(tracker.mark_pending(chan("a")));
        assert!(!tracker.mark_pending(chan("a")));
        assert_eq!(tracker.snapshot().len(), 1);
    }

    #[test]
    fn join_part_join_matches_single_join() {
        let tracker = ChannelTracker::new();
        tracker.mark_pending(chan("a"));
        tracker.confirm_join(&chan("a"));
        tracker.member_joined(&chan("a"), "bob");
        assert!(tracker.remove(&chan("a")));

        tracker.mark_pending(chan("a"));
        tracker.confirm_join(&chan("a"));
        let after_cycle = tracker.snapshot();

        let fresh = ChannelTracker::new();
        fresh.mark_pending(chan("a"));
        fresh.confirm_join(&chan("a"));

        assert_eq!(after_cycle, fresh.snapshot());
    }

    #[test]
    fn part_removes_state() {
        let tracker = ChannelTracker::new();
        tracker.mark_pending(chan("a"));
        assert!(tracker.remove(&chan("a")));
        assert!(!tracker.remove(&chan("a")));
        assert!(tracker.snapshot().is_empty());
    }

    #[test]
    fn rejoin_order_is_insertion_order() {
        let tracker = ChannelTracker::new();
        tracker.mark_pending(chan("zeta"));
        tracker.mark_pending(chan("alpha"));
        tracker.mark_pending(chan("mid"));
        let order: Vec<String> =
            tracker.channels_in_order().into_iter().map(|c| c.name).collect();
        assert_eq!(order, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn reconnect_reset_keeps_channels_drops_members() {
        let tracker = ChannelTracker::new();
        tracker.mark_pending(chan("a"));
        tracker.confirm_join(&chan("a"));
        tracker.member_joined(&chan("a"), "bob");

        tracker.reset_for_reconnect();
        let snap = tracker.snapshot();
        let state = snap.get(&chan("a")).unwrap();
        assert_eq!(state.status, JoinStatus::Pending);
        assert!(state.members.is_empty());
    }

    #[test]
    fn snapshot_is_stable_under_mutation() {
        let tracker = ChannelTracker::new();
        tracker.mark_pending(chan("a"));
        let snap = tracker.snapshot();
        tracker.remove(&chan("a"));
        assert!(snap.contains(&chan("a")));
        assert!(!tracker.snapshot().contains(&chan("a")));
    }
}

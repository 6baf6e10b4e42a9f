//! Pending-message queue.
//!
//! A message sent while none of its targets are ready is deferred here,
//! keyed by its original target set. Each flush pass makes at most one
//! delivery attempt per entry; a transport failure re-queues the entry for
//! the next pass, so there is no unbounded retry storm.

use takibi_shared::ChatMessage;
use takibi_shared::PeerIdentity;

use crate::roster::ConnectedRoster;

/// A deferred message and the target set it was originally addressed to.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMessage {
    pub message: ChatMessage,
    pub targets: Vec<PeerIdentity>,
}

#[derive(Debug, Clone, Default)]
pub struct PendingQueue {
    entries: Vec<PendingMessage>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: ChatMessage, targets: Vec<PeerIdentity>) {
        self.entries.push(PendingMessage { message, targets });
    }

    /// Remove and return every entry that currently has at least one ready,
    /// still-connected target, paired with that ready subset.
    ///
    /// Entries with no deliverable target stay queued untouched; removed
    /// entries are gone whether or not the caller's delivery attempt
    /// succeeds (the caller re-queues on failure).
    pub fn take_deliverable(
        &mut self,
        connected: &ConnectedRoster,
    ) -> Vec<(PendingMessage, Vec<PeerIdentity>)> {
        let mut deliverable = Vec::new();
        let mut kept = Vec::new();

        for entry in self.entries.drain(..) {
            let ready_targets = connected.ready_subset(&entry.targets);
            if ready_targets.is_empty() {
                kept.push(entry);
            } else {
                deliverable.push((entry, ready_targets));
            }
        }

        self.entries = kept;
        deliverable
    }

    /// Put an entry back after a failed delivery attempt.
    pub fn requeue(&mut self, entry: PendingMessage) {
        self.entries.push(entry);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use takibi_shared::{EnvironmentTag, UserProfile};

    fn peer(base: &str) -> PeerIdentity {
        PeerIdentity::with_tag(base, EnvironmentTag::Host, 1_700_000_000)
    }

    fn message(text: &str) -> ChatMessage {
        ChatMessage::text(text, &peer("Local"), UserProfile::new("Local"))
    }

    #[test]
    fn test_stays_queued_until_a_target_is_ready() {
        let mut queue = PendingQueue::new();
        let mut connected = ConnectedRoster::new();
        let bob = peer("Bob");

        connected.insert(bob.clone());
        queue.push(message("hello"), vec![bob.clone()]);

        // Connected but not ready: nothing deliverable.
        assert!(queue.take_deliverable(&connected).is_empty());
        assert_eq!(queue.len(), 1);

        connected.mark_ready(&bob);
        let deliverable = queue.take_deliverable(&connected);
        assert_eq!(deliverable.len(), 1);
        assert_eq!(deliverable[0].1, vec![bob]);
        assert!(queue.is_empty());

        // A second pass attempts nothing: at most one attempt per entry.
        assert!(queue.take_deliverable(&connected).is_empty());
    }

    #[test]
    fn test_disconnected_target_is_not_deliverable() {
        let mut queue = PendingQueue::new();
        let mut connected = ConnectedRoster::new();
        let bob = peer("Bob");

        connected.insert(bob.clone());
        connected.mark_ready(&bob);
        queue.push(message("hello"), vec![bob.clone()]);

        connected.remove(&bob);
        assert!(queue.take_deliverable(&connected).is_empty());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_ready_subset_of_original_targets() {
        let mut queue = PendingQueue::new();
        let mut connected = ConnectedRoster::new();
        let bob = peer("Bob");
        let carol = peer("Carol");

        connected.insert(bob.clone());
        connected.insert(carol.clone());
        connected.mark_ready(&bob);

        queue.push(message("hello"), vec![bob.clone(), carol.clone()]);

        let deliverable = queue.take_deliverable(&connected);
        assert_eq!(deliverable.len(), 1);
        // Only the ready target receives this attempt.
        assert_eq!(deliverable[0].1, vec![bob]);
    }

    #[test]
    fn test_requeue_after_failure() {
        let mut queue = PendingQueue::new();
        let mut connected = ConnectedRoster::new();
        let bob = peer("Bob");

        connected.insert(bob.clone());
        connected.mark_ready(&bob);
        queue.push(message("hello"), vec![bob.clone()]);

        let (entry, _) = queue.take_deliverable(&connected).remove(0);
        queue.requeue(entry);
        assert_eq!(queue.len(), 1);

        let deliverable = queue.take_deliverable(&connected);
        assert_eq!(deliverable.len(), 1);
    }
}

//! Peer rosters.
//!
//! [`AvailableRoster`] holds discovered-but-not-connected peers and applies
//! the duplicate/staleness resolution policy to every discovery event.
//! [`ConnectedRoster`] holds session peers together with their readiness
//! flag, so that removing a peer drops its readiness in the same operation.

use chrono::{DateTime, Utc};
use tracing::debug;

use takibi_shared::constants::STALE_REJECT_SECS;
use takibi_shared::profile::ProfileSummary;
use takibi_shared::PeerIdentity;

use crate::event::PeerConnectionState;

/// A peer visible on the rendezvous channel.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredPeer {
    pub identity: PeerIdentity,
    pub discovery_info: Option<ProfileSummary>,
    pub first_seen_at: DateTime<Utc>,
}

/// Result of running a discovery event through the resolver.
#[derive(Debug, Clone, PartialEq)]
pub enum AdmitOutcome {
    /// The peer was inserted; `superseded` lists older instances of the
    /// same participant that were displaced.
    Added {
        peer: DiscoveredPeer,
        superseded: Vec<PeerIdentity>,
    },
    /// The advertisement names the local participant.
    RejectedSelf,
    /// The identity has no parsable instance tag or is too old.
    RejectedStale,
    /// A newer instance of the same participant is already known.
    RejectedSuperseded,
    /// Already present in the available or connected roster.
    AlreadyKnown,
}

/// Discovered peers, in discovery order.
#[derive(Debug, Clone, Default)]
pub struct AvailableRoster {
    entries: Vec<DiscoveredPeer>,
}

impl AvailableRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a `PeerFound` advertisement through the resolution policy.
    ///
    /// The steps apply in a fixed order: self-rejection, then staleness,
    /// then supersession of older same-participant entries, then the final
    /// duplicate check against both rosters. The ordering guarantees a newer
    /// advertisement displaces an older one even when they arrive out of
    /// order.
    pub fn admit(
        &mut self,
        name: &str,
        discovery_info: Option<ProfileSummary>,
        local: &PeerIdentity,
        connected: &ConnectedRoster,
        now: DateTime<Utc>,
    ) -> AdmitOutcome {
        let identity = match PeerIdentity::parse(name) {
            Ok(id) => id,
            Err(_) => {
                debug!(name, "Rejecting advertisement without instance tag");
                return AdmitOutcome::RejectedStale;
            }
        };

        if identity.same_participant(local) {
            debug!(peer = %identity, "Rejecting self-discovery");
            return AdmitOutcome::RejectedSelf;
        }

        if identity.is_stale(now, STALE_REJECT_SECS) {
            debug!(peer = %identity, age = identity.age_secs(now), "Rejecting stale identity");
            return AdmitOutcome::RejectedStale;
        }

        // Supersession runs both ways so only the maximum instance tag ever
        // survives, regardless of arrival order.
        if self
            .entries
            .iter()
            .any(|entry| entry.identity.supersedes(&identity))
        {
            debug!(peer = %identity, "Rejecting instance older than a known one");
            return AdmitOutcome::RejectedSuperseded;
        }

        let mut superseded = Vec::new();
        self.entries.retain(|entry| {
            if identity.supersedes(&entry.identity) {
                debug!(old = %entry.identity, new = %identity, "Superseding older instance");
                superseded.push(entry.identity.clone());
                false
            } else {
                true
            }
        });

        if self.contains(&identity) || connected.contains(&identity) {
            return AdmitOutcome::AlreadyKnown;
        }

        let peer = DiscoveredPeer {
            identity,
            discovery_info,
            first_seen_at: now,
        };
        self.entries.push(peer.clone());
        AdmitOutcome::Added { peer, superseded }
    }

    /// Remove an entry by identity. Returns whether anything was removed.
    pub fn remove(&mut self, identity: &PeerIdentity) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| &entry.identity != identity);
        self.entries.len() != before
    }

    /// Remove an entry by raw advertised name (as delivered by `PeerLost`).
    pub fn remove_named(&mut self, name: &str) -> Option<PeerIdentity> {
        let position = self
            .entries
            .iter()
            .position(|entry| entry.identity.to_string() == name)?;
        Some(self.entries.remove(position).identity)
    }

    /// Purge entries whose identity is older than `threshold_secs`.
    pub fn purge_stale(&mut self, now: DateTime<Utc>, threshold_secs: i64) -> Vec<PeerIdentity> {
        let mut purged = Vec::new();
        self.entries.retain(|entry| {
            if entry.identity.is_stale(now, threshold_secs) {
                purged.push(entry.identity.clone());
                false
            } else {
                true
            }
        });
        purged
    }

    pub fn contains(&self, identity: &PeerIdentity) -> bool {
        self.entries.iter().any(|entry| &entry.identity == identity)
    }

    pub fn peers(&self) -> &[DiscoveredPeer] {
        &self.entries
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

/// A session peer and its readiness.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectedPeer {
    pub identity: PeerIdentity,
    pub state: PeerConnectionState,
    /// Set only after the readiness handshake; gates outbound delivery.
    pub ready: bool,
}

/// Connected peers, keyed by identity, with readiness tracked inline so a
/// removal can never leave a dangling ready flag.
#[derive(Debug, Clone, Default)]
pub struct ConnectedRoster {
    peers: Vec<ConnectedPeer>,
}

impl ConnectedRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a newly connected peer. Idempotent: returns `false` without
    /// touching state if the peer is already present.
    pub fn insert(&mut self, identity: PeerIdentity) -> bool {
        if self.contains(&identity) {
            return false;
        }
        self.peers.push(ConnectedPeer {
            identity,
            state: PeerConnectionState::Connected,
            ready: false,
        });
        true
    }

    /// Remove a disconnected peer along with its readiness flag.
    pub fn remove(&mut self, identity: &PeerIdentity) -> bool {
        let before = self.peers.len();
        self.peers.retain(|peer| &peer.identity != identity);
        self.peers.len() != before
    }

    /// Mark a peer ready. Returns `true` only on a fresh transition.
    pub fn mark_ready(&mut self, identity: &PeerIdentity) -> bool {
        match self
            .peers
            .iter_mut()
            .find(|peer| &peer.identity == identity)
        {
            Some(peer) if !peer.ready => {
                peer.ready = true;
                true
            }
            _ => false,
        }
    }

    pub fn is_ready(&self, identity: &PeerIdentity) -> bool {
        self.peers
            .iter()
            .any(|peer| &peer.identity == identity && peer.ready)
    }

    pub fn contains(&self, identity: &PeerIdentity) -> bool {
        self.peers.iter().any(|peer| &peer.identity == identity)
    }

    /// The subset of `targets` that is connected and ready.
    pub fn ready_subset(&self, targets: &[PeerIdentity]) -> Vec<PeerIdentity> {
        targets
            .iter()
            .filter(|target| self.is_ready(target))
            .cloned()
            .collect()
    }

    /// Peers still waiting on the readiness handshake.
    pub fn not_ready(&self) -> Vec<PeerIdentity> {
        self.peers
            .iter()
            .filter(|peer| !peer.ready)
            .map(|peer| peer.identity.clone())
            .collect()
    }

    pub fn identities(&self) -> Vec<PeerIdentity> {
        self.peers.iter().map(|peer| peer.identity.clone()).collect()
    }

    pub fn peers(&self) -> &[ConnectedPeer] {
        &self.peers
    }

    pub fn clear(&mut self) {
        self.peers.clear();
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use takibi_shared::EnvironmentTag;

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(2_000_000, 0).unwrap()
    }

    fn local() -> PeerIdentity {
        PeerIdentity::with_tag("Local", EnvironmentTag::Host, 1_999_000)
    }

    fn name(base: &str, tag: i64) -> String {
        PeerIdentity::with_tag(base, EnvironmentTag::Host, tag).to_string()
    }

    #[test]
    fn test_admit_and_lose() {
        let mut roster = AvailableRoster::new();
        let connected = ConnectedRoster::new();

        let outcome = roster.admit(&name("Alice", 1_999_500), None, &local(), &connected, now());
        match outcome {
            AdmitOutcome::Added { peer, superseded } => {
                assert_eq!(peer.identity.base_name, "Alice");
                assert!(superseded.is_empty());
            }
            other => panic!("expected Added, got {other:?}"),
        }
        assert_eq!(roster.len(), 1);

        let removed = roster.remove_named(&name("Alice", 1_999_500)).unwrap();
        assert_eq!(removed.base_name, "Alice");
        assert!(roster.is_empty());
    }

    #[test]
    fn test_self_discovery_rejected() {
        let mut roster = AvailableRoster::new();
        let connected = ConnectedRoster::new();

        // Same base name, different instance: still the local participant.
        let outcome = roster.admit(&name("Local", 1_999_999), None, &local(), &connected, now());
        assert_eq!(outcome, AdmitOutcome::RejectedSelf);
        assert!(roster.is_empty());
    }

    #[test]
    fn test_stale_and_untagged_rejected() {
        let mut roster = AvailableRoster::new();
        let connected = ConnectedRoster::new();

        // Older than the 3600s admission threshold.
        let outcome = roster.admit(&name("Alice", 1_000_000), None, &local(), &connected, now());
        assert_eq!(outcome, AdmitOutcome::RejectedStale);

        let outcome = roster.admit("Alice", None, &local(), &connected, now());
        assert_eq!(outcome, AdmitOutcome::RejectedStale);

        assert!(roster.is_empty());
    }

    #[test]
    fn test_newer_instance_supersedes() {
        let mut roster = AvailableRoster::new();
        let connected = ConnectedRoster::new();

        roster.admit(&name("Alice", 1_998_000), None, &local(), &connected, now());
        let outcome = roster.admit(&name("Alice", 1_999_000), None, &local(), &connected, now());

        match outcome {
            AdmitOutcome::Added { superseded, .. } => {
                assert_eq!(superseded.len(), 1);
                assert_eq!(superseded[0].instance_tag, 1_998_000);
            }
            other => panic!("expected Added, got {other:?}"),
        }

        assert_eq!(roster.len(), 1);
        assert_eq!(roster.peers()[0].identity.instance_tag, 1_999_000);
    }

    #[test]
    fn test_out_of_order_older_instance_deduped() {
        let mut roster = AvailableRoster::new();
        let connected = ConnectedRoster::new();

        roster.admit(&name("Alice", 1_999_000), None, &local(), &connected, now());
        // The older advertisement arrives late: the known newer instance
        // makes it obsolete, so the roster keeps only the maximum tag.
        let outcome = roster.admit(&name("Alice", 1_998_000), None, &local(), &connected, now());
        assert_eq!(outcome, AdmitOutcome::RejectedSuperseded);

        assert_eq!(roster.len(), 1);
        assert_eq!(roster.peers()[0].identity.instance_tag, 1_999_000);
    }

    #[test]
    fn test_duplicate_of_connected_rejected() {
        let mut roster = AvailableRoster::new();
        let mut connected = ConnectedRoster::new();
        connected.insert(PeerIdentity::with_tag("Bob", EnvironmentTag::Host, 1_999_100));

        let outcome = roster.admit(&name("Bob", 1_999_100), None, &local(), &connected, now());
        assert_eq!(outcome, AdmitOutcome::AlreadyKnown);
        assert!(roster.is_empty());
    }

    #[test]
    fn test_purge_stale() {
        let mut roster = AvailableRoster::new();
        let connected = ConnectedRoster::new();

        roster.admit(&name("Alice", 1_999_900), None, &local(), &connected, now());
        roster.admit(&name("Bob", 1_997_000), None, &local(), &connected, now());

        let purged = roster.purge_stale(now(), 1800);
        assert_eq!(purged.len(), 1);
        assert_eq!(purged[0].base_name, "Bob");
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn test_connected_readiness_lifecycle() {
        let mut connected = ConnectedRoster::new();
        let bob = PeerIdentity::with_tag("Bob", EnvironmentTag::Host, 1_999_100);

        assert!(connected.insert(bob.clone()));
        assert!(!connected.insert(bob.clone()));
        assert!(!connected.is_ready(&bob));

        assert!(connected.mark_ready(&bob));
        assert!(!connected.mark_ready(&bob));
        assert!(connected.is_ready(&bob));

        // Removal drops the readiness flag with the entry.
        assert!(connected.remove(&bob));
        assert!(!connected.is_ready(&bob));
        assert!(connected.not_ready().is_empty());
        assert!(connected.is_empty());
    }

    #[test]
    fn test_ready_subset_filters() {
        let mut connected = ConnectedRoster::new();
        let bob = PeerIdentity::with_tag("Bob", EnvironmentTag::Host, 1);
        let carol = PeerIdentity::with_tag("Carol", EnvironmentTag::Host, 2);
        let dave = PeerIdentity::with_tag("Dave", EnvironmentTag::Host, 3);

        connected.insert(bob.clone());
        connected.insert(carol.clone());
        connected.mark_ready(&bob);

        let subset = connected.ready_subset(&[bob.clone(), carol.clone(), dave.clone()]);
        assert_eq!(subset, vec![bob]);
        assert_eq!(connected.not_ready(), vec![carol]);
    }
}

//! In-process transport backed by a shared hub.
//!
//! Every endpoint registered on a [`MemoryHub`] sees the others' adverts on
//! matching service tags, exactly like participants on a shared rendezvous
//! channel — including its own advert, so self-rejection stays the
//! resolver's job. Used by the test suite and for loopback runs.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use takibi_shared::profile::ProfileSummary;
use takibi_shared::PeerIdentity;

use crate::error::TransportError;
use crate::event::{PeerConnectionState, TransportEvent};
use crate::transport::Transport;

#[derive(Debug, Clone)]
struct Advert {
    name: String,
    service_tag: String,
    profile: ProfileSummary,
}

struct EndpointState {
    events: mpsc::UnboundedSender<TransportEvent>,
    /// Session identity; survives a stopped advertisement.
    identity: Option<PeerIdentity>,
    advert: Option<Advert>,
    browsing: Option<String>,
    connected: HashSet<u64>,
}

#[derive(Default)]
struct HubInner {
    endpoints: HashMap<u64, EndpointState>,
    next_id: u64,
}

impl HubInner {
    fn push(&self, id: u64, event: TransportEvent) {
        if let Some(endpoint) = self.endpoints.get(&id) {
            let _ = endpoint.events.send(event);
        }
    }

    fn find_by_name(&self, name: &str) -> Option<u64> {
        self.endpoints.iter().find_map(|(id, endpoint)| {
            endpoint
                .advert
                .as_ref()
                .filter(|advert| advert.name == name)
                .map(|_| *id)
        })
    }

    fn find_by_identity(&self, identity: &PeerIdentity) -> Option<u64> {
        self.endpoints.iter().find_map(|(id, endpoint)| {
            endpoint
                .identity
                .as_ref()
                .filter(|known| *known == identity)
                .map(|_| *id)
        })
    }
}

/// Shared rendezvous channel connecting in-process endpoints.
#[derive(Clone, Default)]
pub struct MemoryHub {
    inner: Arc<Mutex<HubInner>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new endpoint on the hub.
    pub fn endpoint(&self) -> MemoryTransport {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().expect("hub lock");
        let id = inner.next_id;
        inner.next_id += 1;
        inner.endpoints.insert(
            id,
            EndpointState {
                events: events_tx,
                identity: None,
                advert: None,
                browsing: None,
                connected: HashSet::new(),
            },
        );
        MemoryTransport {
            inner: self.inner.clone(),
            id,
            events_rx: Some(events_rx),
        }
    }

    /// Drop the link between two peers without emitting any event, to
    /// simulate transport state the manager has not observed (drift).
    pub fn drop_silently(&self, a: &PeerIdentity, b: &PeerIdentity) {
        let mut inner = self.inner.lock().expect("hub lock");
        let (Some(a_id), Some(b_id)) = (inner.find_by_identity(a), inner.find_by_identity(b))
        else {
            return;
        };
        if let Some(endpoint) = inner.endpoints.get_mut(&a_id) {
            endpoint.connected.remove(&b_id);
        }
        if let Some(endpoint) = inner.endpoints.get_mut(&b_id) {
            endpoint.connected.remove(&a_id);
        }
    }

    /// Deliver an asynchronous transport failure to a peer's endpoint.
    pub fn inject_failure(&self, who: &PeerIdentity, error: TransportError) {
        let inner = self.inner.lock().expect("hub lock");
        if let Some(id) = inner.find_by_identity(who) {
            inner.push(id, TransportEvent::Failed { error });
        }
    }

    /// Connect two peers directly at the hub level without either side
    /// inviting, to simulate sessions the manager is missing.
    pub fn link_silently(&self, a: &PeerIdentity, b: &PeerIdentity) {
        let mut inner = self.inner.lock().expect("hub lock");
        let (Some(a_id), Some(b_id)) = (inner.find_by_identity(a), inner.find_by_identity(b))
        else {
            return;
        };
        if let Some(endpoint) = inner.endpoints.get_mut(&a_id) {
            endpoint.connected.insert(b_id);
        }
        if let Some(endpoint) = inner.endpoints.get_mut(&b_id) {
            endpoint.connected.insert(a_id);
        }
    }
}

/// One participant's view of a [`MemoryHub`].
pub struct MemoryTransport {
    inner: Arc<Mutex<HubInner>>,
    id: u64,
    events_rx: Option<mpsc::UnboundedReceiver<TransportEvent>>,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn start_advertising(
        &mut self,
        identity: &PeerIdentity,
        service_tag: &str,
        profile: &ProfileSummary,
    ) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().expect("hub lock");

        let name = identity.to_string();
        let previous = {
            let endpoint = inner
                .endpoints
                .get_mut(&self.id)
                .ok_or(TransportError::ChannelClosed)?;

            // Idempotent: re-advertising the same name on the same tag is a
            // no-op.
            if let Some(advert) = &endpoint.advert {
                if advert.name == name && advert.service_tag == service_tag {
                    return Ok(());
                }
            }

            let previous = endpoint.advert.take();
            endpoint.identity = Some(identity.clone());
            endpoint.advert = Some(Advert {
                name: name.clone(),
                service_tag: service_tag.to_string(),
                profile: profile.clone(),
            });
            previous
        };

        let browser_ids: Vec<u64> = inner
            .endpoints
            .iter()
            .filter(|(_, endpoint)| endpoint.browsing.as_deref() == Some(service_tag))
            .map(|(id, _)| *id)
            .collect();

        for browser in browser_ids {
            if let Some(old) = &previous {
                inner.push(
                    browser,
                    TransportEvent::PeerLost {
                        name: old.name.clone(),
                    },
                );
            }
            inner.push(
                browser,
                TransportEvent::PeerFound {
                    name: name.clone(),
                    discovery_info: Some(profile.clone()),
                },
            );
        }

        Ok(())
    }

    async fn stop_advertising(&mut self) {
        let mut inner = self.inner.lock().expect("hub lock");

        let advert = match inner.endpoints.get_mut(&self.id) {
            Some(endpoint) => endpoint.advert.take(),
            None => return,
        };
        let Some(advert) = advert else { return };

        let browser_ids: Vec<u64> = inner
            .endpoints
            .iter()
            .filter(|(_, endpoint)| endpoint.browsing.as_deref() == Some(advert.service_tag.as_str()))
            .map(|(id, _)| *id)
            .collect();

        for browser in browser_ids {
            inner.push(
                browser,
                TransportEvent::PeerLost {
                    name: advert.name.clone(),
                },
            );
        }
    }

    async fn start_browsing(&mut self, service_tag: &str) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().expect("hub lock");

        {
            let endpoint = inner
                .endpoints
                .get_mut(&self.id)
                .ok_or(TransportError::ChannelClosed)?;
            if endpoint.browsing.as_deref() == Some(service_tag) {
                return Ok(());
            }
            endpoint.browsing = Some(service_tag.to_string());
        }

        // Deliver everything currently advertised on the tag, the local
        // advert included.
        let found: Vec<TransportEvent> = inner
            .endpoints
            .values()
            .filter_map(|endpoint| endpoint.advert.as_ref())
            .filter(|advert| advert.service_tag == service_tag)
            .map(|advert| TransportEvent::PeerFound {
                name: advert.name.clone(),
                discovery_info: Some(advert.profile.clone()),
            })
            .collect();

        for event in found {
            inner.push(self.id, event);
        }

        Ok(())
    }

    async fn stop_browsing(&mut self) {
        let mut inner = self.inner.lock().expect("hub lock");
        if let Some(endpoint) = inner.endpoints.get_mut(&self.id) {
            endpoint.browsing = None;
        }
    }

    async fn invite(&mut self, peer: &PeerIdentity) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().expect("hub lock");

        let local_identity = {
            let endpoint = inner
                .endpoints
                .get(&self.id)
                .ok_or(TransportError::ChannelClosed)?;
            if endpoint.browsing.is_none() {
                return Err(TransportError::NotStarted("browser"));
            }
            endpoint
                .identity
                .clone()
                .ok_or(TransportError::NotStarted("session"))?
        };

        let target = inner
            .find_by_name(&peer.to_string())
            .ok_or_else(|| TransportError::NotConnected(peer.to_string()))?;

        let already = inner
            .endpoints
            .get(&self.id)
            .map(|endpoint| endpoint.connected.contains(&target))
            .unwrap_or(false);
        if already {
            return Ok(());
        }

        for state in [
            PeerConnectionState::Connecting,
            PeerConnectionState::Connected,
        ] {
            inner.push(
                self.id,
                TransportEvent::PeerStateChanged {
                    peer: peer.clone(),
                    state,
                },
            );
            inner.push(
                target,
                TransportEvent::PeerStateChanged {
                    peer: local_identity.clone(),
                    state,
                },
            );
        }

        if let Some(endpoint) = inner.endpoints.get_mut(&self.id) {
            endpoint.connected.insert(target);
        }
        if let Some(endpoint) = inner.endpoints.get_mut(&target) {
            endpoint.connected.insert(self.id);
        }

        Ok(())
    }

    async fn send(&mut self, peers: &[PeerIdentity], data: Vec<u8>) -> Result<(), TransportError> {
        let inner = self.inner.lock().expect("hub lock");

        let endpoint = inner
            .endpoints
            .get(&self.id)
            .ok_or(TransportError::ChannelClosed)?;
        let from = endpoint
            .identity
            .clone()
            .ok_or(TransportError::NotStarted("session"))?;

        let mut attempted = false;
        for peer in peers {
            let Some(target) = inner.find_by_identity(peer) else {
                continue;
            };
            if !endpoint.connected.contains(&target) {
                continue;
            }
            inner.push(
                target,
                TransportEvent::DataReceived {
                    from: from.clone(),
                    data: data.clone(),
                },
            );
            attempted = true;
        }

        if attempted {
            Ok(())
        } else {
            Err(TransportError::SendFailed(
                "no connected target".to_string(),
            ))
        }
    }

    async fn disconnect_all(&mut self) {
        let mut inner = self.inner.lock().expect("hub lock");

        let (local_identity, links) = match inner.endpoints.get_mut(&self.id) {
            Some(endpoint) => (
                endpoint.identity.clone(),
                std::mem::take(&mut endpoint.connected),
            ),
            None => return,
        };

        for target in links {
            if let Some(endpoint) = inner.endpoints.get_mut(&target) {
                endpoint.connected.remove(&self.id);
            }
            if let Some(identity) = &local_identity {
                inner.push(
                    target,
                    TransportEvent::PeerStateChanged {
                        peer: identity.clone(),
                        state: PeerConnectionState::Disconnected,
                    },
                );
            }
            let peer_identity = inner
                .endpoints
                .get(&target)
                .and_then(|endpoint| endpoint.identity.clone());
            if let Some(peer) = peer_identity {
                inner.push(
                    self.id,
                    TransportEvent::PeerStateChanged {
                        peer,
                        state: PeerConnectionState::Disconnected,
                    },
                );
            }
        }
    }

    async fn connected_peers(&self) -> Vec<PeerIdentity> {
        let inner = self.inner.lock().expect("hub lock");
        let Some(endpoint) = inner.endpoints.get(&self.id) else {
            return Vec::new();
        };
        endpoint
            .connected
            .iter()
            .filter_map(|target| {
                inner
                    .endpoints
                    .get(target)
                    .and_then(|endpoint| endpoint.identity.clone())
            })
            .collect()
    }

    async fn restart(&mut self) -> Result<(), TransportError> {
        self.disconnect_all().await;
        let mut inner = self.inner.lock().expect("hub lock");
        if let Some(endpoint) = inner.endpoints.get_mut(&self.id) {
            endpoint.advert = None;
            endpoint.browsing = None;
        }
        Ok(())
    }

    fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<TransportEvent>> {
        self.events_rx.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use takibi_shared::{EnvironmentTag, UserProfile};

    fn identity(base: &str, tag: i64) -> PeerIdentity {
        PeerIdentity::with_tag(base, EnvironmentTag::Host, tag)
    }

    fn summary(name: &str) -> ProfileSummary {
        UserProfile::new(name).summary()
    }

    async fn advertise_and_browse(
        transport: &mut MemoryTransport,
        who: &PeerIdentity,
    ) -> mpsc::UnboundedReceiver<TransportEvent> {
        let events = transport.take_events().unwrap();
        transport
            .start_advertising(who, "takibi-chat", &summary(&who.base_name))
            .await
            .unwrap();
        transport.start_browsing("takibi-chat").await.unwrap();
        events
    }

    #[tokio::test]
    async fn test_mutual_discovery() {
        let hub = MemoryHub::new();
        let mut a = hub.endpoint();
        let mut b = hub.endpoint();

        let alice = identity("Alice", 1000);
        let bob = identity("Bob", 2000);

        let mut a_events = advertise_and_browse(&mut a, &alice).await;
        let _b_events = advertise_and_browse(&mut b, &bob).await;

        // Alice sees her own advert first (self-discovery is real), then
        // Bob's when he starts advertising.
        let mut names = Vec::new();
        while let Ok(event) = a_events.try_recv() {
            if let TransportEvent::PeerFound { name, .. } = event {
                names.push(name);
            }
        }
        assert!(names.contains(&alice.to_string()));
        assert!(names.contains(&bob.to_string()));
    }

    #[tokio::test]
    async fn test_invite_connects_both_sides() {
        let hub = MemoryHub::new();
        let mut a = hub.endpoint();
        let mut b = hub.endpoint();

        let alice = identity("Alice", 1000);
        let bob = identity("Bob", 2000);

        let mut a_events = advertise_and_browse(&mut a, &alice).await;
        let mut b_events = advertise_and_browse(&mut b, &bob).await;

        a.invite(&bob).await.unwrap();

        let mut a_connected = false;
        while let Ok(event) = a_events.try_recv() {
            if let TransportEvent::PeerStateChanged {
                peer,
                state: PeerConnectionState::Connected,
            } = event
            {
                assert_eq!(peer, bob);
                a_connected = true;
            }
        }
        let mut b_connected = false;
        while let Ok(event) = b_events.try_recv() {
            if let TransportEvent::PeerStateChanged {
                peer,
                state: PeerConnectionState::Connected,
            } = event
            {
                assert_eq!(peer, alice);
                b_connected = true;
            }
        }
        assert!(a_connected && b_connected);
        assert_eq!(a.connected_peers().await, vec![bob.clone()]);

        // Data flows to the connected peer.
        a.send(&[bob.clone()], b"hello".to_vec()).await.unwrap();
        let mut got_data = false;
        while let Ok(event) = b_events.try_recv() {
            if let TransportEvent::DataReceived { from, data } = event {
                assert_eq!(from, alice);
                assert_eq!(data, b"hello");
                got_data = true;
            }
        }
        assert!(got_data);
    }

    #[tokio::test]
    async fn test_invite_requires_browser() {
        let hub = MemoryHub::new();
        let mut a = hub.endpoint();
        let mut b = hub.endpoint();

        let alice = identity("Alice", 1000);
        let bob = identity("Bob", 2000);

        let _a_events = a.take_events().unwrap();
        a.start_advertising(&alice, "takibi-chat", &summary("Alice"))
            .await
            .unwrap();
        let _b_events = advertise_and_browse(&mut b, &bob).await;

        // Advertising but not browsing: invite must refuse.
        assert!(matches!(
            a.invite(&bob).await,
            Err(TransportError::NotStarted("browser"))
        ));
    }

    #[tokio::test]
    async fn test_send_without_link_fails() {
        let hub = MemoryHub::new();
        let mut a = hub.endpoint();
        let mut b = hub.endpoint();

        let alice = identity("Alice", 1000);
        let bob = identity("Bob", 2000);

        let _a_events = advertise_and_browse(&mut a, &alice).await;
        let _b_events = advertise_and_browse(&mut b, &bob).await;

        assert!(a.send(&[bob], b"hello".to_vec()).await.is_err());
    }

    #[tokio::test]
    async fn test_silent_drop_diverges_from_events() {
        let hub = MemoryHub::new();
        let mut a = hub.endpoint();
        let mut b = hub.endpoint();

        let alice = identity("Alice", 1000);
        let bob = identity("Bob", 2000);

        let mut a_events = advertise_and_browse(&mut a, &alice).await;
        let _b_events = advertise_and_browse(&mut b, &bob).await;

        a.invite(&bob).await.unwrap();
        while a_events.try_recv().is_ok() {}

        hub.drop_silently(&alice, &bob);

        // The authoritative set no longer reports Bob, yet no Disconnected
        // event was delivered.
        assert!(a.connected_peers().await.is_empty());
        assert!(a_events.try_recv().is_err());
    }
}

//! Multicast presence beacons.
//!
//! Advertising sends a JSON beacon to the multicast group every couple of
//! seconds; browsing listens on the group and turns beacons into
//! `PeerFound`/`PeerLost` events. A goodbye beacon announces a clean stop;
//! silence past the timeout counts as loss either way.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{interval, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use takibi_shared::constants::{BEACON_INTERVAL_SECS, BEACON_TIMEOUT_SECS};
use takibi_shared::error::DecodeError;
use takibi_shared::profile::ProfileSummary;

use crate::error::TransportError;
use crate::event::TransportEvent;

/// JSON discriminant of a presence beacon.
pub const BEACON_TYPE: &str = "takibi_beacon";

/// Shared map from advertised peer name to its session address, filled by
/// the browser and consulted when inviting.
pub(crate) type AddrBook = Arc<Mutex<HashMap<String, SocketAddr>>>;

/// A presence announcement on the rendezvous multicast group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Beacon {
    #[serde(rename = "type")]
    payload_type: String,
    #[serde(rename = "serviceType")]
    pub service_tag: String,
    #[serde(rename = "peerID")]
    pub peer: String,
    pub profile: ProfileSummary,
    #[serde(rename = "sessionPort")]
    pub session_port: u16,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub goodbye: bool,
}

impl Beacon {
    pub fn presence(
        peer: impl Into<String>,
        service_tag: impl Into<String>,
        profile: ProfileSummary,
        session_port: u16,
    ) -> Self {
        Self {
            payload_type: BEACON_TYPE.to_string(),
            service_tag: service_tag.into(),
            peer: peer.into(),
            profile,
            session_port,
            goodbye: false,
        }
    }

    /// The goodbye twin of this beacon.
    pub fn into_goodbye(mut self) -> Self {
        self.goodbye = true;
        self
    }

    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("beacon serialization")
    }

    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let beacon: Beacon =
            serde_json::from_slice(data).map_err(|e| DecodeError::Message(e.to_string()))?;
        if beacon.payload_type != BEACON_TYPE {
            return Err(DecodeError::WrongPayloadType(beacon.payload_type));
        }
        Ok(beacon)
    }
}

/// Last-seen bookkeeping for browsed peers.
#[derive(Debug, Default)]
pub(crate) struct PresenceTracker {
    peers: HashMap<String, Instant>,
}

impl PresenceTracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Record a sighting. Returns `true` on first sight.
    pub(crate) fn observe(&mut self, name: &str, now: Instant) -> bool {
        self.peers.insert(name.to_string(), now).is_none()
    }

    /// Process a goodbye. Returns `true` if the peer was known.
    pub(crate) fn farewell(&mut self, name: &str) -> bool {
        self.peers.remove(name).is_some()
    }

    /// Drop peers unheard from for longer than `timeout` and return them.
    pub(crate) fn sweep(&mut self, now: Instant, timeout: Duration) -> Vec<String> {
        let expired: Vec<String> = self
            .peers
            .iter()
            .filter(|(_, last_seen)| now.duration_since(**last_seen) > timeout)
            .map(|(name, _)| name.clone())
            .collect();
        for name in &expired {
            self.peers.remove(name);
        }
        expired
    }
}

/// Periodically announce the local peer until cancelled, then say goodbye.
pub(crate) async fn run_advertiser(
    socket: UdpSocket,
    destination: SocketAddr,
    beacon: Beacon,
    cancel: CancellationToken,
) {
    let mut ticker = interval(Duration::from_secs(BEACON_INTERVAL_SECS));
    let payload = beacon.encode();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let goodbye = beacon.clone().into_goodbye();
                if let Err(error) = socket.send_to(&goodbye.encode(), destination).await {
                    debug!(error = %error, "Failed to send goodbye beacon");
                }
                break;
            }
            _ = ticker.tick() => {
                if let Err(error) = socket.send_to(&payload, destination).await {
                    warn!(error = %error, "Failed to send presence beacon");
                }
            }
        }
    }

    debug!("Advertiser stopped");
}

/// Listen for beacons on the multicast group and emit discovery events.
pub(crate) async fn run_browser(
    socket: UdpSocket,
    service_tag: String,
    addr_book: AddrBook,
    events: mpsc::UnboundedSender<TransportEvent>,
    cancel: CancellationToken,
) {
    let mut tracker = PresenceTracker::new();
    let mut sweeper = interval(Duration::from_secs(BEACON_INTERVAL_SECS));
    let timeout = Duration::from_secs(BEACON_TIMEOUT_SECS);
    let mut buf = vec![0u8; 64 * 1024];

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            _ = sweeper.tick() => {
                for name in tracker.sweep(Instant::now(), timeout) {
                    debug!(peer = %name, "Peer beacon timed out");
                    addr_book.lock().expect("addr book lock").remove(&name);
                    let _ = events.send(TransportEvent::PeerLost { name });
                }
            }

            received = socket.recv_from(&mut buf) => {
                let (len, src) = match received {
                    Ok(received) => received,
                    Err(error) => {
                        warn!(error = %error, "Beacon socket error");
                        let _ = events.send(TransportEvent::Failed {
                            error: TransportError::Unavailable(error.to_string()),
                        });
                        break;
                    }
                };

                let beacon = match Beacon::decode(&buf[..len]) {
                    Ok(beacon) => beacon,
                    Err(error) => {
                        debug!(error = %error, "Ignoring malformed beacon");
                        continue;
                    }
                };

                if beacon.service_tag != service_tag {
                    continue;
                }

                let session_addr = SocketAddr::new(src.ip(), beacon.session_port);

                if beacon.goodbye {
                    if tracker.farewell(&beacon.peer) {
                        addr_book.lock().expect("addr book lock").remove(&beacon.peer);
                        let _ = events.send(TransportEvent::PeerLost { name: beacon.peer });
                    }
                } else {
                    let first_sight = tracker.observe(&beacon.peer, Instant::now());
                    addr_book
                        .lock()
                        .expect("addr book lock")
                        .insert(beacon.peer.clone(), session_addr);
                    if first_sight {
                        let _ = events.send(TransportEvent::PeerFound {
                            name: beacon.peer,
                            discovery_info: Some(beacon.profile),
                        });
                    }
                }
            }
        }
    }

    debug!("Browser stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use takibi_shared::UserProfile;

    #[test]
    fn test_beacon_roundtrip() {
        let beacon = Beacon::presence(
            "Alice-Host-1700000000",
            "takibi-chat",
            UserProfile::new("Alice").summary(),
            7464,
        );

        let decoded = Beacon::decode(&beacon.encode()).unwrap();
        assert_eq!(decoded, beacon);
        assert!(!decoded.goodbye);

        let goodbye = Beacon::decode(&beacon.into_goodbye().encode()).unwrap();
        assert!(goodbye.goodbye);
    }

    #[test]
    fn test_beacon_schema_field_names() {
        let beacon = Beacon::presence(
            "Alice-Host-1700000000",
            "takibi-chat",
            UserProfile::new("Alice").summary(),
            7464,
        );
        let json: serde_json::Value = serde_json::from_slice(&beacon.encode()).unwrap();

        assert_eq!(json["type"], BEACON_TYPE);
        assert!(json.get("peerID").is_some());
        assert!(json.get("serviceType").is_some());
        assert!(json.get("sessionPort").is_some());
        assert!(json.get("goodbye").is_none());
    }

    #[test]
    fn test_foreign_payload_rejected() {
        assert!(Beacon::decode(b"{\"type\":\"takibi_connect\"}").is_err());
        assert!(Beacon::decode(b"garbage").is_err());
    }

    #[test]
    fn test_presence_tracker_lifecycle() {
        let mut tracker = PresenceTracker::new();
        let now = Instant::now();

        assert!(tracker.observe("Alice", now));
        assert!(!tracker.observe("Alice", now));

        assert!(tracker.farewell("Alice"));
        assert!(!tracker.farewell("Alice"));

        tracker.observe("Bob", now);
        let expired = tracker.sweep(now + Duration::from_secs(11), Duration::from_secs(10));
        assert_eq!(expired, vec!["Bob".to_string()]);
        assert!(tracker.sweep(now, Duration::from_secs(10)).is_empty());
    }
}

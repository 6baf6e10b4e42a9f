//! LAN transport: multicast discovery + framed TCP sessions.
//!
//! The Rust-native stand-in for a platform rendezvous transport. Discovery
//! is UDP multicast presence beacons; sessions are TCP connections with a
//! hello handshake. Both feed the same event stream the manager drains.

pub mod beacon;
pub mod framing;
pub mod session;

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use takibi_shared::constants::{BEACON_GROUP, BEACON_PORT, DEFAULT_SESSION_PORT};
use takibi_shared::profile::ProfileSummary;
use takibi_shared::PeerIdentity;

use crate::error::TransportError;
use crate::event::TransportEvent;
use crate::transport::Transport;

use beacon::{AddrBook, Beacon};
use session::{LocalContext, PeerRegistry, SharedLocal};

/// LAN transport configuration.
#[derive(Debug, Clone)]
pub struct LanConfig {
    /// TCP session listen port (0 picks an ephemeral port).
    pub session_port: u16,
    /// Multicast group for presence beacons.
    pub beacon_group: Ipv4Addr,
    /// Multicast port for presence beacons.
    pub beacon_port: u16,
}

impl Default for LanConfig {
    fn default() -> Self {
        Self {
            session_port: DEFAULT_SESSION_PORT,
            beacon_group: BEACON_GROUP.parse().expect("valid multicast group"),
            beacon_port: BEACON_PORT,
        }
    }
}

struct AdvertiserHandle {
    cancel: CancellationToken,
    name: String,
    service_tag: String,
}

struct BrowserHandle {
    cancel: CancellationToken,
    service_tag: String,
}

/// Multicast + TCP transport for peers on the same network segment.
pub struct LanTransport {
    config: LanConfig,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<TransportEvent>>,
    local: SharedLocal,
    registry: PeerRegistry,
    addr_book: AddrBook,
    session_port: u16,
    listener_cancel: CancellationToken,
    advertiser: Option<AdvertiserHandle>,
    browser: Option<BrowserHandle>,
}

impl LanTransport {
    /// Bind the session listener and start accepting connections.
    pub async fn bind(config: LanConfig) -> Result<Self, TransportError> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let local: SharedLocal = Arc::new(Mutex::new(None));
        let registry: PeerRegistry = Arc::new(Mutex::new(HashMap::new()));
        let addr_book: AddrBook = Arc::new(Mutex::new(HashMap::new()));

        let (listener_cancel, session_port) =
            Self::spawn_listener(&config, &local, &registry, &events_tx).await?;

        Ok(Self {
            config,
            events_tx,
            events_rx: Some(events_rx),
            local,
            registry,
            addr_book,
            session_port,
            listener_cancel,
            advertiser: None,
            browser: None,
        })
    }

    async fn spawn_listener(
        config: &LanConfig,
        local: &SharedLocal,
        registry: &PeerRegistry,
        events_tx: &mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<(CancellationToken, u16), TransportError> {
        let listener = TcpListener::bind(("0.0.0.0", config.session_port))
            .await
            .map_err(map_io_error)?;
        let session_port = listener
            .local_addr()
            .map_err(map_io_error)?
            .port();

        info!(port = session_port, "Session listener bound");

        let cancel = CancellationToken::new();
        tokio::spawn(session::run_listener(
            listener,
            local.clone(),
            registry.clone(),
            events_tx.clone(),
            cancel.clone(),
        ));

        Ok((cancel, session_port))
    }

    fn drop_sessions(&self) {
        let links: Vec<CancellationToken> = self
            .registry
            .lock()
            .expect("registry lock")
            .values()
            .map(|link| link.cancel.clone())
            .collect();
        for cancel in links {
            cancel.cancel();
        }
    }
}

#[async_trait]
impl Transport for LanTransport {
    async fn start_advertising(
        &mut self,
        identity: &PeerIdentity,
        service_tag: &str,
        profile: &ProfileSummary,
    ) -> Result<(), TransportError> {
        let name = identity.to_string();

        if let Some(advertiser) = self.advertiser.take() {
            if advertiser.name == name && advertiser.service_tag == service_tag {
                self.advertiser = Some(advertiser);
                return Ok(());
            }
            advertiser.cancel.cancel();
        }

        *self.local.lock().expect("local lock") = Some(LocalContext {
            identity: identity.clone(),
            service_tag: service_tag.to_string(),
        });

        let socket = UdpSocket::bind(("0.0.0.0", 0)).await.map_err(map_io_error)?;
        let destination =
            SocketAddr::from((self.config.beacon_group, self.config.beacon_port));
        let announcement = Beacon::presence(
            name.clone(),
            service_tag,
            profile.clone(),
            self.session_port,
        );

        let cancel = CancellationToken::new();
        tokio::spawn(beacon::run_advertiser(
            socket,
            destination,
            announcement,
            cancel.clone(),
        ));

        info!(name = %name, service = %service_tag, "Started advertising");
        self.advertiser = Some(AdvertiserHandle {
            cancel,
            name,
            service_tag: service_tag.to_string(),
        });
        Ok(())
    }

    async fn stop_advertising(&mut self) {
        if let Some(advertiser) = self.advertiser.take() {
            advertiser.cancel.cancel();
            info!("Stopped advertising");
        }
    }

    async fn start_browsing(&mut self, service_tag: &str) -> Result<(), TransportError> {
        if let Some(browser) = self.browser.take() {
            if browser.service_tag == service_tag {
                self.browser = Some(browser);
                return Ok(());
            }
            browser.cancel.cancel();
        }

        let socket = UdpSocket::bind(("0.0.0.0", self.config.beacon_port))
            .await
            .map_err(map_io_error)?;
        socket
            .join_multicast_v4(self.config.beacon_group, Ipv4Addr::UNSPECIFIED)
            .map_err(map_io_error)?;

        let cancel = CancellationToken::new();
        tokio::spawn(beacon::run_browser(
            socket,
            service_tag.to_string(),
            self.addr_book.clone(),
            self.events_tx.clone(),
            cancel.clone(),
        ));

        info!(service = %service_tag, "Started browsing");
        self.browser = Some(BrowserHandle {
            cancel,
            service_tag: service_tag.to_string(),
        });
        Ok(())
    }

    async fn stop_browsing(&mut self) {
        if let Some(browser) = self.browser.take() {
            browser.cancel.cancel();
            self.addr_book.lock().expect("addr book lock").clear();
            info!("Stopped browsing");
        }
    }

    async fn invite(&mut self, peer: &PeerIdentity) -> Result<(), TransportError> {
        let context = self
            .local
            .lock()
            .expect("local lock")
            .clone()
            .ok_or(TransportError::NotStarted("session"))?;

        if self.browser.is_none() {
            return Err(TransportError::NotStarted("browser"));
        }

        let addr = self
            .addr_book
            .lock()
            .expect("addr book lock")
            .get(&peer.to_string())
            .copied()
            .ok_or_else(|| TransportError::NotConnected(peer.to_string()))?;

        debug!(peer = %peer, addr = %addr, "Dialing peer");
        tokio::spawn(session::connect_outbound(
            addr,
            peer.clone(),
            context,
            self.registry.clone(),
            self.events_tx.clone(),
        ));
        Ok(())
    }

    async fn send(&mut self, peers: &[PeerIdentity], data: Vec<u8>) -> Result<(), TransportError> {
        let payload = Bytes::from(data);
        let links = self.registry.lock().expect("registry lock");

        let mut attempted = false;
        for peer in peers {
            let Some(link) = links.get(peer) else {
                continue;
            };
            if let Err(error) = link.writer.try_send(payload.clone()) {
                warn!(peer = %peer, error = %error, "Session writer backed up");
                continue;
            }
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
        self.drop_sessions();
        info!("Dropped all sessions");
    }

    async fn connected_peers(&self) -> Vec<PeerIdentity> {
        self.registry
            .lock()
            .expect("registry lock")
            .keys()
            .cloned()
            .collect()
    }

    async fn restart(&mut self) -> Result<(), TransportError> {
        info!("Restarting LAN transport with a fresh handle");

        if let Some(advertiser) = self.advertiser.take() {
            advertiser.cancel.cancel();
        }
        if let Some(browser) = self.browser.take() {
            browser.cancel.cancel();
        }
        self.drop_sessions();
        self.listener_cancel.cancel();
        self.addr_book.lock().expect("addr book lock").clear();
        *self.local.lock().expect("local lock") = None;

        let (cancel, session_port) =
            Self::spawn_listener(&self.config, &self.local, &self.registry, &self.events_tx)
                .await?;
        self.listener_cancel = cancel;
        self.session_port = session_port;
        Ok(())
    }

    fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<TransportEvent>> {
        self.events_rx.take()
    }
}

fn map_io_error(error: std::io::Error) -> TransportError {
    match error.kind() {
        std::io::ErrorKind::PermissionDenied => {
            TransportError::PermissionDenied(error.to_string())
        }
        _ => TransportError::Unavailable(error.to_string()),
    }
}

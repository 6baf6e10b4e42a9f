//! Session manager orchestration with tokio mpsc command/notification pattern.
//!
//! The manager event loop runs in a dedicated tokio task that exclusively
//! owns the rosters, readiness map, pending queue and message log. External
//! code communicates through typed command and notification channels, and
//! every transport callback is marshaled onto the same task before it can
//! touch state. Timer callbacks (readiness grace, discovery restarts) go
//! through a delay queue drained by the same loop and re-validate state when
//! they fire.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::time::DelayQueue;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use takibi_shared::constants::{
    CLEANUP_INTERVAL_SECS, DEFAULT_SERVICE_TAG, READINESS_INTERVAL_SECS, READY_GRACE_MS,
    RESTART_SETTLE_MS, STALE_PURGE_SECS,
};
use takibi_shared::profile::ProfileStore;
use takibi_shared::protocol::{classify_inbound, ready_signal, Inbound};
use takibi_shared::{ChatMessage, ConnectCode, EnvironmentTag, PeerIdentity, UserProfile};

use crate::error::TransportError;
use crate::event::{PeerConnectionState, TransportEvent};
use crate::pending::PendingQueue;
use crate::roster::{AdmitOutcome, AvailableRoster, ConnectedPeer, ConnectedRoster, DiscoveredPeer};
use crate::transport::Transport;

// ---------------------------------------------------------------------------
// Command / notification types
// ---------------------------------------------------------------------------

/// Commands sent *into* the manager task.
#[derive(Debug)]
pub enum ManagerCommand {
    /// Start advertising and browsing on the rendezvous channel.
    StartService,
    /// Stop advertising and browsing.
    StopService,
    /// Invite a discovered peer to a session.
    Invite(PeerIdentity),
    /// Send a text message to all connected peers.
    SendText(String),
    /// Send an image message to all connected peers.
    SendImage(Vec<u8>),
    /// Send an image with a caption to all connected peers.
    SendImageWithText { image: Vec<u8>, text: String },
    /// Drop every session.
    DisconnectAll,
    /// Update the user profile; a display-name change rotates the identity
    /// and rebuilds the session.
    UpdateProfile(UserProfile),
    /// Request the out-of-band connect code for the local peer.
    ConnectionCode(oneshot::Sender<String>),
    /// Process a scanned connect code.
    HandleConnectionCode(String),
    /// Request a state snapshot.
    Snapshot(oneshot::Sender<ManagerSnapshot>),
    /// Request the message log.
    Messages(oneshot::Sender<Vec<ChatMessage>>),
    /// Gracefully shut down the manager.
    Shutdown,
}

/// Notifications sent *from* the manager task to the application.
#[derive(Debug, Clone)]
pub enum ManagerNotification {
    PeerFound(DiscoveredPeer),
    PeerLost(PeerIdentity),
    PeerConnected(PeerIdentity),
    PeerDisconnected(PeerIdentity),
    PeerReady(PeerIdentity),
    /// A chat message arrived from a peer.
    MessageReceived(ChatMessage),
    /// A send was deferred because no target was ready.
    MessageQueued(Uuid),
    ServiceStateChanged { searching: bool },
    TransportFailed(TransportError),
    /// Published whenever observable state changed after an event-processing
    /// step.
    SnapshotChanged(ManagerSnapshot),
}

/// Observable state published to external renderers.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerSnapshot {
    pub local_identity: PeerIdentity,
    pub searching: bool,
    pub is_connected: bool,
    pub available: Vec<DiscoveredPeer>,
    pub connected: Vec<ConnectedPeer>,
    pub pending_count: usize,
    pub message_count: usize,
}

/// Configuration for spawning the manager.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Rendezvous service tag to advertise and browse on.
    pub service_tag: String,
    /// Environment disambiguator baked into minted identities.
    pub environment: EnvironmentTag,
    /// Interval of the roster cleanup / reconciliation loop.
    pub cleanup_interval: Duration,
    /// Interval of the readiness monitor loop.
    pub readiness_interval: Duration,
    /// Channel-stabilization delay between connect and the readiness
    /// handshake. Deliberate grace period, not a workaround.
    pub ready_grace: Duration,
    /// Settle delay between a discovery teardown and its restart.
    pub restart_settle: Duration,
    /// Age beyond which the cleanup loop purges available entries.
    pub stale_purge_secs: i64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            service_tag: DEFAULT_SERVICE_TAG.to_string(),
            environment: EnvironmentTag::Host,
            cleanup_interval: Duration::from_secs(CLEANUP_INTERVAL_SECS),
            readiness_interval: Duration::from_secs(READINESS_INTERVAL_SECS),
            ready_grace: Duration::from_millis(READY_GRACE_MS),
            restart_settle: Duration::from_millis(RESTART_SETTLE_MS),
            stale_purge_secs: STALE_PURGE_SECS,
        }
    }
}

/// Timer callbacks routed back onto the manager task.
#[derive(Debug)]
enum DeferredAction {
    /// The post-connect grace elapsed for a peer.
    ReadyGrace(PeerIdentity),
    /// Resume discovery after a settle delay (profile rotation, connect
    /// code).
    RestartDiscovery,
}

/// Spawn the session manager in a background tokio task.
///
/// Returns channels for sending commands and receiving notifications, plus
/// the freshly minted local identity.
pub async fn spawn_manager(
    mut transport: Box<dyn Transport>,
    store: Arc<dyn ProfileStore>,
    config: ManagerConfig,
) -> anyhow::Result<(
    mpsc::Sender<ManagerCommand>,
    mpsc::Receiver<ManagerNotification>,
    PeerIdentity,
)> {
    let events = transport
        .take_events()
        .ok_or_else(|| anyhow::anyhow!("transport event stream already taken"))?;

    let local_identity = PeerIdentity::mint(
        store.current_profile().display_name.clone(),
        config.environment,
    );
    info!(identity = %local_identity, service = %config.service_tag, "Peer created");

    let (cmd_tx, cmd_rx) = mpsc::channel::<ManagerCommand>(256);
    let (notif_tx, notif_rx) = mpsc::channel::<ManagerNotification>(256);

    let manager = Manager {
        config,
        transport,
        store,
        local_identity: local_identity.clone(),
        searching: false,
        auto_connect: false,
        available: AvailableRoster::new(),
        connected: ConnectedRoster::new(),
        pending: PendingQueue::new(),
        messages: Vec::new(),
        notif_tx,
        last_snapshot: None,
    };

    tokio::spawn(manager.run(cmd_rx, events));

    Ok((cmd_tx, notif_rx, local_identity))
}

struct Manager {
    config: ManagerConfig,
    transport: Box<dyn Transport>,
    store: Arc<dyn ProfileStore>,
    local_identity: PeerIdentity,
    searching: bool,
    /// Consume-once flag armed by an accepted connect code.
    auto_connect: bool,
    available: AvailableRoster,
    connected: ConnectedRoster,
    pending: PendingQueue,
    messages: Vec<ChatMessage>,
    notif_tx: mpsc::Sender<ManagerNotification>,
    last_snapshot: Option<ManagerSnapshot>,
}

impl Manager {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<ManagerCommand>,
        mut events: mpsc::UnboundedReceiver<TransportEvent>,
    ) {
        let mut cleanup = interval_at(
            Instant::now() + self.config.cleanup_interval,
            self.config.cleanup_interval,
        );
        cleanup.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut readiness = interval_at(
            Instant::now() + self.config.readiness_interval,
            self.config.readiness_interval,
        );
        readiness.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut deferred: DelayQueue<DeferredAction> = DelayQueue::new();

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => {
                            if self.handle_command(cmd, &mut deferred).await.is_break() {
                                break;
                            }
                        }
                        None => {
                            info!("Command channel closed, shutting down manager");
                            break;
                        }
                    }
                }

                event = events.recv() => {
                    match event {
                        Some(event) => self.handle_event(event, &mut deferred).await,
                        None => {
                            warn!("Transport event stream ended, shutting down manager");
                            break;
                        }
                    }
                }

                _ = cleanup.tick() => self.run_cleanup(&mut deferred).await,

                _ = readiness.tick() => self.run_readiness_monitor().await,

                Some(expired) = deferred.next(), if !deferred.is_empty() => {
                    self.handle_deferred(expired.into_inner()).await;
                }
            }

            self.publish_snapshot().await;
        }

        info!("Session manager terminated");
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    async fn handle_command(
        &mut self,
        cmd: ManagerCommand,
        deferred: &mut DelayQueue<DeferredAction>,
    ) -> ControlFlow<()> {
        match cmd {
            ManagerCommand::StartService => self.start_service().await,
            ManagerCommand::StopService => self.stop_service().await,
            ManagerCommand::Invite(peer) => self.invite_peer(peer).await,
            ManagerCommand::SendText(text) => {
                if self.guard_connected("message") {
                    let message = ChatMessage::text(
                        text,
                        &self.local_identity,
                        self.store.current_profile(),
                    );
                    self.send_chat(message).await;
                }
            }
            ManagerCommand::SendImage(image) => {
                if self.guard_connected("image") {
                    let message = ChatMessage::image(
                        image,
                        &self.local_identity,
                        self.store.current_profile(),
                    );
                    self.send_chat(message).await;
                }
            }
            ManagerCommand::SendImageWithText { image, text } => {
                if self.guard_connected("message with image") {
                    let message = ChatMessage::image_with_text(
                        image,
                        text,
                        &self.local_identity,
                        self.store.current_profile(),
                    );
                    self.send_chat(message).await;
                }
            }
            ManagerCommand::DisconnectAll => self.disconnect_all().await,
            ManagerCommand::UpdateProfile(profile) => {
                self.update_profile(profile, deferred).await;
            }
            ManagerCommand::ConnectionCode(reply) => {
                let code = ConnectCode::new(
                    &self.local_identity,
                    self.config.service_tag.clone(),
                    self.store.current_profile().summary(),
                );
                let _ = reply.send(code.encode());
            }
            ManagerCommand::HandleConnectionCode(payload) => {
                self.handle_connect_code(payload, deferred).await;
            }
            ManagerCommand::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            ManagerCommand::Messages(reply) => {
                let _ = reply.send(self.messages.clone());
            }
            ManagerCommand::Shutdown => {
                info!("Manager shutdown requested");
                self.transport.disconnect_all().await;
                self.transport.stop_advertising().await;
                self.transport.stop_browsing().await;
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn guard_connected(&self, what: &str) -> bool {
        if self.connected.is_empty() {
            warn!("Cannot send {what}: no connected peers");
            return false;
        }
        true
    }

    async fn start_service(&mut self) {
        if self.searching {
            return;
        }

        let profile = self.store.current_profile().summary();
        if let Err(error) = self
            .transport
            .start_advertising(&self.local_identity, &self.config.service_tag, &profile)
            .await
        {
            warn!(error = %error, "Failed to start advertising");
            self.notify(ManagerNotification::TransportFailed(error)).await;
            return;
        }

        if let Err(error) = self.transport.start_browsing(&self.config.service_tag).await {
            warn!(error = %error, "Failed to start browsing");
            self.transport.stop_advertising().await;
            self.notify(ManagerNotification::TransportFailed(error)).await;
            return;
        }

        self.searching = true;
        info!(service = %self.config.service_tag, "Started browsing and advertising");
        self.notify(ManagerNotification::ServiceStateChanged { searching: true })
            .await;
    }

    async fn stop_service(&mut self) {
        if !self.searching {
            return;
        }

        self.transport.stop_advertising().await;
        self.transport.stop_browsing().await;
        self.searching = false;
        info!("Stopped browsing and advertising");
        self.notify(ManagerNotification::ServiceStateChanged { searching: false })
            .await;
    }

    async fn invite_peer(&mut self, peer: PeerIdentity) {
        if !self.searching {
            warn!(peer = %peer, "Cannot invite: no live browser");
            self.notify(ManagerNotification::TransportFailed(
                TransportError::NotStarted("browser"),
            ))
            .await;
            return;
        }

        info!(peer = %peer, "Inviting peer");
        if let Err(error) = self.transport.invite(&peer).await {
            warn!(peer = %peer, error = %error, "Invite failed");
            self.notify(ManagerNotification::TransportFailed(error)).await;
        }
    }

    async fn disconnect_all(&mut self) {
        self.transport.disconnect_all().await;
        self.available.clear();
        self.connected.clear();
        self.pending.clear();
        info!("Disconnected from all peers");
    }

    async fn update_profile(
        &mut self,
        profile: UserProfile,
        deferred: &mut DelayQueue<DeferredAction>,
    ) {
        let name_changed = profile.display_name != self.store.current_profile().display_name;
        self.store.update_profile(profile);

        if !name_changed {
            return;
        }

        // Identity rotation: the swap and teardown happen inside this single
        // event-processing step, so no send can observe a half-updated
        // identity.
        let new_identity = PeerIdentity::mint(
            self.store.current_profile().display_name.clone(),
            self.config.environment,
        );
        info!(old = %self.local_identity, new = %new_identity, "Profile updated, rotating identity");

        let was_searching = self.searching;
        self.transport.disconnect_all().await;
        self.transport.stop_advertising().await;
        self.transport.stop_browsing().await;
        self.searching = false;
        self.available.clear();
        self.connected.clear();
        self.pending.clear();
        self.local_identity = new_identity;

        self.notify(ManagerNotification::ServiceStateChanged { searching: false })
            .await;

        if was_searching {
            deferred.insert(DeferredAction::RestartDiscovery, self.config.restart_settle);
        }
    }

    async fn handle_connect_code(
        &mut self,
        payload: String,
        deferred: &mut DelayQueue<DeferredAction>,
    ) {
        let code = match ConnectCode::decode(&payload) {
            Ok(code) => code,
            Err(error) => {
                warn!(error = %error, "Ignoring malformed connect code");
                return;
            }
        };

        if !code.matches_service(&self.config.service_tag) {
            warn!(
                expected = %self.config.service_tag,
                got = %code.service_type,
                "Connect code targets another service"
            );
            return;
        }

        info!(peer = %code.peer_id, "Connect code accepted, arming auto-connect");
        self.auto_connect = true;

        // Restarting discovery after a short settle avoids racing an
        // in-flight teardown; the cleared roster guarantees the next
        // PeerFound is fresh.
        self.transport.stop_advertising().await;
        self.transport.stop_browsing().await;
        self.searching = false;
        self.available.clear();
        deferred.insert(DeferredAction::RestartDiscovery, self.config.restart_settle);
    }

    // -----------------------------------------------------------------------
    // Transport events
    // -----------------------------------------------------------------------

    async fn handle_event(
        &mut self,
        event: TransportEvent,
        deferred: &mut DelayQueue<DeferredAction>,
    ) {
        match event {
            TransportEvent::PeerFound {
                name,
                discovery_info,
            } => {
                let outcome = self.available.admit(
                    &name,
                    discovery_info,
                    &self.local_identity,
                    &self.connected,
                    Utc::now(),
                );
                match outcome {
                    AdmitOutcome::Added { peer, superseded } => {
                        for old in superseded {
                            self.notify(ManagerNotification::PeerLost(old)).await;
                        }
                        info!(peer = %peer.identity, "Found peer");
                        let identity = peer.identity.clone();
                        self.notify(ManagerNotification::PeerFound(peer)).await;

                        if self.auto_connect {
                            self.auto_connect = false;
                            info!(peer = %identity, "Auto-connecting to scanned peer");
                            self.invite_peer(identity).await;
                        }
                    }
                    outcome => debug!(name = %name, ?outcome, "Discovery event not admitted"),
                }
            }

            TransportEvent::PeerLost { name } => {
                if let Some(identity) = self.available.remove_named(&name) {
                    info!(peer = %identity, "Lost peer");
                    self.notify(ManagerNotification::PeerLost(identity)).await;
                }
            }

            TransportEvent::PeerStateChanged { peer, state } => {
                self.handle_state_change(peer, state, deferred).await;
            }

            TransportEvent::DataReceived { from, data } => {
                self.handle_data(from, &data).await;
            }

            TransportEvent::Failed { error } => {
                warn!(error = %error, "Transport failure");
                self.notify(ManagerNotification::TransportFailed(error)).await;
                self.recover_transport(deferred).await;
            }
        }
    }

    async fn handle_state_change(
        &mut self,
        peer: PeerIdentity,
        state: PeerConnectionState,
        deferred: &mut DelayQueue<DeferredAction>,
    ) {
        match state {
            PeerConnectionState::Connecting => {
                info!(peer = %peer, "Connecting to peer");
            }

            PeerConnectionState::Connected => {
                if self.connected.insert(peer.clone()) {
                    self.available.remove(&peer);
                    deferred.insert(
                        DeferredAction::ReadyGrace(peer.clone()),
                        self.config.ready_grace,
                    );
                    info!(peer = %peer, "Peer connected");
                    self.notify(ManagerNotification::PeerConnected(peer)).await;
                }
            }

            PeerConnectionState::Disconnected => {
                if self.connected.remove(&peer) {
                    info!(peer = %peer, "Peer disconnected");
                    self.notify(ManagerNotification::PeerDisconnected(peer)).await;
                }
            }
        }
    }

    /// Swap in a fresh transport handle after an asynchronous failure and
    /// resume discovery after the settle delay. The single retry primitive
    /// for a wedged transport.
    async fn recover_transport(&mut self, deferred: &mut DelayQueue<DeferredAction>) {
        if !self.searching {
            return;
        }

        self.searching = false;
        self.available.clear();
        self.connected.clear();
        self.pending.clear();
        self.notify(ManagerNotification::ServiceStateChanged { searching: false })
            .await;

        match self.transport.restart().await {
            Ok(()) => {
                deferred.insert(DeferredAction::RestartDiscovery, self.config.restart_settle);
            }
            Err(error) => {
                warn!(error = %error, "Transport restart failed");
                self.notify(ManagerNotification::TransportFailed(error)).await;
            }
        }
    }

    async fn handle_data(&mut self, from: PeerIdentity, data: &[u8]) {
        match classify_inbound(data) {
            Ok(Inbound::Ready { sender }) => {
                debug!(peer = %from, sender = %sender, "Peer announced ready");
                if self.connected.mark_ready(&from) {
                    self.notify(ManagerNotification::PeerReady(from)).await;
                    self.flush_pending().await;
                }
            }

            Ok(Inbound::Chat(message)) => {
                info!(peer = %from, id = %message.id, "Received message");
                self.messages.push(message.clone());
                self.notify(ManagerNotification::MessageReceived(message)).await;
            }

            Err(error) => {
                warn!(peer = %from, error = %error, "Failed to decode message");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Timers
    // -----------------------------------------------------------------------

    async fn handle_deferred(&mut self, action: DeferredAction) {
        match action {
            DeferredAction::ReadyGrace(peer) => {
                // The peer may have vanished while the timer was pending.
                if !self.connected.contains(&peer) {
                    debug!(peer = %peer, "Skipping ready grace for departed peer");
                    return;
                }

                let signal = ready_signal(&self.local_identity);
                if let Err(error) = self.transport.send(&[peer.clone()], signal).await {
                    warn!(peer = %peer, error = %error, "Failed to send ready signal");
                }

                if self.connected.mark_ready(&peer) {
                    info!(peer = %peer, "Peer channel ready");
                    self.notify(ManagerNotification::PeerReady(peer)).await;
                    self.flush_pending().await;
                }
            }

            DeferredAction::RestartDiscovery => {
                if !self.searching {
                    info!("Restarting discovery after settle delay");
                    self.start_service().await;
                }
            }
        }
    }

    /// Coarse maintenance: purge stale available entries and reconcile the
    /// connected roster against the transport's authoritative set.
    async fn run_cleanup(&mut self, deferred: &mut DelayQueue<DeferredAction>) {
        let purged = self
            .available
            .purge_stale(Utc::now(), self.config.stale_purge_secs);
        for identity in purged {
            debug!(peer = %identity, "Purged stale available peer");
            self.notify(ManagerNotification::PeerLost(identity)).await;
        }

        let truth = self.transport.connected_peers().await;

        for peer in self.connected.identities() {
            if !truth.contains(&peer) {
                warn!(peer = %peer, "Transport no longer reports peer, dropping");
                self.connected.remove(&peer);
                self.notify(ManagerNotification::PeerDisconnected(peer)).await;
            }
        }

        for peer in truth {
            if self.connected.insert(peer.clone()) {
                warn!(peer = %peer, "Adopting peer the transport reports");
                self.available.remove(&peer);
                deferred.insert(
                    DeferredAction::ReadyGrace(peer.clone()),
                    self.config.ready_grace,
                );
                self.notify(ManagerNotification::PeerConnected(peer)).await;
            }
        }
    }

    /// Fine maintenance: re-send the readiness signal to peers that have not
    /// completed the handshake, and retry deferred messages.
    async fn run_readiness_monitor(&mut self) {
        let signal = ready_signal(&self.local_identity);
        for peer in self.connected.not_ready() {
            debug!(peer = %peer, "Re-sending readiness signal");
            if let Err(error) = self.transport.send(&[peer.clone()], signal.clone()).await {
                warn!(peer = %peer, error = %error, "Failed to send ready signal");
            }
        }

        self.flush_pending().await;
    }

    // -----------------------------------------------------------------------
    // Message pipeline
    // -----------------------------------------------------------------------

    async fn send_chat(&mut self, message: ChatMessage) {
        // Local echo first; the log keeps arrival order.
        self.messages.push(message.clone());

        let targets = self.connected.identities();
        let ready = self.connected.ready_subset(&targets);

        if ready.is_empty() {
            debug!(id = %message.id, "No ready peers, queuing message");
            let id = message.id;
            self.pending.push(message, targets);
            self.notify(ManagerNotification::MessageQueued(id)).await;
            return;
        }

        let bytes = match message.to_bytes() {
            Ok(bytes) => bytes,
            Err(error) => {
                error!(error = %error, "Failed to encode message");
                return;
            }
        };

        // Peers still in their grace window are skipped for this send; the
        // message is not re-queued for them.
        match self.transport.send(&ready, bytes).await {
            Ok(()) => debug!(id = %message.id, peers = ready.len(), "Message sent"),
            Err(error) => {
                warn!(error = %error, "Send failed, queuing message");
                let id = message.id;
                self.pending.push(message, targets);
                self.notify(ManagerNotification::MessageQueued(id)).await;
            }
        }
    }

    async fn flush_pending(&mut self) {
        if self.pending.is_empty() {
            return;
        }

        for (entry, ready) in self.pending.take_deliverable(&self.connected) {
            let bytes = match entry.message.to_bytes() {
                Ok(bytes) => bytes,
                Err(error) => {
                    error!(error = %error, "Dropping undecodable pending message");
                    continue;
                }
            };

            match self.transport.send(&ready, bytes).await {
                Ok(()) => {
                    debug!(id = %entry.message.id, peers = ready.len(), "Pending message sent");
                }
                Err(error) => {
                    warn!(error = %error, "Failed to send pending message, re-queuing");
                    self.pending.requeue(entry);
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Observability
    // -----------------------------------------------------------------------

    fn snapshot(&self) -> ManagerSnapshot {
        ManagerSnapshot {
            local_identity: self.local_identity.clone(),
            searching: self.searching,
            is_connected: !self.connected.is_empty(),
            available: self.available.peers().to_vec(),
            connected: self.connected.peers().to_vec(),
            pending_count: self.pending.len(),
            message_count: self.messages.len(),
        }
    }

    async fn publish_snapshot(&mut self) {
        let snapshot = self.snapshot();
        if self.last_snapshot.as_ref() != Some(&snapshot) {
            self.last_snapshot = Some(snapshot.clone());
            let _ = self
                .notif_tx
                .send(ManagerNotification::SnapshotChanged(snapshot))
                .await;
        }
    }

    async fn notify(&self, notification: ManagerNotification) {
        let _ = self.notif_tx.send(notification).await;
    }
}

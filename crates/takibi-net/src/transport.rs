//! The seam between the session manager and a concrete transport.

use async_trait::async_trait;
use tokio::sync::mpsc;

use takibi_shared::profile::ProfileSummary;
use takibi_shared::PeerIdentity;

use crate::error::TransportError;
use crate::event::TransportEvent;

/// A discovery + session transport.
///
/// Advertising and browsing are independent, idempotent toggles: starting an
/// already-started side is a no-op, as is stopping a stopped one. Start
/// failures are reported as errors and leave the transport in a retryable
/// state.
///
/// `send` is best-effort fan-out: delivery is attempted per target and an
/// error is returned only when nothing could be attempted at all (the caller
/// re-queues the message in that case).
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Advertise the local identity on the rendezvous channel.
    async fn start_advertising(
        &mut self,
        identity: &PeerIdentity,
        service_tag: &str,
        profile: &ProfileSummary,
    ) -> Result<(), TransportError>;

    async fn stop_advertising(&mut self);

    /// Browse the rendezvous channel for other participants.
    async fn start_browsing(&mut self, service_tag: &str) -> Result<(), TransportError>;

    async fn stop_browsing(&mut self);

    /// Ask a discovered peer to establish a session. Requires both a live
    /// session handle and a live browser; otherwise an error is returned and
    /// nothing happens.
    async fn invite(&mut self, peer: &PeerIdentity) -> Result<(), TransportError>;

    /// Fan a payload out to the given connected peers, best-effort.
    async fn send(&mut self, peers: &[PeerIdentity], data: Vec<u8>) -> Result<(), TransportError>;

    /// Tear down every session channel.
    async fn disconnect_all(&mut self);

    /// The transport's authoritative set of connected peers, used by the
    /// manager's reconciliation pass to correct roster drift.
    async fn connected_peers(&self) -> Vec<PeerIdentity>;

    /// Replace the transport's internals with a fresh handle, dropping all
    /// sessions and discovery state. The single retry primitive for
    /// recovering from a wedged transport.
    async fn restart(&mut self) -> Result<(), TransportError>;

    /// Take the event stream. Yields `Some` exactly once; the stream stays
    /// alive across `restart`.
    fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<TransportEvent>>;
}

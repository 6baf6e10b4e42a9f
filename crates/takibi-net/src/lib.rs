// Transport-agnostic peer session management for takibi.

pub mod error;
pub mod event;
pub mod lan;
pub mod manager;
pub mod memory;
pub mod pending;
pub mod roster;
pub mod transport;

pub use error::TransportError;
pub use event::{PeerConnectionState, TransportEvent};
pub use lan::{LanConfig, LanTransport};
pub use manager::{
    spawn_manager, ManagerCommand, ManagerConfig, ManagerNotification, ManagerSnapshot,
};
pub use memory::{MemoryHub, MemoryTransport};
pub use pending::{PendingMessage, PendingQueue};
pub use roster::{AvailableRoster, ConnectedPeer, ConnectedRoster, DiscoveredPeer};
pub use transport::Transport;

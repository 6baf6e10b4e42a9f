// Shared types and wire formats for the takibi peer-to-peer chat core.

pub mod constants;
pub mod error;
pub mod identity;
pub mod profile;
pub mod protocol;
pub mod qr;

pub use identity::{EnvironmentTag, PeerIdentity};
pub use profile::{MemoryProfileStore, ProfileIcon, ProfileStore, ProfileSummary, UserProfile};
pub use protocol::{ChatMessage, Inbound, MessagePayload, MessageType};
pub use qr::ConnectCode;

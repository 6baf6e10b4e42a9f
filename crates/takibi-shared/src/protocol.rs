//! Wire formats exchanged between peers.
//!
//! Everything on the wire is JSON for cross-implementation interop. Two
//! kinds of payload exist: the plaintext `READY:` control signal used by the
//! readiness handshake, and JSON-encoded [`ChatMessage`]s. Control signals
//! are classified first and never reach the chat log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::READY_SIGNAL_PREFIX;
use crate::error::DecodeError;
use crate::identity::PeerIdentity;
use crate::profile::UserProfile;

/// Discriminant of a chat message's payload variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageType {
    Text,
    Image,
    ImageWithText,
}

/// A chat message as carried on the wire.
///
/// Field names are part of the interop contract: `messageType`, `senderID`,
/// `timestamp`, `isFromMe`, `senderProfile`. The `isFromMe` flag is
/// meaningful only locally; the receive path overwrites it unconditionally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Uuid,
    pub message_type: MessageType,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub text: Option<String>,
    #[serde(
        with = "base64_blob_opt",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub image_data: Option<Vec<u8>>,
    #[serde(rename = "senderID")]
    pub sender_id: String,
    pub sender_profile: UserProfile,
    pub timestamp: DateTime<Utc>,
    pub is_from_me: bool,
}

/// Borrowed view of a message's payload variant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MessagePayload<'a> {
    Text(&'a str),
    Image(&'a [u8]),
    ImageWithText(&'a [u8], &'a str),
}

impl ChatMessage {
    /// Build a locally-originated text message.
    pub fn text(
        text: impl Into<String>,
        sender: &PeerIdentity,
        sender_profile: UserProfile,
    ) -> Self {
        Self::build(
            MessageType::Text,
            Some(text.into()),
            None,
            sender,
            sender_profile,
        )
    }

    /// Build a locally-originated image message.
    pub fn image(data: Vec<u8>, sender: &PeerIdentity, sender_profile: UserProfile) -> Self {
        Self::build(MessageType::Image, None, Some(data), sender, sender_profile)
    }

    /// Build a locally-originated image message with a caption.
    pub fn image_with_text(
        data: Vec<u8>,
        text: impl Into<String>,
        sender: &PeerIdentity,
        sender_profile: UserProfile,
    ) -> Self {
        Self::build(
            MessageType::ImageWithText,
            Some(text.into()),
            Some(data),
            sender,
            sender_profile,
        )
    }

    fn build(
        message_type: MessageType,
        text: Option<String>,
        image_data: Option<Vec<u8>>,
        sender: &PeerIdentity,
        sender_profile: UserProfile,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            message_type,
            text,
            image_data,
            sender_id: sender.to_string(),
            sender_profile,
            timestamp: Utc::now(),
            is_from_me: true,
        }
    }

    /// The payload variant, or `None` if the fields are inconsistent with
    /// the declared message type.
    pub fn payload(&self) -> Option<MessagePayload<'_>> {
        match self.message_type {
            MessageType::Text => self.text.as_deref().map(MessagePayload::Text),
            MessageType::Image => self.image_data.as_deref().map(MessagePayload::Image),
            MessageType::ImageWithText => match (&self.image_data, &self.text) {
                (Some(data), Some(text)) => Some(MessagePayload::ImageWithText(data, text)),
                _ => None,
            },
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, DecodeError> {
        serde_json::to_vec(self).map_err(|e| DecodeError::Message(e.to_string()))
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, DecodeError> {
        serde_json::from_slice(data).map_err(|e| DecodeError::Message(e.to_string()))
    }
}

/// A classified inbound payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Readiness announcement; `sender` is the announcing identity's
    /// display string.
    Ready { sender: String },
    /// A chat message with the origin flag already forced to remote.
    Chat(ChatMessage),
}

/// Encode the readiness control signal for the local identity.
pub fn ready_signal(sender: &PeerIdentity) -> Vec<u8> {
    format!("{READY_SIGNAL_PREFIX}{sender}").into_bytes()
}

/// Classify raw bytes received from a peer.
///
/// Control signals are checked before chat decoding. A successfully decoded
/// chat message has `is_from_me` forced to `false` — the sender-claimed
/// value is never trusted.
pub fn classify_inbound(data: &[u8]) -> Result<Inbound, DecodeError> {
    if let Ok(text) = std::str::from_utf8(data) {
        if let Some(sender) = text.strip_prefix(READY_SIGNAL_PREFIX) {
            return Ok(Inbound::Ready {
                sender: sender.to_string(),
            });
        }
    }

    let mut message = ChatMessage::from_bytes(data)?;
    message.is_from_me = false;
    Ok(Inbound::Chat(message))
}

pub(crate) mod base64_blob {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

pub(crate) mod base64_blob_opt {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        data: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match data {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(encoded) => STANDARD
                .decode(encoded.as_bytes())
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::EnvironmentTag;

    fn test_sender() -> PeerIdentity {
        PeerIdentity::with_tag("Alice", EnvironmentTag::Host, 1_700_000_000)
    }

    #[test]
    fn test_wire_field_names() {
        let msg = ChatMessage::text("hi", &test_sender(), UserProfile::new("Alice"));
        let json = serde_json::to_value(&msg).unwrap();

        assert!(json.get("messageType").is_some());
        assert!(json.get("senderID").is_some());
        assert!(json.get("timestamp").is_some());
        assert!(json.get("isFromMe").is_some());
        assert!(json.get("senderProfile").is_some());
        assert!(json.get("imageData").is_none());
    }

    #[test]
    fn test_text_roundtrip_forces_remote_origin() {
        let msg = ChatMessage::text("hello", &test_sender(), UserProfile::new("Alice"));
        assert!(msg.is_from_me);

        let bytes = msg.to_bytes().unwrap();
        let decoded = match classify_inbound(&bytes).unwrap() {
            Inbound::Chat(m) => m,
            other => panic!("expected chat, got {other:?}"),
        };

        assert!(!decoded.is_from_me);
        assert_eq!(decoded.id, msg.id);
        assert_eq!(decoded.payload(), Some(MessagePayload::Text("hello")));
    }

    #[test]
    fn test_image_with_text_roundtrip() {
        let data = vec![0xDE, 0xAD, 0xBE, 0xEF];
        let msg = ChatMessage::image_with_text(
            data.clone(),
            "caption",
            &test_sender(),
            UserProfile::new("Alice"),
        );

        let bytes = msg.to_bytes().unwrap();
        let decoded = ChatMessage::from_bytes(&bytes).unwrap();

        assert_eq!(
            decoded.payload(),
            Some(MessagePayload::ImageWithText(&data, "caption"))
        );
    }

    #[test]
    fn test_ready_signal_roundtrip() {
        let sender = test_sender();
        let bytes = ready_signal(&sender);

        match classify_inbound(&bytes).unwrap() {
            Inbound::Ready { sender: s } => assert_eq!(s, sender.to_string()),
            other => panic!("expected ready, got {other:?}"),
        }
    }

    #[test]
    fn test_garbage_is_a_decode_error() {
        assert!(classify_inbound(b"not json at all").is_err());
        assert!(classify_inbound(&[0xFF, 0xFE, 0x00]).is_err());
    }

    #[test]
    fn test_inconsistent_payload_fields() {
        let mut msg = ChatMessage::text("hi", &test_sender(), UserProfile::new("Alice"));
        msg.message_type = MessageType::Image;
        assert_eq!(msg.payload(), None);
    }
}

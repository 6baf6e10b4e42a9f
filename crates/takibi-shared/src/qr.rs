//! Out-of-band connect codes.
//!
//! A connect code is the textual payload rendered into a QR image by the
//! presentation layer. The schema is fixed for interop:
//!
//! ```json
//! {"type":"takibi_connect","peerID":"...","serviceType":"...",
//!  "profile":{"nickname":"...","avatarEmoji":"...","statusMessage":"..."}}
//! ```

use serde::{Deserialize, Serialize};

use crate::constants::CONNECT_CODE_TYPE;
use crate::error::DecodeError;
use crate::identity::PeerIdentity;
use crate::profile::ProfileSummary;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectCode {
    #[serde(rename = "type")]
    payload_type: String,
    #[serde(rename = "peerID")]
    pub peer_id: String,
    #[serde(rename = "serviceType")]
    pub service_type: String,
    pub profile: ProfileSummary,
}

impl ConnectCode {
    pub fn new(identity: &PeerIdentity, service_type: impl Into<String>, profile: ProfileSummary) -> Self {
        Self {
            payload_type: CONNECT_CODE_TYPE.to_string(),
            peer_id: identity.to_string(),
            service_type: service_type.into(),
            profile,
        }
    }

    /// Encode as the textual payload.
    pub fn encode(&self) -> String {
        serde_json::to_string(self).expect("connect code serialization")
    }

    /// Decode and validate a scanned payload.
    ///
    /// Rejects payloads whose `type` discriminant is not
    /// [`CONNECT_CODE_TYPE`]; the service-tag check against the local
    /// rendezvous channel is the caller's responsibility.
    pub fn decode(payload: &str) -> Result<Self, DecodeError> {
        let code: ConnectCode = serde_json::from_str(payload)
            .map_err(|e| DecodeError::ConnectCode(e.to_string()))?;

        if code.payload_type != CONNECT_CODE_TYPE {
            return Err(DecodeError::WrongPayloadType(code.payload_type));
        }

        Ok(code)
    }

    /// Whether the code targets the given local rendezvous channel.
    pub fn matches_service(&self, local_service_tag: &str) -> bool {
        self.service_type == local_service_tag
    }
}

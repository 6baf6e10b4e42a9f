//! Local user profile and its discovery projection.
//!
//! The profile itself is owned by an external store; the session core reads
//! it through the [`ProfileStore`] accessor and never persists it.

use std::sync::RwLock;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::identity::{EnvironmentTag, PeerIdentity};

/// sRGB color carried alongside a system icon name.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IconColor {
    pub red: f64,
    pub green: f64,
    pub blue: f64,
    pub alpha: f64,
}

impl Default for IconColor {
    fn default() -> Self {
        // Opaque blue, matching the default avatar tint.
        Self {
            red: 0.0,
            green: 0.0,
            blue: 1.0,
            alpha: 1.0,
        }
    }
}

/// A profile avatar: either a named system icon with a tint color, or
/// user-supplied image bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ProfileIcon {
    #[serde(rename_all = "camelCase")]
    System { name: String, color: IconColor },
    #[serde(rename_all = "camelCase")]
    Custom {
        #[serde(with = "crate::protocol::base64_blob")]
        data: Vec<u8>,
    },
}

impl ProfileIcon {
    /// Display name of the icon; custom images fall back to a generic one.
    pub fn name(&self) -> &str {
        match self {
            ProfileIcon::System { name, .. } => name,
            ProfileIcon::Custom { .. } => "photo.circle.fill",
        }
    }
}

impl Default for ProfileIcon {
    fn default() -> Self {
        ProfileIcon::System {
            name: "person.circle.fill".to_string(),
            color: IconColor::default(),
        }
    }
}

/// The local user's profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub display_name: String,
    pub icon: ProfileIcon,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub birthdate: Option<NaiveDate>,
}

impl UserProfile {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            icon: ProfileIcon::default(),
            bio: None,
            location: None,
            birthdate: None,
        }
    }

    /// Project the profile into the summary advertised during discovery and
    /// embedded in connect codes.
    pub fn summary(&self) -> ProfileSummary {
        ProfileSummary {
            nickname: self.display_name.clone(),
            avatar_emoji: self.icon.name().to_string(),
            status_message: self.bio.clone().unwrap_or_default(),
            location: self.location.clone(),
            birthdate: self.birthdate,
        }
    }
}

impl Default for UserProfile {
    fn default() -> Self {
        Self::new("User")
    }
}

/// Compact profile projection carried in discovery info and connect codes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub nickname: String,
    #[serde(rename = "avatarEmoji")]
    pub avatar_emoji: String,
    #[serde(rename = "statusMessage")]
    pub status_message: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub birthdate: Option<NaiveDate>,
}

/// External owner of the user profile.
///
/// The session manager reads the current profile through this accessor and
/// pushes explicit updates back; persistence is the implementor's concern.
pub trait ProfileStore: Send + Sync {
    fn current_profile(&self) -> UserProfile;
    fn update_profile(&self, profile: UserProfile);

    /// A freshly minted peer display name for the current profile, stamped
    /// with the current time.
    fn peer_display_name(&self, environment: EnvironmentTag) -> String {
        PeerIdentity::mint(self.current_profile().display_name, environment).to_string()
    }
}

/// Non-persisting store for tests and the node binary.
pub struct MemoryProfileStore {
    profile: RwLock<UserProfile>,
}

impl MemoryProfileStore {
    pub fn new(profile: UserProfile) -> Self {
        Self {
            profile: RwLock::new(profile),
        }
    }
}

impl Default for MemoryProfileStore {
    fn default() -> Self {
        Self::new(UserProfile::default())
    }
}

impl ProfileStore for MemoryProfileStore {
    fn current_profile(&self) -> UserProfile {
        self.profile.read().expect("profile lock").clone()
    }

    fn update_profile(&self, profile: UserProfile) {
        *self.profile.write().expect("profile lock") = profile;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_projection() {
        let mut profile = UserProfile::new("Alice");
        profile.bio = Some("hello".to_string());

        let summary = profile.summary();
        assert_eq!(summary.nickname, "Alice");
        assert_eq!(summary.avatar_emoji, "person.circle.fill");
        assert_eq!(summary.status_message, "hello");
    }

    #[test]
    fn test_summary_json_field_names() {
        let summary = UserProfile::new("Alice").summary();
        let json = serde_json::to_value(&summary).unwrap();

        assert!(json.get("nickname").is_some());
        assert!(json.get("avatarEmoji").is_some());
        assert!(json.get("statusMessage").is_some());
    }

    #[test]
    fn test_custom_icon_roundtrip() {
        let profile = UserProfile {
            display_name: "Bob".to_string(),
            icon: ProfileIcon::Custom {
                data: vec![1, 2, 3, 4],
            },
            bio: None,
            location: None,
            birthdate: None,
        };

        let json = serde_json::to_string(&profile).unwrap();
        let restored: UserProfile = serde_json::from_str(&json).unwrap();
        assert_eq!(profile, restored);
    }

    #[test]
    fn test_memory_store_update() {
        let store = MemoryProfileStore::default();
        assert_eq!(store.current_profile().display_name, "User");

        store.update_profile(UserProfile::new("Carol"));
        assert_eq!(store.current_profile().display_name, "Carol");
    }

    #[test]
    fn test_peer_display_name_carries_tag() {
        let store = MemoryProfileStore::new(UserProfile::new("Carol"));
        let name = store.peer_display_name(EnvironmentTag::Guest);

        let parsed = PeerIdentity::parse(&name).unwrap();
        assert_eq!(parsed.base_name, "Carol");
        assert_eq!(parsed.environment, EnvironmentTag::Guest);
    }
}

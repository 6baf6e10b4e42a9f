use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::IdentityError;

/// Disambiguates instances of the same participant running in different
/// environments (a host device vs. a guest/emulated one).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnvironmentTag {
    Host,
    Guest,
    Unspecified,
}

impl EnvironmentTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvironmentTag::Host => "Host",
            EnvironmentTag::Guest => "Guest",
            EnvironmentTag::Unspecified => "Unspecified",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        match s {
            "Host" => Some(EnvironmentTag::Host),
            "Guest" => Some(EnvironmentTag::Guest),
            "Unspecified" => Some(EnvironmentTag::Unspecified),
            _ => None,
        }
    }
}

impl fmt::Display for EnvironmentTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A participant's addressable name on the rendezvous channel.
///
/// The instance tag is the unix-seconds creation timestamp; when two
/// identities share a base name, the greater tag is the newer, authoritative
/// one. Identities are immutable — a profile display-name change mints a
/// fresh identity and invalidates the previous one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerIdentity {
    pub base_name: String,
    pub environment: EnvironmentTag,
    pub instance_tag: i64,
}

impl PeerIdentity {
    /// Mint a fresh identity stamped with the current time.
    pub fn mint(base_name: impl Into<String>, environment: EnvironmentTag) -> Self {
        Self {
            base_name: base_name.into(),
            environment,
            instance_tag: Utc::now().timestamp(),
        }
    }

    /// Build an identity with an explicit instance tag.
    pub fn with_tag(
        base_name: impl Into<String>,
        environment: EnvironmentTag,
        instance_tag: i64,
    ) -> Self {
        Self {
            base_name: base_name.into(),
            environment,
            instance_tag,
        }
    }

    /// Parse the serialized display form `"{base}-{environment}-{tag}"`.
    ///
    /// The base name may itself contain `-`; the tag is the final segment.
    /// An unknown middle segment folds into the base name and the
    /// environment parses as [`EnvironmentTag::Unspecified`].
    pub fn parse(display: &str) -> Result<Self, IdentityError> {
        let (rest, tag_str) = display
            .rsplit_once('-')
            .ok_or(IdentityError::MissingInstanceTag)?;
        let instance_tag: i64 = tag_str
            .parse()
            .map_err(|_| IdentityError::MissingInstanceTag)?;

        let (base_name, environment) = match rest.rsplit_once('-') {
            Some((base, env_str)) => match EnvironmentTag::from_str(env_str) {
                Some(env) => (base.to_string(), env),
                None => (rest.to_string(), EnvironmentTag::Unspecified),
            },
            None => (rest.to_string(), EnvironmentTag::Unspecified),
        };

        if base_name.is_empty() {
            return Err(IdentityError::EmptyName);
        }

        Ok(Self {
            base_name,
            environment,
            instance_tag,
        })
    }

    /// Whether two identities name the same logical participant.
    pub fn same_participant(&self, other: &PeerIdentity) -> bool {
        self.base_name == other.base_name
    }

    /// Whether this identity is a newer instance of the same participant.
    pub fn supersedes(&self, other: &PeerIdentity) -> bool {
        self.same_participant(other) && self.instance_tag > other.instance_tag
    }

    /// Age of the identity relative to `now`, in seconds.
    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        now.timestamp() - self.instance_tag
    }

    /// Whether the identity is older than the given threshold.
    pub fn is_stale(&self, now: DateTime<Utc>, threshold_secs: i64) -> bool {
        self.age_secs(now) > threshold_secs
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}",
            self.base_name, self.environment, self.instance_tag
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_display_parse_roundtrip() {
        for env in [
            EnvironmentTag::Host,
            EnvironmentTag::Guest,
            EnvironmentTag::Unspecified,
        ] {
            let id = PeerIdentity::with_tag("Alice", env, 1_700_000_000);
            let parsed = PeerIdentity::parse(&id.to_string()).unwrap();
            assert_eq!(id, parsed);
        }
    }

    #[test]
    fn test_parse_base_name_with_dashes() {
        let parsed = PeerIdentity::parse("Alice-Phone-Host-1700000000").unwrap();
        assert_eq!(parsed.base_name, "Alice-Phone");
        assert_eq!(parsed.environment, EnvironmentTag::Host);
        assert_eq!(parsed.instance_tag, 1_700_000_000);
    }

    #[test]
    fn test_parse_unknown_environment_folds_into_base() {
        let parsed = PeerIdentity::parse("Alice-Phone-1700000000").unwrap();
        assert_eq!(parsed.base_name, "Alice-Phone");
        assert_eq!(parsed.environment, EnvironmentTag::Unspecified);
    }

    #[test]
    fn test_parse_missing_tag() {
        assert!(PeerIdentity::parse("Alice").is_err());
        assert!(PeerIdentity::parse("Alice-Host-notanumber").is_err());
    }

    #[test]
    fn test_supersedes() {
        let old = PeerIdentity::with_tag("Alice", EnvironmentTag::Host, 1000);
        let new = PeerIdentity::with_tag("Alice", EnvironmentTag::Host, 2000);
        let other = PeerIdentity::with_tag("Bob", EnvironmentTag::Host, 3000);

        assert!(new.supersedes(&old));
        assert!(!old.supersedes(&new));
        assert!(!new.supersedes(&new.clone()));
        assert!(!other.supersedes(&old));
    }

    #[test]
    fn test_staleness() {
        let now = Utc.timestamp_opt(10_000, 0).unwrap();
        let fresh = PeerIdentity::with_tag("Alice", EnvironmentTag::Host, 9_500);
        let stale = PeerIdentity::with_tag("Alice", EnvironmentTag::Host, 5_000);

        assert!(!fresh.is_stale(now, 3600));
        assert!(stale.is_stale(now, 3600));
        assert_eq!(stale.age_secs(now), 5_000);
    }
}

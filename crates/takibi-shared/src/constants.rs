/// Rendezvous service tag peers advertise and browse on
pub const DEFAULT_SERVICE_TAG: &str = "takibi-chat";

/// JSON discriminant of an out-of-band connect code
pub const CONNECT_CODE_TYPE: &str = "takibi_connect";

/// Prefix of the readiness control signal (followed by the sender identity)
pub const READY_SIGNAL_PREFIX: &str = "READY:";

/// Identity age beyond which a discovered peer is rejected outright (seconds)
pub const STALE_REJECT_SECS: i64 = 3600;

/// Identity age beyond which the cleanup loop purges an available entry (seconds)
pub const STALE_PURGE_SECS: i64 = 1800;

/// Delay between a peer connecting and its channel being trusted for sends (millis)
pub const READY_GRACE_MS: u64 = 1000;

/// Cleanup / roster reconciliation loop interval (seconds)
pub const CLEANUP_INTERVAL_SECS: u64 = 30;

/// Readiness monitor loop interval (seconds)
pub const READINESS_INTERVAL_SECS: u64 = 5;

/// Settle delay between discovery teardown and restart (millis)
pub const RESTART_SETTLE_MS: u64 = 1000;

/// Maximum wire frame size in bytes (8 MiB, bounds image payloads)
pub const MAX_FRAME_SIZE: usize = 8 * 1024 * 1024;

/// Default TCP session listen port
pub const DEFAULT_SESSION_PORT: u16 = 7464;

/// Multicast group for presence beacons
pub const BEACON_GROUP: &str = "239.84.75.66";

/// Multicast port for presence beacons
pub const BEACON_PORT: u16 = 7465;

/// Presence beacon send interval (seconds)
pub const BEACON_INTERVAL_SECS: u64 = 2;

/// Beacon silence after which a discovered peer is reported lost (seconds)
pub const BEACON_TIMEOUT_SECS: u64 = 10;

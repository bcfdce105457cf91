//! Fixed protocol constants shared with the sender application.
//!
//! Namespaces and timeouts here must match what the sender builds expect;
//! changing them breaks pairing with existing senders.

// ─────────────────────────────────────────────────────────────────────────────
// Channel Namespaces
// ─────────────────────────────────────────────────────────────────────────────

/// Credential exchange (receiver requests, sender responds).
pub const NS_AUTH: &str = "urn:x-cast:com.github.ashutoshgngwr.noice:auth";

/// Status updates for the sender's UI (receiver to sender).
pub const NS_STATUS: &str = "urn:x-cast:com.github.ashutoshgngwr.noice:ui-state";

/// Sound control commands (sender to receiver).
pub const NS_CONTROL: &str = "urn:x-cast:com.github.ashutoshgngwr.noice:sound-controller";

// ─────────────────────────────────────────────────────────────────────────────
// Timing
// ─────────────────────────────────────────────────────────────────────────────

/// How long the sender gets to answer an access token request (ms).
pub const TOKEN_REQUEST_TIMEOUT_MS: u64 = 15_000;

/// Default idle window before the receiver shuts itself down (seconds).
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;

/// Default fade duration used until the sender configures one (ms).
pub const DEFAULT_FADE_MS: u64 = 1_000;

/// Timeout for CDN HTTP requests (seconds).
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Interval between WebSocket pings to the sender (seconds).
pub const WS_PING_INTERVAL_SECS: u64 = 15;

/// Silence on the sender socket after which it is considered gone (seconds).
pub const WS_IDLE_TIMEOUT_SECS: u64 = 45;

// ─────────────────────────────────────────────────────────────────────────────
// CDN
// ─────────────────────────────────────────────────────────────────────────────

/// Production CDN serving the sound library.
pub const DEFAULT_CDN_BASE_URL: &str = "https://cdn.trynoice.com";

/// Bitrate requested until the sender selects one.
pub const DEFAULT_AUDIO_BITRATE: &str = "128k";

// ─────────────────────────────────────────────────────────────────────────────
// Application Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Service identifier reported by the health endpoint.
pub const SERVICE_ID: &str = "hushcast";

/// Path of the sender WebSocket endpoint.
pub const WS_PATH: &str = "/ws";

/// mDNS service type advertised on the LAN.
pub const MDNS_SERVICE_TYPE: &str = "_hushcast._tcp.local.";

/// Capacity of the per-session transport channel (inbound frames).
pub const TRANSPORT_CHANNEL_CAPACITY: usize = 256;

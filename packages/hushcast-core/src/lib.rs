//! Hushcast Core - receiver runtime for Hushcast ambient sound casting.
//!
//! A sender app on the LAN attaches over a WebSocket and drives the receiver
//! through named message channels. The receiver plays each requested sound
//! from the sound library CDN, reports state back to the sender, and shuts
//! itself down after a period with nothing playing.
//!
//! # Architecture
//!
//! - [`channel`]: named JSON channels over one transport, plus request/response correlation
//! - [`auth`]: access tokens requested from the sender on demand
//! - [`cdn`]: authenticated CDN fetches and segment playlists
//! - [`player`]: per-sound state machines, the orchestrator and the idle timer
//! - [`session`]: the loop tying transport, channels and players together
//! - [`api`]: HTTP/WebSocket surface and mDNS advertisement
//! - [`bootstrap`]: the composition root
//!
//! # Abstraction Traits
//!
//! - [`AccessTokenProvider`](auth::AccessTokenProvider): where credentials come from
//! - [`AudioBackend`](player::AudioBackend): what renders a sound
//! - [`IpDetector`](context::IpDetector): local IP detection

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod auth;
pub mod bootstrap;
pub mod cdn;
pub mod channel;
pub mod context;
pub mod error;
mod mdns_advertise;
pub mod player;
pub mod protocol_constants;
pub mod session;
pub mod state;

pub use context::{IpDetector, LocalIpDetector, NetworkContext, NetworkError};
pub use error::{ErrorCode, ReceiverError, ReceiverResult};
pub use state::{ReceiverConfig, ReceiverState};

pub use auth::{AccessTokenProvider, TokenBroker};
pub use cdn::{ResourceClient, SegmentSource};
pub use channel::{Channel, ChannelHub, Envelope};
pub use player::{AudioBackend, Orchestrator, SoundPlayer, SoundPlayerState, StreamingBackend};
pub use session::{SessionController, SessionEnd, SessionHandle, TransportEvent};

pub use bootstrap::{bootstrap_services, bootstrap_services_with_backend, BootstrappedServices};

pub use api::{start_server, AppState, SenderSlot, ServerError, ServerOptions};

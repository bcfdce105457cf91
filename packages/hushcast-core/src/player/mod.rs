//! Sound playback: per-sound state machines and the registry that owns them.
//!
//! This module provides:
//! - [`SoundPlayer`]: one sound's lifecycle, fades included
//! - [`Orchestrator`]: routes control commands and supervises idleness
//! - [`audio`]: the seam to whatever renders audio
//! - [`StreamingBackend`]: the CDN-backed implementation of that seam

pub mod audio;
pub mod idle;
pub mod orchestrator;
pub mod sound_player;
pub mod state;
pub mod streaming;

#[cfg(test)]
pub(crate) mod test_fixtures;

pub use audio::{AudioBackend, AudioEvent, AudioHandle, AudioSignal, SegmentPolicy, SignalSink};
pub use idle::IdleTimer;
pub use orchestrator::{Orchestrator, PlayerDefaults, PlayerSnapshot, StateChange, StateListener};
pub use sound_player::{PlayerOptions, SoundPlayer};
pub use state::{PlaybackStatus, SoundPlayerState};
pub use streaming::StreamingBackend;

//! Receiver configuration and the display state served to local clients.

use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{ReceiverError, ReceiverResult};
use crate::player::{PlaybackStatus, PlayerDefaults, StateChange};
use crate::protocol_constants::{
    DEFAULT_AUDIO_BITRATE, DEFAULT_CDN_BASE_URL, DEFAULT_FADE_MS, DEFAULT_IDLE_TIMEOUT_SECS,
    HTTP_TIMEOUT_SECS, TOKEN_REQUEST_TIMEOUT_MS,
};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Tunables of the receiver runtime.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Base URL of the sound library CDN.
    pub cdn_base_url: String,

    /// Seconds without any sound before the session shuts down.
    pub idle_timeout_secs: u64,

    /// How long the sender gets to answer an access token request (ms).
    pub token_request_timeout_ms: u64,

    /// Timeout for individual CDN requests (seconds).
    pub http_timeout_secs: u64,

    /// Fade-in applied to new sounds until the sender configures one (ms).
    pub default_fade_in_ms: u64,

    /// Fade-out applied to new sounds until the sender configures one (ms).
    pub default_fade_out_ms: u64,

    /// Bitrate requested for new sounds until the sender selects one.
    pub default_bitrate: String,
}

impl ReceiverConfig {
    /// Checks values that would break the runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiverError::Configuration`] naming the first bad field.
    pub fn validate(&self) -> ReceiverResult<()> {
        let url = self.cdn_base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ReceiverError::Configuration(format!(
                "cdn_base_url must be an http(s) URL, got '{}'",
                self.cdn_base_url
            )));
        }
        if self.idle_timeout_secs == 0 {
            return Err(ReceiverError::Configuration(
                "idle_timeout_secs must be > 0".into(),
            ));
        }
        if self.token_request_timeout_ms == 0 {
            return Err(ReceiverError::Configuration(
                "token_request_timeout_ms must be > 0".into(),
            ));
        }
        if self.http_timeout_secs == 0 {
            return Err(ReceiverError::Configuration(
                "http_timeout_secs must be > 0".into(),
            ));
        }
        if self.default_bitrate.is_empty() {
            return Err(ReceiverError::Configuration(
                "default_bitrate must not be empty".into(),
            ));
        }
        Ok(())
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn token_request_timeout(&self) -> Duration {
        Duration::from_millis(self.token_request_timeout_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Settings every new sound player starts with.
    pub fn player_defaults(&self) -> PlayerDefaults {
        PlayerDefaults {
            volume: 1.0,
            fade_in: Duration::from_millis(self.default_fade_in_ms),
            fade_out: Duration::from_millis(self.default_fade_out_ms),
            bitrate: self.default_bitrate.clone(),
            premium_enabled: false,
        }
    }
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            cdn_base_url: DEFAULT_CDN_BASE_URL.to_string(),
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            token_request_timeout_ms: TOKEN_REQUEST_TIMEOUT_MS,
            http_timeout_secs: HTTP_TIMEOUT_SECS,
            default_fade_in_ms: DEFAULT_FADE_MS,
            default_fade_out_ms: DEFAULT_FADE_MS,
            default_bitrate: DEFAULT_AUDIO_BITRATE.to_string(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Display State
// ─────────────────────────────────────────────────────────────────────────────

/// Last reported state of one sound.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SoundDisplay {
    pub state: PlaybackStatus,
    pub volume: f32,
}

/// What the receiver's screen shows: overall state, volume, per-sound state
/// and the preset label.
///
/// # Concurrency design
///
/// Written only by the session loop, read by HTTP handlers. `sounds` uses
/// `DashMap` so per-sound updates never block a status read.
#[derive(Debug)]
pub struct ReceiverState {
    pub global: RwLock<SoundDisplay>,
    pub sounds: DashMap<String, SoundDisplay>,
    pub preset_name: RwLock<Option<String>>,
    sender_connected: AtomicBool,
}

impl Default for ReceiverState {
    fn default() -> Self {
        Self {
            global: RwLock::new(SoundDisplay {
                state: PlaybackStatus::Stopped,
                volume: 0.0,
            }),
            sounds: DashMap::new(),
            preset_name: RwLock::new(None),
            sender_connected: AtomicBool::new(false),
        }
    }
}

impl ReceiverState {
    /// Folds a player state change into the display.
    pub fn apply(&self, change: &StateChange) {
        match change {
            StateChange::Sound {
                sound_id,
                state,
                volume,
            } => {
                if state.is_terminal() {
                    self.sounds.remove(sound_id);
                } else {
                    self.sounds.insert(
                        sound_id.clone(),
                        SoundDisplay {
                            state: state.status(),
                            volume: *volume,
                        },
                    );
                }
            }
            StateChange::Global { state, volume } => {
                *self.global.write() = SoundDisplay {
                    state: *state,
                    volume: *volume,
                };
            }
        }
    }

    /// Records the preset label. Returns `true` if it changed.
    pub fn set_preset_name(&self, name: Option<String>) -> bool {
        let mut current = self.preset_name.write();
        if *current == name {
            return false;
        }
        *current = name;
        true
    }

    pub fn set_sender_connected(&self, connected: bool) {
        self.sender_connected.store(connected, Ordering::Relaxed);
    }

    pub fn is_sender_connected(&self) -> bool {
        self.sender_connected.load(Ordering::Relaxed)
    }

    /// Serializes the display for the status endpoint.
    pub fn to_json(&self) -> serde_json::Value {
        let global = *self.global.read();
        json!({
            "state": global.state,
            "volume": global.volume,
            "presetName": *self.preset_name.read(),
            "senderConnected": self.is_sender_connected(),
            "sounds": dashmap_to_json(&self.sounds),
        })
    }
}

/// Converts a DashMap to a JSON object map.
fn dashmap_to_json<K, V>(map: &DashMap<K, V>) -> serde_json::Map<String, serde_json::Value>
where
    K: Eq + Hash + Clone + ToString,
    V: Clone + Serialize,
{
    map.iter()
        .map(|r| (r.key().to_string(), json!(r.value().clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::SoundPlayerState;

    #[test]
    fn default_config_is_valid() {
        let config = ReceiverConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.idle_timeout(), Duration::from_secs(300));
        assert_eq!(config.token_request_timeout(), Duration::from_millis(15_000));
    }

    #[test]
    fn config_rejects_zero_timeouts() {
        let config = ReceiverConfig {
            idle_timeout_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ReceiverConfig {
            token_request_timeout_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_rejects_non_http_cdn() {
        let config = ReceiverConfig {
            cdn_base_url: "ftp://cdn".into(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ReceiverError::Configuration(_))
        ));
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: ReceiverConfig =
            serde_json::from_value(json!({"idle_timeout_secs": 60})).unwrap();
        assert_eq!(config.idle_timeout_secs, 60);
        assert_eq!(config.default_fade_in_ms, 1_000);
    }

    #[test]
    fn display_tracks_sounds_until_stopped() {
        let state = ReceiverState::default();
        state.apply(&StateChange::Sound {
            sound_id: "rain".into(),
            state: SoundPlayerState::Buffering,
            volume: 0.5,
        });
        assert_eq!(
            state.sounds.get("rain").map(|s| *s),
            Some(SoundDisplay {
                state: PlaybackStatus::Loading,
                volume: 0.5
            })
        );

        state.apply(&StateChange::Sound {
            sound_id: "rain".into(),
            state: SoundPlayerState::Stopped,
            volume: 0.5,
        });
        assert!(state.sounds.is_empty());
    }

    #[test]
    fn status_json_includes_preset() {
        let state = ReceiverState::default();
        assert!(state.set_preset_name(Some("Rainy night".into())));
        assert!(!state.set_preset_name(Some("Rainy night".into())));

        let json = state.to_json();
        assert_eq!(json["presetName"], "Rainy night");
        assert_eq!(json["state"], "stopped");
        assert_eq!(json["senderConnected"], false);
    }
}

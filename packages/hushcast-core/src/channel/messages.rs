//! Tagged message types for each channel direction.
//!
//! Every payload carries a `kind` discriminator. Inbound types are closed
//! enums: a `kind` not listed here fails to parse and surfaces as
//! [`ReceiverError::Protocol`], since it means sender and receiver were built
//! against different protocol versions.
//!
//! Control kinds use the sender's historical names; the short names (`Start`,
//! `Pause`, `SetVolume`, ...) are accepted as aliases.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ReceiverError, ReceiverResult};
use crate::player::PlaybackStatus;

// ─────────────────────────────────────────────────────────────────────────────
// Control (sender -> receiver)
// ─────────────────────────────────────────────────────────────────────────────

/// Commands received on the control namespace.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind")]
pub enum ControlCommand {
    /// Starts a sound, creating its player if it does not exist yet.
    #[serde(
        rename = "SoundPlayCommand",
        alias = "Start",
        alias = "Play",
        rename_all = "camelCase"
    )]
    Play {
        sound_id: String,
        /// Initial volume for a newly created player.
        #[serde(default)]
        volume: Option<f32>,
        /// Whether the sound repeats. Ambient sounds loop unless told otherwise.
        #[serde(default)]
        is_looping: Option<bool>,
    },

    #[serde(rename = "SoundPauseCommand", alias = "Pause", rename_all = "camelCase")]
    Pause {
        sound_id: String,
        #[serde(default)]
        immediate: bool,
    },

    #[serde(rename = "SoundStopCommand", alias = "Stop", rename_all = "camelCase")]
    Stop {
        sound_id: String,
        #[serde(default)]
        immediate: bool,
    },

    #[serde(
        rename = "SoundVolumeUpdateCommand",
        alias = "SetVolume",
        rename_all = "camelCase"
    )]
    SetVolume { sound_id: String, volume: f32 },

    #[serde(
        rename = "SoundFadeInDurationUpdateCommand",
        alias = "SetFadeIn",
        rename_all = "camelCase"
    )]
    SetFadeIn {
        sound_id: String,
        duration_millis: u64,
    },

    #[serde(
        rename = "SoundFadeOutDurationUpdateCommand",
        alias = "SetFadeOut",
        rename_all = "camelCase"
    )]
    SetFadeOut {
        sound_id: String,
        duration_millis: u64,
    },

    #[serde(
        rename = "SoundAudioBitrateUpdateCommand",
        alias = "SetBitrate",
        rename_all = "camelCase"
    )]
    SetBitrate { sound_id: String, bitrate: String },

    #[serde(
        rename = "SoundPremiumSegmentsEnableCommand",
        alias = "SetPremiumSegments",
        rename_all = "camelCase"
    )]
    SetPremiumSegments { sound_id: String, is_enabled: bool },

    /// Label of the preset the sender is playing. Handled by the session,
    /// not routed to any sound.
    #[serde(
        rename = "PresetNameUpdateCommand",
        alias = "SetPresetName",
        rename_all = "camelCase"
    )]
    SetPresetName {
        #[serde(default)]
        preset_name: Option<String>,
    },
}

/// Every `kind` accepted on the control namespace, aliases included.
const CONTROL_KINDS: &[&str] = &[
    "SoundPlayCommand",
    "Start",
    "Play",
    "SoundPauseCommand",
    "Pause",
    "SoundStopCommand",
    "Stop",
    "SoundVolumeUpdateCommand",
    "SetVolume",
    "SoundFadeInDurationUpdateCommand",
    "SetFadeIn",
    "SoundFadeOutDurationUpdateCommand",
    "SetFadeOut",
    "SoundAudioBitrateUpdateCommand",
    "SetBitrate",
    "SoundPremiumSegmentsEnableCommand",
    "SetPremiumSegments",
    "PresetNameUpdateCommand",
    "SetPresetName",
];

impl ControlCommand {
    /// Parses and validates a raw control payload.
    ///
    /// An unknown `kind` and a known `kind` with bad fields are reported
    /// separately.
    pub fn parse(data: Value) -> ReceiverResult<Self> {
        let kind = match data.get("kind").and_then(Value::as_str) {
            Some(kind) if CONTROL_KINDS.contains(&kind) => kind.to_string(),
            Some(kind) => {
                return Err(ReceiverError::Protocol(format!(
                    "unrecognised command kind '{}'",
                    kind
                )))
            }
            None => return Err(ReceiverError::protocol("command without a kind")),
        };
        let command: Self = serde_json::from_value(data)
            .map_err(|e| ReceiverError::Protocol(format!("malformed {}: {}", kind, e)))?;
        command.validate()?;
        Ok(command)
    }

    /// The sound this command targets, if any.
    pub fn sound_id(&self) -> Option<&str> {
        match self {
            Self::Play { sound_id, .. }
            | Self::Pause { sound_id, .. }
            | Self::Stop { sound_id, .. }
            | Self::SetVolume { sound_id, .. }
            | Self::SetFadeIn { sound_id, .. }
            | Self::SetFadeOut { sound_id, .. }
            | Self::SetBitrate { sound_id, .. }
            | Self::SetPremiumSegments { sound_id, .. } => Some(sound_id),
            Self::SetPresetName { .. } => None,
        }
    }

    /// Returns `true` for the only command allowed to create a player.
    pub fn is_create(&self) -> bool {
        matches!(self, Self::Play { .. })
    }

    fn validate(&self) -> ReceiverResult<()> {
        let volume = match self {
            Self::Play {
                volume: Some(v), ..
            }
            | Self::SetVolume { volume: v, .. } => Some(*v),
            _ => None,
        };
        if let Some(v) = volume {
            if !v.is_finite() || !(0.0..=1.0).contains(&v) {
                return Err(ReceiverError::Protocol(format!(
                    "volume {} outside [0, 1]",
                    v
                )));
            }
        }

        if let Some("") = self.sound_id() {
            return Err(ReceiverError::protocol("empty soundId"));
        }

        if let Self::SetBitrate { bitrate, .. } = self {
            if bitrate.is_empty() {
                return Err(ReceiverError::protocol("empty bitrate"));
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Status (receiver -> sender)
// ─────────────────────────────────────────────────────────────────────────────

/// Updates written to the status namespace.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind")]
pub enum StatusEvent {
    /// Receiver-wide playback state changed.
    #[serde(rename_all = "camelCase")]
    GlobalStateChanged { state: PlaybackStatus, volume: f32 },

    /// One sound changed state.
    #[serde(rename_all = "camelCase")]
    SoundStateChanged {
        sound_id: String,
        state: PlaybackStatus,
        volume: f32,
    },

    /// The preset label shown on the receiver changed.
    #[serde(rename_all = "camelCase")]
    PresetNameChanged {
        #[serde(skip_serializing_if = "Option::is_none")]
        preset_name: Option<String>,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Auth (request/response)
// ─────────────────────────────────────────────────────────────────────────────

/// Requests written to the auth namespace.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind")]
pub enum AuthRequest {
    /// Asks the sender for a fresh access token. Carries no body.
    #[serde(rename = "AccessTokenRequest")]
    AccessToken,
}

/// Responses read from the auth namespace.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind")]
pub enum AuthResponse {
    /// The sender's answer. A missing token means "no credential available",
    /// which is a valid answer and not an error.
    #[serde(
        rename = "AccessTokenResponse",
        alias = "TokenResponse",
        rename_all = "camelCase"
    )]
    AccessToken {
        #[serde(default)]
        access_token: Option<String>,
    },
}

impl AuthResponse {
    /// Parses a raw auth payload, rejecting anything that is not a token
    /// response.
    pub fn parse(data: Value) -> ReceiverResult<Self> {
        if data.is_null() {
            return Err(ReceiverError::protocol("received access token response was null"));
        }
        serde_json::from_value(data)
            .map_err(|e| ReceiverError::Protocol(format!("malformed access token response: {}", e)))
    }

    /// Consumes the response, yielding the token if one was supplied.
    pub fn into_token(self) -> Option<String> {
        match self {
            Self::AccessToken { access_token } => access_token,
        }
    }
}

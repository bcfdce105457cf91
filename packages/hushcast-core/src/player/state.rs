//! Playback states for individual sounds and for the receiver as a whole.

use serde::{Deserialize, Serialize};

/// Lifecycle of one sound player.
///
/// ```text
/// Uninitialized -> Buffering -> Playing <-> Pausing -> Paused
///                      |           |                     |
///                      +-------> Stopping -> Stopped <---+
/// ```
///
/// `Stopped` is terminal: the registry drops the player in the same step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoundPlayerState {
    Uninitialized,
    Buffering,
    Playing,
    Pausing,
    Paused,
    Stopping,
    Stopped,
}

impl SoundPlayerState {
    /// Returns `true` while the sound can be heard (or is fading).
    #[must_use]
    pub fn is_audible(self) -> bool {
        matches!(self, Self::Playing | Self::Pausing | Self::Stopping)
    }

    /// Returns `true` for the terminal state.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self == Self::Stopped
    }

    /// Wire representation reported to the sender.
    #[must_use]
    pub fn status(self) -> PlaybackStatus {
        match self {
            Self::Uninitialized | Self::Buffering => PlaybackStatus::Loading,
            Self::Playing => PlaybackStatus::Playing,
            Self::Pausing => PlaybackStatus::Pausing,
            Self::Paused => PlaybackStatus::Paused,
            Self::Stopping => PlaybackStatus::Stopping,
            Self::Stopped => PlaybackStatus::Stopped,
        }
    }
}

/// State values understood by the sender's status UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackStatus {
    Loading,
    Playing,
    Pausing,
    Paused,
    Stopping,
    Stopped,
}

impl PlaybackStatus {
    /// Folds the states of every registered player into one receiver-wide
    /// status. Any buffering sound makes the receiver `loading`; otherwise the
    /// most active state wins. No players means `stopped`.
    pub fn aggregate<I>(states: I) -> Self
    where
        I: IntoIterator<Item = SoundPlayerState>,
    {
        let mut best = Self::Stopped;
        for state in states {
            let status = state.status();
            if status.rank() < best.rank() {
                best = status;
            }
        }
        best
    }

    fn rank(self) -> u8 {
        match self {
            Self::Loading => 0,
            Self::Playing => 1,
            Self::Pausing => 2,
            Self::Paused => 3,
            Self::Stopping => 4,
            Self::Stopped => 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_registry_aggregates_to_stopped() {
        assert_eq!(
            PlaybackStatus::aggregate(std::iter::empty()),
            PlaybackStatus::Stopped
        );
    }

    #[test]
    fn buffering_dominates_aggregate() {
        let states = [
            SoundPlayerState::Playing,
            SoundPlayerState::Buffering,
            SoundPlayerState::Paused,
        ];
        assert_eq!(PlaybackStatus::aggregate(states), PlaybackStatus::Loading);
    }

    #[test]
    fn playing_beats_paused_and_stopping() {
        let states = [
            SoundPlayerState::Stopping,
            SoundPlayerState::Paused,
            SoundPlayerState::Playing,
        ];
        assert_eq!(PlaybackStatus::aggregate(states), PlaybackStatus::Playing);
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&PlaybackStatus::Pausing).unwrap();
        assert_eq!(json, "\"pausing\"");
    }
}

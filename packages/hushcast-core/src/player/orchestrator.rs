//! Registry of sound players for one session.
//!
//! The [`Orchestrator`] routes control commands to players, creates a player
//! the first time a sound is started, drops it the moment it reaches
//! `Stopped`, and keeps the idle timer armed exactly while the registry is
//! empty.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use super::audio::{AudioBackend, AudioSignal, SegmentPolicy, SignalSink};
use super::idle::IdleTimer;
use super::sound_player::{PlayerOptions, SoundPlayer};
use super::state::{PlaybackStatus, SoundPlayerState};
use crate::channel::messages::ControlCommand;

/// Change reported to the state listener.
#[derive(Debug, Clone, PartialEq)]
pub enum StateChange {
    /// One player moved to `state`.
    Sound {
        sound_id: String,
        state: SoundPlayerState,
        volume: f32,
    },
    /// The receiver-wide aggregate changed.
    Global { state: PlaybackStatus, volume: f32 },
}

/// Receives every [`StateChange`]. Runs on the session loop.
pub type StateListener = Box<dyn FnMut(&StateChange) + Send>;

/// Settings applied to every newly created player.
#[derive(Debug, Clone)]
pub struct PlayerDefaults {
    pub volume: f32,
    pub fade_in: Duration,
    pub fade_out: Duration,
    pub bitrate: String,
    pub premium_enabled: bool,
}

/// Read-only view of one registered player.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSnapshot {
    pub sound_id: String,
    pub state: SoundPlayerState,
    pub volume: f32,
}

pub struct Orchestrator {
    players: HashMap<String, SoundPlayer>,
    backend: Arc<dyn AudioBackend>,
    signals: SignalSink,
    listener: Option<StateListener>,
    idle: IdleTimer,
    defaults: PlayerDefaults,
    next_instance: u64,
    global: (PlaybackStatus, f32),
}

impl Orchestrator {
    /// Creates an empty registry. The idle timer starts armed.
    pub fn new(
        backend: Arc<dyn AudioBackend>,
        signals: SignalSink,
        defaults: PlayerDefaults,
        idle_window: Duration,
    ) -> Self {
        let mut idle = IdleTimer::new(idle_window);
        idle.arm();
        Self {
            players: HashMap::new(),
            backend,
            signals,
            listener: None,
            idle,
            defaults,
            next_instance: 1,
            global: (PlaybackStatus::Stopped, 0.0),
        }
    }

    /// Installs the state listener, replacing any previous one. `None`
    /// removes it.
    pub fn set_state_listener(&mut self, listener: Option<StateListener>) {
        self.listener = listener;
    }

    pub fn has_state_listener(&self) -> bool {
        self.listener.is_some()
    }

    /// Routes one control command.
    ///
    /// Commands for unknown sounds are dropped unless they start the sound.
    pub fn dispatch(&mut self, command: ControlCommand) {
        let (sound_id, changed) = match command {
            ControlCommand::Play {
                sound_id,
                volume,
                is_looping,
            } => {
                let changed = self.play(&sound_id, volume, is_looping.unwrap_or(true));
                (sound_id, changed)
            }
            ControlCommand::SetPresetName { .. } => {
                log::trace!("[Orchestrator] Preset name is not routed to players");
                return;
            }
            other => {
                let Some(sound_id) = other.sound_id().map(str::to_string) else {
                    return;
                };
                if !self.players.contains_key(&sound_id) {
                    log::debug!(
                        "[Orchestrator] Dropping command for unknown sound {}",
                        sound_id
                    );
                    return;
                }
                let changed = match self.players.get_mut(&sound_id) {
                    Some(player) => Self::apply(player, other),
                    None => Vec::new(),
                };
                (sound_id, changed)
            }
        };

        self.settle(sound_id, changed);
    }

    /// Feeds an audio signal to the player it belongs to.
    pub fn handle_signal(&mut self, signal: AudioSignal) {
        let AudioSignal {
            sound_id,
            instance,
            event,
        } = signal;

        let Some(player) = self.players.get_mut(&sound_id) else {
            log::trace!("[Orchestrator] Signal for departed sound {}", sound_id);
            return;
        };
        if player.instance() != instance {
            log::trace!(
                "[Orchestrator] Stale signal for {} (instance {})",
                sound_id,
                instance
            );
            return;
        }

        let changed = player.handle_event(event).into_iter().collect();
        self.settle(sound_id, changed);
    }

    /// Stops every player immediately, ignoring fade settings.
    pub fn stop(&mut self) {
        if self.players.is_empty() {
            return;
        }
        log::info!("[Orchestrator] Stopping {} sound(s)", self.players.len());

        let mut stopped = Vec::with_capacity(self.players.len());
        for (sound_id, mut player) in self.players.drain() {
            if player.stop(true).is_some() {
                stopped.push(StateChange::Sound {
                    sound_id,
                    state: SoundPlayerState::Stopped,
                    volume: player.volume(),
                });
            }
        }

        self.sync_idle();
        for change in &stopped {
            self.notify(change);
        }
        self.notify_global();
    }

    /// Returns `true` when no player is registered.
    pub fn is_idle(&self) -> bool {
        self.players.is_empty()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn state_of(&self, sound_id: &str) -> Option<SoundPlayerState> {
        self.players.get(sound_id).map(SoundPlayer::state)
    }

    pub fn snapshot(&self) -> Vec<PlayerSnapshot> {
        let mut players: Vec<_> = self
            .players
            .values()
            .map(|p| PlayerSnapshot {
                sound_id: p.sound_id().to_string(),
                state: p.state(),
                volume: p.volume(),
            })
            .collect();
        players.sort_by(|a, b| a.sound_id.cmp(&b.sound_id));
        players
    }

    /// Aggregate state and mean volume of every registered player.
    pub fn global_state(&self) -> (PlaybackStatus, f32) {
        let state = PlaybackStatus::aggregate(self.players.values().map(SoundPlayer::state));
        let volume = if self.players.is_empty() {
            0.0
        } else {
            self.players.values().map(SoundPlayer::volume).sum::<f32>()
                / self.players.len() as f32
        };
        (state, volume)
    }

    pub fn is_idle_timer_armed(&self) -> bool {
        self.idle.is_armed()
    }

    /// When the idle timer fires, if armed.
    pub fn idle_deadline(&self) -> Option<Instant> {
        self.idle.deadline()
    }

    /// Disarms the idle timer for good. Used once the session is closing.
    pub fn disarm_idle(&mut self) {
        self.idle.disarm();
    }

    fn play(
        &mut self,
        sound_id: &str,
        volume: Option<f32>,
        looping: bool,
    ) -> Vec<SoundPlayerState> {
        let mut changed = Vec::new();

        if !self.players.contains_key(sound_id) {
            let instance = self.next_instance;
            self.next_instance += 1;

            let mut player = SoundPlayer::new(
                sound_id,
                instance,
                PlayerOptions {
                    volume: volume.unwrap_or(self.defaults.volume),
                    looping,
                    fade_in: self.defaults.fade_in,
                    fade_out: self.defaults.fade_out,
                    policy: SegmentPolicy {
                        bitrate: self.defaults.bitrate.clone(),
                        premium_enabled: self.defaults.premium_enabled,
                    },
                },
            );
            log::info!("[Orchestrator] Creating player for {}", sound_id);
            changed.extend(player.create(self.backend.as_ref(), self.signals.clone()));
            self.players.insert(sound_id.to_string(), player);
        } else if let (Some(volume), Some(player)) = (volume, self.players.get_mut(sound_id)) {
            player.set_volume(volume);
        }

        if let Some(player) = self.players.get_mut(sound_id) {
            changed.extend(player.play());
        }
        changed
    }

    fn apply(player: &mut SoundPlayer, command: ControlCommand) -> Vec<SoundPlayerState> {
        let changed = match command {
            ControlCommand::Pause { immediate, .. } => player.pause(immediate),
            ControlCommand::Stop { immediate, .. } => player.stop(immediate),
            ControlCommand::SetVolume { volume, .. } => {
                player.set_volume(volume);
                None
            }
            ControlCommand::SetFadeIn {
                duration_millis, ..
            } => {
                player.set_fade_in(Duration::from_millis(duration_millis));
                None
            }
            ControlCommand::SetFadeOut {
                duration_millis, ..
            } => {
                player.set_fade_out(Duration::from_millis(duration_millis));
                None
            }
            ControlCommand::SetBitrate { bitrate, .. } => {
                player.set_audio_bitrate(bitrate);
                None
            }
            ControlCommand::SetPremiumSegments { is_enabled, .. } => {
                player.set_premium_segments_enabled(is_enabled);
                None
            }
            ControlCommand::Play { .. } | ControlCommand::SetPresetName { .. } => None,
        };
        changed.into_iter().collect()
    }

    /// Applies registry bookkeeping for `sound_id`'s transitions, then tells
    /// the listener.
    fn settle(&mut self, sound_id: String, changed: Vec<SoundPlayerState>) {
        let volume = self
            .players
            .get(&sound_id)
            .map_or(0.0, SoundPlayer::volume);
        if changed.iter().any(|s| s.is_terminal()) {
            self.players.remove(&sound_id);
            log::info!("[Orchestrator] Removed player for {}", sound_id);
        }

        self.sync_idle();

        for state in changed {
            self.notify(&StateChange::Sound {
                sound_id: sound_id.clone(),
                state,
                volume,
            });
        }
        self.notify_global();
    }

    /// Arms when the registry has just emptied, disarms when it has just
    /// gained a player. An armed deadline is never pushed back.
    fn sync_idle(&mut self) {
        match (self.players.is_empty(), self.idle.is_armed()) {
            (true, false) => self.idle.arm(),
            (false, true) => self.idle.disarm(),
            _ => {}
        }
    }

    fn notify_global(&mut self) {
        let global = self.global_state();
        if global == self.global {
            return;
        }
        self.global = global;
        self.notify(&StateChange::Global {
            state: global.0,
            volume: global.1,
        });
    }

    fn notify(&mut self, change: &StateChange) {
        if let Some(listener) = self.listener.as_mut() {
            listener(change);
        }
    }
}

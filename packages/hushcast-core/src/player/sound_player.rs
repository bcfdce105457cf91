//! State machine for one sound.
//!
//! A [`SoundPlayer`] owns its audio handle and applies fades around play,
//! pause and stop. Every method returns the state it moved to (if any) so the
//! registry can update itself before telling anyone about the change.

use std::time::Duration;

use super::audio::{AudioBackend, AudioEvent, AudioHandle, LoadRequest, SegmentPolicy, SignalSink};
use super::state::SoundPlayerState;
use crate::error::ReceiverError;

/// Settings a new player starts with.
#[derive(Debug, Clone)]
pub struct PlayerOptions {
    pub volume: f32,
    pub looping: bool,
    pub fade_in: Duration,
    pub fade_out: Duration,
    pub policy: SegmentPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FadePurpose {
    FadeIn,
    Volume,
    Pause,
    Stop,
}

#[derive(Debug, Clone, Copy)]
struct ActiveFade {
    token: u64,
    purpose: FadePurpose,
}

pub struct SoundPlayer {
    sound_id: String,
    instance: u64,
    state: SoundPlayerState,
    /// Configured target volume. Fades and pauses never change it.
    volume: f32,
    looping: bool,
    fade_in: Duration,
    fade_out: Duration,
    policy: SegmentPolicy,
    handle: Option<Box<dyn AudioHandle>>,
    ready: bool,
    play_requested: bool,
    fade: Option<ActiveFade>,
    next_fade_token: u64,
}

impl SoundPlayer {
    pub fn new(sound_id: impl Into<String>, instance: u64, options: PlayerOptions) -> Self {
        Self {
            sound_id: sound_id.into(),
            instance,
            state: SoundPlayerState::Uninitialized,
            volume: options.volume,
            looping: options.looping,
            fade_in: options.fade_in,
            fade_out: options.fade_out,
            policy: options.policy,
            handle: None,
            ready: false,
            play_requested: false,
            fade: None,
            next_fade_token: 1,
        }
    }

    pub fn sound_id(&self) -> &str {
        &self.sound_id
    }

    pub fn instance(&self) -> u64 {
        self.instance
    }

    pub fn state(&self) -> SoundPlayerState {
        self.state
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn fade_in(&self) -> Duration {
        self.fade_in
    }

    pub fn fade_out(&self) -> Duration {
        self.fade_out
    }

    pub fn policy(&self) -> &SegmentPolicy {
        &self.policy
    }

    /// Allocates the audio handle, paused and pre-loading.
    pub fn create(
        &mut self,
        backend: &dyn AudioBackend,
        signals: SignalSink,
    ) -> Option<SoundPlayerState> {
        if self.state != SoundPlayerState::Uninitialized {
            return None;
        }

        let mut handle = backend.load(
            LoadRequest {
                sound_id: self.sound_id.clone(),
                instance: self.instance,
                looping: self.looping,
                policy: self.policy.clone(),
            },
            signals,
        );
        handle.set_volume(self.volume);
        self.handle = Some(handle);
        self.transition(SoundPlayerState::Buffering)
    }

    pub fn play(&mut self) -> Option<SoundPlayerState> {
        match self.state {
            SoundPlayerState::Buffering if self.ready => self.start_playback(),
            SoundPlayerState::Buffering => {
                self.play_requested = true;
                None
            }
            SoundPlayerState::Paused => self.start_playback(),
            SoundPlayerState::Pausing => {
                let current = self.current_volume();
                self.ramp(current, self.volume, self.fade_in, FadePurpose::Volume);
                self.transition(SoundPlayerState::Playing)
            }
            SoundPlayerState::Uninitialized
            | SoundPlayerState::Playing
            | SoundPlayerState::Stopping
            | SoundPlayerState::Stopped => None,
        }
    }

    pub fn pause(&mut self, immediate: bool) -> Option<SoundPlayerState> {
        match self.state {
            SoundPlayerState::Buffering => {
                self.play_requested = false;
                None
            }
            SoundPlayerState::Playing => {
                let current = self.current_volume();
                if !immediate && self.ramp(current, 0.0, self.fade_out, FadePurpose::Pause) {
                    self.transition(SoundPlayerState::Pausing)
                } else {
                    self.finish_pause()
                }
            }
            SoundPlayerState::Pausing if immediate => self.finish_pause(),
            _ => None,
        }
    }

    pub fn stop(&mut self, immediate: bool) -> Option<SoundPlayerState> {
        match self.state {
            SoundPlayerState::Stopped => None,
            _ if immediate => self.release(),
            SoundPlayerState::Playing | SoundPlayerState::Pausing => {
                let current = self.current_volume();
                if self.ramp(current, 0.0, self.fade_out, FadePurpose::Stop) {
                    self.transition(SoundPlayerState::Stopping)
                } else {
                    self.release()
                }
            }
            SoundPlayerState::Stopping => None,
            SoundPlayerState::Uninitialized
            | SoundPlayerState::Buffering
            | SoundPlayerState::Paused => self.release(),
        }
    }

    /// Ramps to `volume` while playing, otherwise applies it at once. Fades
    /// towards silence (pausing, stopping) are left alone.
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
        match self.state {
            SoundPlayerState::Playing => {
                let current = self.current_volume();
                self.ramp(current, volume, self.fade_out, FadePurpose::Volume);
            }
            SoundPlayerState::Buffering | SoundPlayerState::Paused => {
                if let Some(handle) = self.handle.as_mut() {
                    handle.set_volume(volume);
                }
            }
            _ => {}
        }
    }

    pub fn set_fade_in(&mut self, duration: Duration) {
        self.fade_in = duration;
    }

    pub fn set_fade_out(&mut self, duration: Duration) {
        self.fade_out = duration;
    }

    pub fn set_premium_segments_enabled(&mut self, enabled: bool) {
        self.policy.premium_enabled = enabled;
    }

    pub fn set_audio_bitrate(&mut self, bitrate: impl Into<String>) {
        self.policy.bitrate = bitrate.into();
    }

    /// Feeds an asynchronous outcome from the audio handle.
    pub fn handle_event(&mut self, event: AudioEvent) -> Option<SoundPlayerState> {
        match event {
            AudioEvent::Ready => self.on_ready(),
            AudioEvent::FadeComplete { token } => self.on_fade_complete(token),
            AudioEvent::Ended => {
                log::debug!("[SoundPlayer] {} reached its end", self.sound_id);
                self.release()
            }
            AudioEvent::Failed(e) => self.on_failure(e),
        }
    }

    fn on_ready(&mut self) -> Option<SoundPlayerState> {
        if self.ready {
            return None;
        }
        self.ready = true;
        if self.state == SoundPlayerState::Buffering && self.play_requested {
            self.start_playback()
        } else {
            None
        }
    }

    fn on_fade_complete(&mut self, token: u64) -> Option<SoundPlayerState> {
        let fade = match self.fade {
            Some(fade) if fade.token == token => fade,
            _ => {
                log::trace!("[SoundPlayer] Stale fade {} on {}", token, self.sound_id);
                return None;
            }
        };
        self.fade = None;

        match fade.purpose {
            FadePurpose::FadeIn | FadePurpose::Volume => None,
            FadePurpose::Pause => self.finish_pause(),
            FadePurpose::Stop => self.release(),
        }
    }

    fn on_failure(&mut self, error: ReceiverError) -> Option<SoundPlayerState> {
        if error.is_premium_gated() {
            log::warn!(
                "[SoundPlayer] {} needs premium segments the sender is not entitled to",
                self.sound_id
            );
        } else {
            log::warn!("[SoundPlayer] {} failed: {}", self.sound_id, error);
        }
        self.release()
    }

    fn start_playback(&mut self) -> Option<SoundPlayerState> {
        self.play_requested = false;
        let Some(handle) = self.handle.as_mut() else {
            return None;
        };

        handle.set_segment_policy(&self.policy);
        if self.looping {
            handle.set_volume(0.0);
            handle.play();
            self.ramp(0.0, self.volume, self.fade_in, FadePurpose::FadeIn);
        } else {
            handle.set_volume(self.volume);
            handle.play();
        }
        self.transition(SoundPlayerState::Playing)
    }

    fn finish_pause(&mut self) -> Option<SoundPlayerState> {
        self.fade = None;
        if let Some(handle) = self.handle.as_mut() {
            handle.pause();
            handle.set_volume(self.volume);
        }
        self.transition(SoundPlayerState::Paused)
    }

    fn release(&mut self) -> Option<SoundPlayerState> {
        self.fade = None;
        self.play_requested = false;
        if let Some(mut handle) = self.handle.take() {
            handle.unload();
        }
        self.transition(SoundPlayerState::Stopped)
    }

    /// Starts a fade, or snaps to `to` when `duration` is zero. Returns
    /// `true` if a fade is now running.
    fn ramp(&mut self, from: f32, to: f32, duration: Duration, purpose: FadePurpose) -> bool {
        let Some(handle) = self.handle.as_mut() else {
            self.fade = None;
            return false;
        };

        if duration.is_zero() {
            self.fade = None;
            handle.set_volume(to);
            return false;
        }

        let token = self.next_fade_token;
        self.next_fade_token += 1;
        handle.fade(from, to, duration, token);
        self.fade = Some(ActiveFade { token, purpose });
        true
    }

    fn current_volume(&self) -> f32 {
        self.handle
            .as_ref()
            .map_or(self.volume, |handle| handle.volume())
    }

    fn transition(&mut self, next: SoundPlayerState) -> Option<SoundPlayerState> {
        if self.state == next {
            return None;
        }
        log::debug!(
            "[SoundPlayer] {} {:?} -> {:?}",
            self.sound_id,
            self.state,
            next
        );
        self.state = next;
        Some(next)
    }
}

impl Drop for SoundPlayer {
    fn drop(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.unload();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::test_fixtures::{AudioOp, RecordingBackend};
    use tokio::sync::mpsc;

    const SECOND: Duration = Duration::from_secs(1);

    fn options(volume: f32, looping: bool) -> PlayerOptions {
        PlayerOptions {
            volume,
            looping,
            fade_in: SECOND,
            fade_out: SECOND,
            policy: SegmentPolicy {
                bitrate: "128k".into(),
                premium_enabled: false,
            },
        }
    }

    fn created(volume: f32, looping: bool) -> (SoundPlayer, RecordingBackend) {
        let backend = RecordingBackend::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut player = SoundPlayer::new("rain", 1, options(volume, looping));
        assert_eq!(
            player.create(&backend, tx),
            Some(SoundPlayerState::Buffering)
        );
        (player, backend)
    }

    fn playing(volume: f32) -> (SoundPlayer, RecordingBackend) {
        let (mut player, backend) = created(volume, true);
        player.play();
        assert_eq!(
            player.handle_event(AudioEvent::Ready),
            Some(SoundPlayerState::Playing)
        );
        let token = backend.last_fade_token("rain").unwrap();
        player.handle_event(AudioEvent::FadeComplete { token });
        backend.clear();
        (player, backend)
    }

    #[test]
    fn play_waits_for_readiness_then_fades_in() {
        let (mut player, backend) = created(0.5, true);

        assert_eq!(player.play(), None);
        assert_eq!(player.state(), SoundPlayerState::Buffering);

        assert_eq!(
            player.handle_event(AudioEvent::Ready),
            Some(SoundPlayerState::Playing)
        );
        assert_eq!(
            backend.fades("rain"),
            vec![AudioOp::Fade {
                from: 0.0,
                to: 0.5,
                duration: SECOND,
                token: 1
            }]
        );
        assert!(backend.ops("rain").contains(&AudioOp::Play));
    }

    #[test]
    fn one_shot_sound_starts_at_full_volume() {
        let (mut player, backend) = created(0.7, false);
        player.play();
        player.handle_event(AudioEvent::Ready);

        assert!(backend.fades("rain").is_empty());
        let ops = backend.ops("rain");
        assert_eq!(ops[ops.len() - 2], AudioOp::SetVolume(0.7));
        assert_eq!(ops[ops.len() - 1], AudioOp::Play);
    }

    #[test]
    fn play_while_playing_is_a_noop() {
        let (mut player, backend) = playing(0.5);
        assert_eq!(player.play(), None);
        assert!(backend.ops("rain").is_empty());
    }

    #[test]
    fn pause_fades_out_then_restores_volume() {
        let (mut player, backend) = playing(0.5);

        assert_eq!(player.pause(false), Some(SoundPlayerState::Pausing));
        let token = backend.last_fade_token("rain").unwrap();
        assert_eq!(
            backend.fades("rain"),
            vec![AudioOp::Fade {
                from: 0.5,
                to: 0.0,
                duration: SECOND,
                token
            }]
        );

        assert_eq!(
            player.handle_event(AudioEvent::FadeComplete { token }),
            Some(SoundPlayerState::Paused)
        );
        let ops = backend.ops("rain");
        assert_eq!(&ops[ops.len() - 2..], &[AudioOp::Pause, AudioOp::SetVolume(0.5)]);
        assert_eq!(player.volume(), 0.5);
    }

    #[test]
    fn immediate_pause_skips_fade() {
        let (mut player, backend) = playing(0.5);
        assert_eq!(player.pause(true), Some(SoundPlayerState::Paused));
        assert!(backend.fades("rain").is_empty());
    }

    #[test]
    fn immediate_pause_cuts_running_fade_short() {
        let (mut player, _backend) = playing(0.5);
        player.pause(false);
        assert_eq!(player.pause(true), Some(SoundPlayerState::Paused));
    }

    #[test]
    fn pause_while_buffering_withdraws_play_request() {
        let (mut player, backend) = created(0.5, true);
        player.play();
        assert_eq!(player.pause(false), None);

        assert_eq!(player.handle_event(AudioEvent::Ready), None);
        assert_eq!(player.state(), SoundPlayerState::Buffering);
        assert!(!backend.ops("rain").contains(&AudioOp::Play));

        assert_eq!(player.play(), Some(SoundPlayerState::Playing));
    }

    #[test]
    fn play_during_pause_fade_ramps_back_up() {
        let (mut player, backend) = playing(0.5);
        player.pause(false);
        let pause_token = backend.last_fade_token("rain").unwrap();

        assert_eq!(player.play(), Some(SoundPlayerState::Playing));
        // The superseded fade-out must not complete the pause.
        assert_eq!(
            player.handle_event(AudioEvent::FadeComplete { token: pause_token }),
            None
        );
        assert_eq!(player.state(), SoundPlayerState::Playing);
    }

    #[test]
    fn resume_from_paused_fades_in_and_pushes_policy() {
        let (mut player, backend) = playing(0.5);
        player.pause(true);
        player.set_audio_bitrate("320k");
        player.set_premium_segments_enabled(true);
        backend.clear();

        assert_eq!(player.play(), Some(SoundPlayerState::Playing));
        let ops = backend.ops("rain");
        assert_eq!(
            ops[0],
            AudioOp::Policy(SegmentPolicy {
                bitrate: "320k".into(),
                premium_enabled: true
            })
        );
        assert_eq!(backend.fades("rain").len(), 1);
    }

    #[test]
    fn stop_fades_out_then_releases() {
        let (mut player, backend) = playing(0.5);

        assert_eq!(player.stop(false), Some(SoundPlayerState::Stopping));
        assert_eq!(player.play(), None, "play is ignored while stopping");

        let token = backend.last_fade_token("rain").unwrap();
        assert_eq!(
            player.handle_event(AudioEvent::FadeComplete { token }),
            Some(SoundPlayerState::Stopped)
        );
        assert_eq!(backend.ops("rain").last(), Some(&AudioOp::Unload));
    }

    #[test]
    fn immediate_stop_goes_straight_to_stopped() {
        let (mut player, backend) = playing(0.5);
        assert_eq!(player.stop(true), Some(SoundPlayerState::Stopped));
        assert!(backend.fades("rain").is_empty());
        assert_eq!(player.stop(true), None);
    }

    #[test]
    fn immediate_stop_releases_during_stop_fade() {
        let (mut player, backend) = playing(0.5);
        player.stop(false);
        assert_eq!(player.stop(true), Some(SoundPlayerState::Stopped));
        assert_eq!(backend.ops("rain").last(), Some(&AudioOp::Unload));
    }

    #[test]
    fn stop_while_buffering_releases_at_once() {
        let (mut player, backend) = created(0.5, true);
        assert_eq!(player.stop(false), Some(SoundPlayerState::Stopped));
        assert_eq!(backend.ops("rain").last(), Some(&AudioOp::Unload));
    }

    #[test]
    fn set_volume_ramps_while_playing_and_snaps_otherwise() {
        let (mut player, backend) = playing(0.5);
        player.set_volume(0.8);
        assert_eq!(
            backend.fades("rain"),
            vec![AudioOp::Fade {
                from: 0.5,
                to: 0.8,
                duration: SECOND,
                token: 2
            }]
        );

        player.pause(true);
        backend.clear();
        player.set_volume(0.2);
        assert!(backend.fades("rain").is_empty());
        assert_eq!(backend.ops("rain"), vec![AudioOp::SetVolume(0.2)]);
    }

    #[test]
    fn zero_fade_out_pauses_without_ramp() {
        let (mut player, backend) = playing(0.5);
        player.set_fade_out(Duration::ZERO);
        assert_eq!(player.pause(false), Some(SoundPlayerState::Paused));
        assert!(backend.fades("rain").is_empty());
    }

    #[test]
    fn fade_configuration_does_not_touch_running_fade() {
        let (mut player, backend) = playing(0.5);
        player.pause(false);
        let token = backend.last_fade_token("rain").unwrap();
        backend.clear();

        player.set_fade_out(Duration::from_secs(5));
        player.set_fade_in(Duration::from_secs(5));
        assert!(backend.ops("rain").is_empty());
        assert_eq!(
            player.handle_event(AudioEvent::FadeComplete { token }),
            Some(SoundPlayerState::Paused)
        );
        assert_eq!(player.fade_out(), Duration::from_secs(5));
    }

    #[test]
    fn failure_releases_the_player() {
        let (mut player, backend) = playing(0.5);
        let state = player.handle_event(AudioEvent::Failed(ReceiverError::ResourceUnavailable {
            status: 403,
            path: "library/segments/rain/128k/index.m3u8".into(),
        }));
        assert_eq!(state, Some(SoundPlayerState::Stopped));
        assert_eq!(backend.ops("rain").last(), Some(&AudioOp::Unload));
    }

    #[test]
    fn duplicate_readiness_is_ignored() {
        let (mut player, _backend) = playing(0.5);
        assert_eq!(player.handle_event(AudioEvent::Ready), None);
    }
}

//! Seam between sound players and whatever renders audio.
//!
//! Handles are driven synchronously from the session loop. Anything that
//! completes later (readiness, the end of a fade, a failed fetch) is reported
//! back as an [`AudioSignal`] on the sink passed to [`AudioBackend::load`].

use std::time::Duration;

use tokio::sync::mpsc;

use crate::error::ReceiverError;

/// Which variant of a sound's segments to stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentPolicy {
    pub bitrate: String,
    pub premium_enabled: bool,
}

/// Everything a backend needs to prepare one sound.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub sound_id: String,
    /// Distinguishes players re-created for the same sound id.
    pub instance: u64,
    pub looping: bool,
    pub policy: SegmentPolicy,
}

/// Asynchronous outcome reported by an audio handle.
#[derive(Debug)]
pub enum AudioEvent {
    /// Pre-loading finished; playback can start without delay. Sent once.
    Ready,
    /// The fade started with this token reached its target volume.
    FadeComplete { token: u64 },
    /// A non-looping sound played to its end.
    Ended,
    /// The handle cannot continue (segment fetch failed, auth rejected, ...).
    Failed(ReceiverError),
}

/// An [`AudioEvent`] addressed to one player instance.
#[derive(Debug)]
pub struct AudioSignal {
    pub sound_id: String,
    pub instance: u64,
    pub event: AudioEvent,
}

/// Where handles report their [`AudioSignal`]s.
pub type SignalSink = mpsc::UnboundedSender<AudioSignal>;

/// Creates audio handles.
pub trait AudioBackend: Send + Sync {
    /// Allocates a handle for `request`, not playing, and starts pre-loading.
    fn load(&self, request: LoadRequest, signals: SignalSink) -> Box<dyn AudioHandle>;
}

/// One loaded sound.
///
/// Volumes are linear gains in `[0, 1]`.
pub trait AudioHandle: Send {
    fn play(&mut self);

    fn pause(&mut self);

    /// Sets the volume at once, cancelling any running fade.
    fn set_volume(&mut self, volume: f32);

    /// Current output volume, including partway through a fade.
    fn volume(&self) -> f32;

    /// Ramps `from -> to` over `duration`, replacing any running fade, and
    /// reports [`AudioEvent::FadeComplete`] with `token` when done.
    fn fade(&mut self, from: f32, to: f32, duration: Duration, token: u64);

    /// Applies to segments fetched from now on.
    fn set_segment_policy(&mut self, policy: &SegmentPolicy);

    /// Frees everything the handle holds. No signals follow.
    fn unload(&mut self);
}

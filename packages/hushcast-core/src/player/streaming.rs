//! Audio backend that streams a sound's segments from the CDN.
//!
//! Each handle runs one task that fetches the playlist, pre-loads the first
//! segment, reports readiness, and then paces through the segments in real
//! time while playing. Decoding and output are left to the host; the handle
//! tracks volume and fades so the rest of the runtime sees the same timing a
//! rendering backend would produce.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::audio::{
    AudioBackend, AudioEvent, AudioHandle, AudioSignal, LoadRequest, SegmentPolicy, SignalSink,
};
use crate::cdn::{Playlist, SegmentSource};

/// Creates [`StreamingHandle`]s backed by a shared [`SegmentSource`].
pub struct StreamingBackend {
    source: Arc<SegmentSource>,
}

impl StreamingBackend {
    pub fn new(source: Arc<SegmentSource>) -> Self {
        Self { source }
    }
}

impl AudioBackend for StreamingBackend {
    fn load(&self, request: LoadRequest, signals: SignalSink) -> Box<dyn AudioHandle> {
        let (control, control_rx) = watch::channel(StreamControl {
            playing: false,
            policy: request.policy.clone(),
        });
        let emitter = Emitter {
            sound_id: request.sound_id.clone(),
            instance: request.instance,
            signals,
        };

        let stream = tokio::spawn(stream_segments(
            Arc::clone(&self.source),
            request.sound_id.clone(),
            request.looping,
            control_rx,
            emitter.clone(),
        ));

        Box::new(StreamingHandle {
            emitter,
            control,
            ramp: Ramp::fixed(1.0),
            fade: None,
            stream: Some(stream),
        })
    }
}

#[derive(Debug, Clone)]
struct StreamControl {
    playing: bool,
    policy: SegmentPolicy,
}

#[derive(Clone)]
struct Emitter {
    sound_id: String,
    instance: u64,
    signals: SignalSink,
}

impl Emitter {
    fn emit(&self, event: AudioEvent) {
        let _ = self.signals.send(AudioSignal {
            sound_id: self.sound_id.clone(),
            instance: self.instance,
            event,
        });
    }
}

/// Linear volume ramp; a fixed volume is a ramp of zero length.
#[derive(Debug, Clone, Copy)]
struct Ramp {
    from: f32,
    to: f32,
    started: Instant,
    duration: Duration,
}

impl Ramp {
    fn fixed(volume: f32) -> Self {
        Self {
            from: volume,
            to: volume,
            started: Instant::now(),
            duration: Duration::ZERO,
        }
    }

    fn value(&self) -> f32 {
        if self.duration.is_zero() {
            return self.to;
        }
        let progress =
            (self.started.elapsed().as_secs_f32() / self.duration.as_secs_f32()).min(1.0);
        self.from + (self.to - self.from) * progress
    }
}

pub struct StreamingHandle {
    emitter: Emitter,
    control: watch::Sender<StreamControl>,
    ramp: Ramp,
    fade: Option<JoinHandle<()>>,
    stream: Option<JoinHandle<()>>,
}

impl StreamingHandle {
    fn cancel_fade(&mut self) {
        if let Some(fade) = self.fade.take() {
            fade.abort();
        }
    }
}

impl AudioHandle for StreamingHandle {
    fn play(&mut self) {
        self.control.send_modify(|c| c.playing = true);
    }

    fn pause(&mut self) {
        self.control.send_modify(|c| c.playing = false);
    }

    fn set_volume(&mut self, volume: f32) {
        self.cancel_fade();
        self.ramp = Ramp::fixed(volume);
    }

    fn volume(&self) -> f32 {
        self.ramp.value()
    }

    fn fade(&mut self, from: f32, to: f32, duration: Duration, token: u64) {
        self.cancel_fade();
        self.ramp = Ramp {
            from,
            to,
            started: Instant::now(),
            duration,
        };

        let emitter = self.emitter.clone();
        self.fade = Some(tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            emitter.emit(AudioEvent::FadeComplete { token });
        }));
    }

    fn set_segment_policy(&mut self, policy: &SegmentPolicy) {
        self.control.send_modify(|c| c.policy = policy.clone());
    }

    fn unload(&mut self) {
        self.cancel_fade();
        if let Some(stream) = self.stream.take() {
            stream.abort();
            log::debug!("[Stream] Unloaded {}", self.emitter.sound_id);
        }
    }
}

impl Drop for StreamingHandle {
    fn drop(&mut self) {
        self.unload();
    }
}

async fn stream_segments(
    source: Arc<SegmentSource>,
    sound_id: String,
    looping: bool,
    mut control: watch::Receiver<StreamControl>,
    emitter: Emitter,
) {
    let mut policy = control.borrow().policy.clone();
    let mut playlist = match load_playlist(&source, &sound_id, &policy).await {
        Ok(playlist) => playlist,
        Err(e) => {
            emitter.emit(AudioEvent::Failed(e));
            return;
        }
    };
    emitter.emit(AudioEvent::Ready);

    // The first segment was pre-loaded with the playlist.
    let mut index = 0;
    let mut buffered = true;
    loop {
        if control.wait_for(|c| c.playing).await.map(|_| ()).is_err() {
            return;
        }

        let wanted = control.borrow().policy.clone();
        if wanted != policy {
            log::info!(
                "[Stream] {} switching to {} (premium: {})",
                sound_id,
                wanted.bitrate,
                wanted.premium_enabled
            );
            policy = wanted;
            match source.fetch_playlist(&sound_id, &policy).await {
                Ok(p) => {
                    index %= p.len();
                    playlist = p;
                    buffered = false;
                }
                Err(e) => {
                    emitter.emit(AudioEvent::Failed(e));
                    return;
                }
            }
        }

        let segment = &playlist.segments[index];
        if !buffered {
            if let Err(e) = source.fetch_segment(&sound_id, &policy, segment).await {
                emitter.emit(AudioEvent::Failed(e));
                return;
            }
        }
        buffered = false;

        tokio::time::sleep(segment.duration).await;

        index += 1;
        if index == playlist.len() {
            if !looping {
                emitter.emit(AudioEvent::Ended);
                return;
            }
            index = 0;
        }
    }
}

async fn load_playlist(
    source: &SegmentSource,
    sound_id: &str,
    policy: &SegmentPolicy,
) -> crate::error::ReceiverResult<Playlist> {
    let playlist = source.fetch_playlist(sound_id, policy).await?;
    source
        .fetch_segment(sound_id, policy, &playlist.segments[0])
        .await?;
    Ok(playlist)
}

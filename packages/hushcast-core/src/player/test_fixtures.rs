//! Recording audio backend shared by player and session tests.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::audio::{
    AudioBackend, AudioEvent, AudioHandle, AudioSignal, LoadRequest, SegmentPolicy, SignalSink,
};

#[derive(Debug, Clone, PartialEq)]
pub enum AudioOp {
    Load { instance: u64, looping: bool },
    Play,
    Pause,
    SetVolume(f32),
    Fade {
        from: f32,
        to: f32,
        duration: Duration,
        token: u64,
    },
    Policy(SegmentPolicy),
    Unload,
}

type OpLog = Arc<Mutex<Vec<(String, AudioOp)>>>;

/// Backend whose handles only record what they were asked to do.
#[derive(Default, Clone)]
pub struct RecordingBackend {
    log: OpLog,
    sinks: Arc<Mutex<Vec<(String, u64, SignalSink)>>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Operations issued to handles of `sound_id`, in order.
    pub fn ops(&self, sound_id: &str) -> Vec<AudioOp> {
        self.log
            .lock()
            .iter()
            .filter(|(id, _)| id == sound_id)
            .map(|(_, op)| op.clone())
            .collect()
    }

    /// Fade operations issued to handles of `sound_id`.
    pub fn fades(&self, sound_id: &str) -> Vec<AudioOp> {
        self.ops(sound_id)
            .into_iter()
            .filter(|op| matches!(op, AudioOp::Fade { .. }))
            .collect()
    }

    /// Token of the last fade started for `sound_id`.
    pub fn last_fade_token(&self, sound_id: &str) -> Option<u64> {
        self.ops(sound_id).into_iter().rev().find_map(|op| match op {
            AudioOp::Fade { token, .. } => Some(token),
            _ => None,
        })
    }

    pub fn clear(&self) {
        self.log.lock().clear();
    }

    /// Sends `event` as if the newest handle of `sound_id` reported it.
    pub fn emit(&self, sound_id: &str, event: AudioEvent) {
        let sinks = self.sinks.lock();
        let Some((_, instance, sink)) = sinks.iter().rev().find(|(id, _, _)| id == sound_id)
        else {
            panic!("no handle loaded for {}", sound_id);
        };
        sink.send(AudioSignal {
            sound_id: sound_id.to_string(),
            instance: *instance,
            event,
        })
        .unwrap();
    }
}

impl AudioBackend for RecordingBackend {
    fn load(&self, request: LoadRequest, signals: SignalSink) -> Box<dyn AudioHandle> {
        self.sinks
            .lock()
            .push((request.sound_id.clone(), request.instance, signals));
        self.log.lock().push((
            request.sound_id.clone(),
            AudioOp::Load {
                instance: request.instance,
                looping: request.looping,
            },
        ));
        Box::new(RecordingHandle {
            sound_id: request.sound_id,
            log: Arc::clone(&self.log),
            volume: 1.0,
        })
    }
}

struct RecordingHandle {
    sound_id: String,
    log: OpLog,
    volume: f32,
}

impl RecordingHandle {
    fn record(&self, op: AudioOp) {
        self.log.lock().push((self.sound_id.clone(), op));
    }
}

impl AudioHandle for RecordingHandle {
    fn play(&mut self) {
        self.record(AudioOp::Play);
    }

    fn pause(&mut self) {
        self.record(AudioOp::Pause);
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
        self.record(AudioOp::SetVolume(volume));
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn fade(&mut self, from: f32, to: f32, duration: Duration, token: u64) {
        self.volume = to;
        self.record(AudioOp::Fade {
            from,
            to,
            duration,
            token,
        });
    }

    fn set_segment_policy(&mut self, policy: &SegmentPolicy) {
        self.record(AudioOp::Policy(policy.clone()));
    }

    fn unload(&mut self) {
        self.record(AudioOp::Unload);
    }
}

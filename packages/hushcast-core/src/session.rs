//! One sender session: wiring between the channels and the orchestrator.
//!
//! The [`SessionController`] owns the session loop. Every state mutation
//! happens on that loop, in response to transport frames, audio signals or
//! the idle deadline. The outside world talks to it through a
//! [`SessionHandle`].

use std::future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::channel::messages::{ControlCommand, StatusEvent};
use crate::channel::{Channel, ChannelHub, Envelope};
use crate::error::{ReceiverError, ReceiverResult};
use crate::player::{AudioBackend, AudioSignal, Orchestrator, StateChange};
use crate::protocol_constants::{NS_CONTROL, NS_STATUS, TRANSPORT_CHANNEL_CAPACITY};
use crate::state::{ReceiverConfig, ReceiverState};

/// What the transport reports to the session.
#[derive(Debug)]
pub enum TransportEvent {
    SenderConnected,
    Message(Envelope),
    SenderDisconnected,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Nothing played for the whole idle window.
    IdleTimeout,
    /// The sender went away.
    SenderDisconnected,
    /// The host asked the receiver to stop.
    Shutdown,
}

/// Cloneable handle for feeding a running session.
#[derive(Clone)]
pub struct SessionHandle {
    events: mpsc::Sender<TransportEvent>,
    shutdown: CancellationToken,
    ended: CancellationToken,
}

impl SessionHandle {
    /// Queues a transport event for the session loop.
    pub async fn send(&self, event: TransportEvent) -> ReceiverResult<()> {
        self.events
            .send(event)
            .await
            .map_err(|_| ReceiverError::ChannelClosed("session".into()))
    }

    /// Asks the session to stop every sound and close.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Cancelled once the session has fully closed.
    pub fn ended(&self) -> CancellationToken {
        self.ended.clone()
    }

    pub fn is_ended(&self) -> bool {
        self.ended.is_cancelled()
    }
}

pub struct SessionController {
    hub: Arc<ChannelHub>,
    status: Arc<Channel>,
    orchestrator: Arc<Mutex<Orchestrator>>,
    state: Arc<ReceiverState>,
    events: mpsc::Receiver<TransportEvent>,
    signals: mpsc::UnboundedReceiver<AudioSignal>,
    shutdown: CancellationToken,
    ended: CancellationToken,
}

impl SessionController {
    /// Builds a session on `hub`, playing through `backend`.
    ///
    /// Nothing is registered on the channels until [`run`](Self::run).
    pub fn new(
        hub: Arc<ChannelHub>,
        backend: Arc<dyn AudioBackend>,
        state: Arc<ReceiverState>,
        config: &ReceiverConfig,
    ) -> (Self, SessionHandle) {
        let (events_tx, events_rx) = mpsc::channel(TRANSPORT_CHANNEL_CAPACITY);
        let (signals_tx, signals_rx) = mpsc::unbounded_channel();
        let orchestrator = Orchestrator::new(
            backend,
            signals_tx,
            config.player_defaults(),
            config.idle_timeout(),
        );

        let shutdown = CancellationToken::new();
        let ended = CancellationToken::new();
        let handle = SessionHandle {
            events: events_tx,
            shutdown: shutdown.clone(),
            ended: ended.clone(),
        };

        let controller = Self {
            status: hub.channel(NS_STATUS),
            hub,
            orchestrator: Arc::new(Mutex::new(orchestrator)),
            state,
            events: events_rx,
            signals: signals_rx,
            shutdown,
            ended,
        };
        (controller, handle)
    }

    /// The registry driven by this session. Only the session loop mutates it.
    pub fn orchestrator(&self) -> Arc<Mutex<Orchestrator>> {
        Arc::clone(&self.orchestrator)
    }

    /// Runs the session until the sender leaves, the idle timer fires, or
    /// shutdown is requested. Sounds are stopped and every channel is closed
    /// before this returns.
    pub async fn run(mut self) -> SessionEnd {
        self.start();

        let end = loop {
            let deadline = self.orchestrator.lock().idle_deadline();
            tokio::select! {
                _ = self.shutdown.cancelled() => break SessionEnd::Shutdown,
                event = self.events.recv() => match event {
                    Some(TransportEvent::Message(envelope)) => self.handle_frame(envelope),
                    Some(TransportEvent::SenderConnected) => self.on_sender_connected(),
                    Some(TransportEvent::SenderDisconnected) | None => {
                        break SessionEnd::SenderDisconnected
                    }
                },
                Some(signal) = self.signals.recv() => {
                    self.orchestrator.lock().handle_signal(signal);
                }
                _ = idle_expiry(deadline) => break SessionEnd::IdleTimeout,
            }
        };

        self.close(end);
        end
    }

    fn start(&self) {
        let orchestrator = Arc::clone(&self.orchestrator);
        let state = Arc::clone(&self.state);
        let status = Arc::clone(&self.status);
        self.hub.channel(NS_CONTROL).on_message(move |data| {
            match ControlCommand::parse(data)? {
                ControlCommand::SetPresetName { preset_name } => {
                    log::info!("[Session] Preset name: {:?}", preset_name);
                    state.set_preset_name(preset_name.clone());
                    status.send(&StatusEvent::PresetNameChanged { preset_name });
                }
                command => orchestrator.lock().dispatch(command),
            }
            Ok(())
        });

        let state = Arc::clone(&self.state);
        let status = Arc::clone(&self.status);
        self.orchestrator
            .lock()
            .set_state_listener(Some(Box::new(move |change| {
                tracing::debug!(?change, "player state changed");
                state.apply(change);
                status.send(&status_event(change));
            })));

        log::info!("[Session] Started");
    }

    fn handle_frame(&self, envelope: Envelope) {
        let namespace = envelope.namespace.clone();
        if let Err(e) = self.hub.deliver(envelope) {
            log::warn!("[Session] Rejected frame on {}: {}", namespace, e);
        }
    }

    fn on_sender_connected(&self) {
        log::info!("[Session] Sender connected");
        self.state.set_sender_connected(true);

        let orchestrator = self.orchestrator.lock();
        let (state, volume) = orchestrator.global_state();
        self.status
            .send(&StatusEvent::GlobalStateChanged { state, volume });
        for player in orchestrator.snapshot() {
            self.status.send(&StatusEvent::SoundStateChanged {
                sound_id: player.sound_id,
                state: player.state.status(),
                volume: player.volume,
            });
        }
        let preset_name = self.state.preset_name.read().clone();
        if preset_name.is_some() {
            self.status
                .send(&StatusEvent::PresetNameChanged { preset_name });
        }
    }

    fn close(&self, end: SessionEnd) {
        log::info!("[Session] Ending: {:?}", end);
        {
            let mut orchestrator = self.orchestrator.lock();
            if end == SessionEnd::IdleTimeout {
                orchestrator.set_state_listener(None);
            }
            orchestrator.stop();
            orchestrator.set_state_listener(None);
            orchestrator.disarm_idle();
        }

        self.hub.close();
        self.state.set_sender_connected(false);
        self.ended.cancel();
    }
}

/// Maps a player change to its wire event.
pub fn status_event(change: &StateChange) -> StatusEvent {
    match change {
        StateChange::Sound {
            sound_id,
            state,
            volume,
        } => StatusEvent::SoundStateChanged {
            sound_id: sound_id.clone(),
            state: state.status(),
            volume: *volume,
        },
        StateChange::Global { state, volume } => StatusEvent::GlobalStateChanged {
            state: *state,
            volume: *volume,
        },
    }
}

async fn idle_expiry(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::test_fixtures::{AudioOp, RecordingBackend};
    use crate::player::{AudioEvent, PlaybackStatus};
    use serde_json::{json, Value};
    use std::time::Duration;
    use tokio::task::JoinHandle;

    struct Harness {
        handle: SessionHandle,
        backend: RecordingBackend,
        hub: Arc<ChannelHub>,
        orchestrator: Arc<Mutex<Orchestrator>>,
        state: Arc<ReceiverState>,
        outbound: mpsc::UnboundedReceiver<Envelope>,
        task: JoinHandle<SessionEnd>,
    }

    impl Harness {
        fn start() -> Self {
            let (tx, outbound) = mpsc::unbounded_channel();
            let hub = Arc::new(ChannelHub::new(tx));
            let backend = RecordingBackend::new();
            let state = Arc::new(ReceiverState::default());
            let (controller, handle) = SessionController::new(
                Arc::clone(&hub),
                Arc::new(backend.clone()),
                Arc::clone(&state),
                &ReceiverConfig::default(),
            );
            let orchestrator = controller.orchestrator();
            let task = tokio::spawn(controller.run());
            Self {
                handle,
                backend,
                hub,
                orchestrator,
                state,
                outbound,
                task,
            }
        }

        async fn control(&self, data: Value) {
            self.handle
                .send(TransportEvent::Message(Envelope::new(NS_CONTROL, data)))
                .await
                .unwrap();
        }

        /// Next status payload of the given kind, skipping others.
        async fn next_status(&mut self, kind: &str) -> Value {
            loop {
                let envelope = self.outbound.recv().await.expect("session hung up");
                if envelope.namespace == NS_STATUS && envelope.data["kind"] == kind {
                    return envelope.data;
                }
            }
        }
    }

    #[tokio::test]
    async fn start_then_ready_reports_playing() {
        let mut h = Harness::start();
        h.control(json!({"kind": "Start", "soundId": "rain", "volume": 0.5}))
            .await;

        let loading = h.next_status("SoundStateChanged").await;
        assert_eq!(
            loading,
            json!({"kind": "SoundStateChanged", "soundId": "rain", "state": "loading", "volume": 0.5})
        );
        {
            let orchestrator = h.orchestrator.lock();
            assert_eq!(orchestrator.len(), 1);
            assert!(!orchestrator.is_idle_timer_armed());
        }

        h.backend.emit("rain", AudioEvent::Ready);
        let playing = h.next_status("SoundStateChanged").await;
        assert_eq!(playing["state"], "playing");
        assert_eq!(playing["volume"], 0.5);
        assert_eq!(
            h.state.sounds.get("rain").map(|s| s.state),
            Some(PlaybackStatus::Playing)
        );
    }

    #[tokio::test]
    async fn unknown_kind_is_rejected_and_session_continues() {
        let mut h = Harness::start();
        h.control(json!({"kind": "SoundRewindCommand", "soundId": "rain"}))
            .await;
        h.control(json!({"kind": "SoundPlayCommand", "soundId": "rain"}))
            .await;

        let loading = h.next_status("SoundStateChanged").await;
        assert_eq!(loading["soundId"], "rain");
        assert_eq!(loading["volume"], 1.0);
    }

    #[tokio::test]
    async fn preset_name_is_recorded_and_echoed() {
        let mut h = Harness::start();
        h.control(json!({"kind": "PresetNameUpdateCommand", "presetName": "Rainy night"}))
            .await;

        let echoed = h.next_status("PresetNameChanged").await;
        assert_eq!(echoed["presetName"], "Rainy night");
        assert_eq!(
            h.state.preset_name.read().as_deref(),
            Some("Rainy night")
        );
    }

    #[tokio::test]
    async fn sender_connect_replays_current_state() {
        let mut h = Harness::start();
        h.handle.send(TransportEvent::SenderConnected).await.unwrap();

        let global = h.next_status("GlobalStateChanged").await;
        assert_eq!(global, json!({"kind": "GlobalStateChanged", "state": "stopped", "volume": 0.0}));
        assert!(h.state.is_sender_connected());
    }

    #[tokio::test]
    async fn disconnect_stops_everything_without_fades() {
        let mut h = Harness::start();
        h.control(json!({"kind": "Start", "soundId": "rain", "volume": 0.5}))
            .await;
        h.control(json!({"kind": "Start", "soundId": "birds", "volume": 0.8}))
            .await;
        h.next_status("SoundStateChanged").await;
        h.next_status("SoundStateChanged").await;
        h.backend.emit("rain", AudioEvent::Ready);
        h.backend.emit("birds", AudioEvent::Ready);
        h.next_status("SoundStateChanged").await;
        h.next_status("SoundStateChanged").await;
        h.backend.clear();

        h.handle
            .send(TransportEvent::SenderDisconnected)
            .await
            .unwrap();
        assert_eq!(h.task.await.unwrap(), SessionEnd::SenderDisconnected);

        let mut stopped = Vec::new();
        while let Ok(envelope) = h.outbound.try_recv() {
            if envelope.data["kind"] == "SoundStateChanged" {
                assert_eq!(envelope.data["state"], "stopped");
                stopped.push(envelope.data["soundId"].as_str().unwrap().to_string());
            }
        }
        stopped.sort();
        assert_eq!(stopped, vec!["birds", "rain"]);

        assert!(h.backend.fades("rain").is_empty());
        assert!(h.backend.fades("birds").is_empty());
        assert_eq!(h.backend.ops("rain").last(), Some(&AudioOp::Unload));

        let orchestrator = h.orchestrator.lock();
        assert!(orchestrator.is_empty());
        assert!(!orchestrator.is_idle_timer_armed());
        assert!(h.hub.is_closed());
        assert!(h.handle.is_ended());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_timeout_closes_the_session_silently() {
        let mut h = Harness::start();
        h.control(json!({"kind": "Start", "soundId": "rain"})).await;
        h.next_status("SoundStateChanged").await;
        h.control(json!({"kind": "Stop", "soundId": "rain", "immediate": true}))
            .await;
        let stopped = h.next_status("SoundStateChanged").await;
        assert_eq!(stopped["state"], "stopped");
        assert!(h.orchestrator.lock().is_idle_timer_armed());

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(!h.task.is_finished());

        assert_eq!(h.task.await.unwrap(), SessionEnd::IdleTimeout);
        assert!(h.hub.is_closed());
        assert!(!h.orchestrator.lock().has_state_listener());
        assert!(h.handle.send(TransportEvent::SenderConnected).await.is_err());
    }

    #[tokio::test]
    async fn shutdown_request_ends_the_session() {
        let h = Harness::start();
        h.handle.shutdown();
        assert_eq!(h.task.await.unwrap(), SessionEnd::Shutdown);
        assert!(h.hub.is_closed());
    }

    #[test]
    fn status_events_mirror_player_changes() {
        let event = status_event(&StateChange::Global {
            state: PlaybackStatus::Paused,
            volume: 0.25,
        });
        assert_eq!(
            event,
            StatusEvent::GlobalStateChanged {
                state: PlaybackStatus::Paused,
                volume: 0.25
            }
        );
    }
}

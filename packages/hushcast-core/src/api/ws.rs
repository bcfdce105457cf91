//! WebSocket transport between the sender and the session.
//!
//! Each text frame carries one [`Envelope`] as JSON. Inbound frames are queued
//! to the session; outbound frames written by the channels are drained from
//! the sender slot.

use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::sink::SinkExt;
use futures::stream::StreamExt;

use crate::api::ws_connection::SenderGuard;
use crate::api::AppState;
use crate::channel::Envelope;
use crate::error::ReceiverError;
use crate::protocol_constants::{WS_IDLE_TIMEOUT_SECS, WS_PING_INTERVAL_SECS};
use crate::session::TransportEvent;

/// WebSocket upgrade handler.
///
/// Rejects the upgrade with 409 while another sender is attached, and with
/// 503 once the session has ended.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    if state.session.is_ended() {
        return ReceiverError::ChannelClosed("session ended".into()).into_response();
    }

    let guard = match state.sender.claim() {
        Ok(guard) => guard,
        Err(e) => {
            log::warn!("[WS] Rejecting sender connection: {}", e);
            return e.into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_ws(socket, state, guard))
}

/// Pumps frames between one sender socket and the session until either side
/// goes away.
async fn handle_ws(socket: WebSocket, state: AppState, mut guard: SenderGuard) {
    let (mut sender, mut receiver) = socket.split();
    let conn_id = guard.id().to_string();
    let cancel_token = guard.cancel_token().clone();
    let session_ended = state.session.ended();

    if state
        .session
        .send(TransportEvent::SenderConnected)
        .await
        .is_err()
    {
        log::warn!("[WS] Session gone before {} could attach", conn_id);
        return;
    }
    log::info!("[WS] Sender attached: {}", conn_id);

    let mut ping_interval = tokio::time::interval(Duration::from_secs(WS_PING_INTERVAL_SECS));
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut last_activity = Instant::now();

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                log::info!("[WS] Connection force-closed: {}", conn_id);
                break;
            }
            _ = session_ended.cancelled() => {
                log::info!("[WS] Session ended, closing {}", conn_id);
                break;
            }
            msg = receiver.next() => {
                last_activity = Instant::now();
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<Envelope>(&text) {
                            Ok(envelope) => {
                                let event = TransportEvent::Message(envelope);
                                if state.session.send(event).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => log::warn!("[WS] Malformed frame from {}: {}", conn_id, e),
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
            frame = guard.next_outbound() => {
                let Some(envelope) = frame else { break };
                match serde_json::to_string(&envelope) {
                    Ok(json) => {
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => log::warn!("[WS] Failed to encode frame for {}: {}", envelope.namespace, e),
                }
            }
            _ = ping_interval.tick() => {
                if last_activity.elapsed() > Duration::from_secs(WS_IDLE_TIMEOUT_SECS) {
                    log::warn!("[WS] Sender {} stopped responding", conn_id);
                    break;
                }
                if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    let _ = sender.send(Message::Close(None)).await;
    if !state.session.is_ended() {
        let _ = state.session.send(TransportEvent::SenderDisconnected).await;
    }
    log::info!("[WS] Sender detached: {}", conn_id);
}

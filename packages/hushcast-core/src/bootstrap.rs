//! Application bootstrap and dependency wiring.
//!
//! The composition root: every service of the receiver is created and wired
//! here, in dependency order.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::api::{AppState, SenderSlot};
use crate::auth::{AccessTokenProvider, TokenBroker};
use crate::cdn::{ResourceClient, SegmentSource};
use crate::channel::ChannelHub;
use crate::context::NetworkContext;
use crate::error::ReceiverResult;
use crate::player::{AudioBackend, StreamingBackend};
use crate::protocol_constants::NS_AUTH;
use crate::session::{SessionController, SessionEnd, SessionHandle};
use crate::state::{ReceiverConfig, ReceiverState};

/// Container for all bootstrapped services.
pub struct BootstrappedServices {
    /// Channels shared with the sender.
    pub hub: Arc<ChannelHub>,
    /// Authenticated CDN access.
    pub resources: Arc<ResourceClient>,
    /// What the receiver is showing.
    pub receiver_state: Arc<ReceiverState>,
    /// The single sender connection.
    pub sender: Arc<SenderSlot>,
    /// Port and advertise address.
    pub network: NetworkContext,
    /// Handle to the session, valid before and after it starts.
    pub session: SessionHandle,
    controller: Option<SessionController>,
}

impl BootstrappedServices {
    /// Spawns the session loop. Returns `None` if it was already started.
    pub fn start_session(&mut self) -> Option<JoinHandle<SessionEnd>> {
        let controller = self.controller.take()?;
        log::info!("[Bootstrap] Starting session");
        Some(tokio::spawn(controller.run()))
    }

    /// State for the HTTP/WebSocket layer.
    pub fn app_state(&self) -> AppState {
        AppState::new(
            self.session.clone(),
            Arc::clone(&self.sender),
            Arc::clone(&self.receiver_state),
            self.network.clone(),
        )
    }

    /// Stops every sound, closes the channels and drops the sender.
    pub async fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");
        self.session.shutdown();
        if self.controller.is_none() {
            self.session.ended().cancelled().await;
        }
        self.sender.close();
        log::info!("[Bootstrap] Shutdown complete");
    }
}

/// Creates the shared HTTP client for all CDN requests.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialised.
fn create_http_client(timeout: Duration) -> ReceiverResult<Client> {
    Ok(Client::builder().timeout(timeout).build()?)
}

/// Bootstraps the receiver with the streaming audio backend.
///
/// Wiring order:
///
/// 1. Outbound frame queue and the channel hub writing into it
/// 2. Token broker on the auth channel
/// 3. Resource client (HTTP client + token broker)
/// 4. Segment source and streaming backend
/// 5. Session controller
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the HTTP client
/// cannot be built.
pub fn bootstrap_services(
    config: &ReceiverConfig,
    network: NetworkContext,
) -> ReceiverResult<BootstrappedServices> {
    bootstrap_services_with_backend(config, network, |resources| -> Arc<dyn AudioBackend> {
        let source = Arc::new(SegmentSource::new(resources));
        Arc::new(StreamingBackend::new(source))
    })
}

/// Like [`bootstrap_services`], with the audio backend built by
/// `make_backend` from the resource client.
pub fn bootstrap_services_with_backend<F>(
    config: &ReceiverConfig,
    network: NetworkContext,
    make_backend: F,
) -> ReceiverResult<BootstrappedServices>
where
    F: FnOnce(Arc<ResourceClient>) -> Arc<dyn AudioBackend>,
{
    config.validate()?;

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let hub = Arc::new(ChannelHub::new(outbound_tx));
    let sender = Arc::new(SenderSlot::new(outbound_rx));

    let tokens: Arc<dyn AccessTokenProvider> = Arc::new(TokenBroker::new(
        hub.channel(NS_AUTH),
        config.token_request_timeout(),
        hub.closed_token(),
    ));

    let http_client = create_http_client(config.http_timeout())?;
    let resources = Arc::new(ResourceClient::new(
        http_client,
        config.cdn_base_url.clone(),
        tokens,
    ));

    let backend = make_backend(Arc::clone(&resources));

    let receiver_state = Arc::new(ReceiverState::default());
    let (controller, session) = SessionController::new(
        Arc::clone(&hub),
        backend,
        Arc::clone(&receiver_state),
        config,
    );

    log::info!(
        "[Bootstrap] Receiver wired (CDN {}, idle timeout {}s)",
        resources.base_url(),
        config.idle_timeout_secs
    );

    Ok(BootstrappedServices {
        hub,
        resources,
        receiver_state,
        sender,
        network,
        session,
        controller: Some(controller),
    })
}

//! HTTP/WebSocket API layer.
//!
//! Thin handlers over the session: the sender attaches through the
//! WebSocket, everything else is read-only.

use std::net::IpAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

use crate::context::NetworkContext;
use crate::mdns_advertise::MdnsAdvertiser;
use crate::session::SessionHandle;
use crate::state::ReceiverState;

pub mod http;
pub mod ws;
pub mod ws_connection;

pub use ws_connection::{SenderGuard, SenderSlot};

/// First port tried when none is configured.
const PORT_RANGE_START: u16 = 49500;
/// Last port tried when none is configured.
const PORT_RANGE_END: u16 = 49510;

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind to port: {0}")]
    Bind(#[from] std::io::Error),

    #[error("No available ports in range {start}-{end}")]
    NoAvailablePort { start: u16, end: u16 },
}

/// How the server binds and announces itself.
#[derive(Debug, Clone, Default)]
pub struct ServerOptions {
    /// Port to bind; 0 picks the first free port in 49500-49510.
    pub bind_port: u16,
    /// Whether to advertise over mDNS.
    pub advertise_mdns: bool,
    /// Name shown to senders browsing for receivers.
    pub friendly_name: Option<String>,
}

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Feeds transport events to the running session.
    pub session: SessionHandle,
    /// The single sender connection.
    pub sender: Arc<SenderSlot>,
    /// What the receiver is showing.
    pub receiver_state: Arc<ReceiverState>,
    /// Port and advertise address.
    pub network: NetworkContext,
    /// Kept alive for its Drop impl, which withdraws the advertisement.
    mdns_advertiser: Arc<RwLock<Option<MdnsAdvertiser>>>,
}

impl AppState {
    pub fn new(
        session: SessionHandle,
        sender: Arc<SenderSlot>,
        receiver_state: Arc<ReceiverState>,
        network: NetworkContext,
    ) -> Self {
        Self {
            session,
            sender,
            receiver_state,
            network,
            mdns_advertiser: Arc::new(RwLock::new(None)),
        }
    }

    /// Withdraws the mDNS advertisement, if any.
    pub fn stop_advertising(&self) {
        if let Some(advertiser) = self.mdns_advertiser.write().take() {
            advertiser.shutdown();
        }
    }
}

async fn find_available_port(
    start: u16,
    end: u16,
) -> Result<(u16, tokio::net::TcpListener), ServerError> {
    for port in start..=end {
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
        match tokio::net::TcpListener::bind(&addr).await {
            Ok(listener) => return Ok((port, listener)),
            Err(_) => continue,
        }
    }
    Err(ServerError::NoAvailablePort { start, end })
}

/// Serves the API until the session ends.
pub async fn start_server(state: AppState, options: ServerOptions) -> Result<(), ServerError> {
    let (port, listener) = if options.bind_port > 0 {
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], options.bind_port));
        (
            options.bind_port,
            tokio::net::TcpListener::bind(&addr).await?,
        )
    } else {
        find_available_port(PORT_RANGE_START, PORT_RANGE_END).await?
    };

    state.network.set_port(port);

    if options.advertise_mdns {
        match state.network.get_local_ip().parse::<IpAddr>() {
            Ok(ip) => match MdnsAdvertiser::new(options.friendly_name.as_deref(), ip, port) {
                Ok(advertiser) => *state.mdns_advertiser.write() = Some(advertiser),
                Err(e) => log::debug!("[Server] mDNS advertisement unavailable: {}", e),
            },
            Err(e) => log::debug!("[Server] Not advertising, bad local IP: {}", e),
        }
    }

    log::info!(
        "[Server] Listening on http://0.0.0.0:{} (sender endpoint {})",
        port,
        state.network.websocket_url()
    );

    let session_ended = state.session.ended();
    let app = http::create_router(state.clone());
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(session_ended.cancelled_owned())
        .await;

    state.stop_advertising();
    served?;
    log::info!("[Server] Stopped");
    Ok(())
}

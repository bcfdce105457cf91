//! Network addressing for the receiver's local server.
//!
//! [`NetworkContext`] holds the port the server bound and the LAN address
//! senders should use. The address is either configured explicitly or
//! detected from the system's interfaces.

use std::net::IpAddr;
#[cfg(test)]
use std::net::Ipv4Addr;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::protocol_constants::WS_PATH;

/// Network configuration shared by the server and the mDNS advertiser.
#[derive(Clone)]
pub struct NetworkContext {
    /// Server port (0 until the listener is bound when auto-assigned).
    port: Arc<RwLock<u16>>,
    /// Address a sender can reach us at.
    local_ip: Arc<RwLock<String>>,
}

impl NetworkContext {
    /// Uses a configured advertise address.
    #[must_use]
    pub fn explicit(bind_port: u16, advertise_ip: IpAddr) -> Self {
        Self {
            port: Arc::new(RwLock::new(bind_port)),
            local_ip: Arc::new(RwLock::new(advertise_ip.to_string())),
        }
    }

    /// Detects the advertise address with `ip_detector`.
    ///
    /// # Errors
    ///
    /// Returns an error if detection fails.
    pub fn auto_detect(
        preferred_port: u16,
        ip_detector: &dyn IpDetector,
    ) -> Result<Self, NetworkError> {
        let local_ip = ip_detector.detect()?;
        Ok(Self {
            port: Arc::new(RwLock::new(preferred_port)),
            local_ip: Arc::new(RwLock::new(local_ip)),
        })
    }

    #[cfg(test)]
    pub fn for_test() -> Self {
        Self::explicit(0, IpAddr::V4(Ipv4Addr::LOCALHOST))
    }

    #[must_use]
    pub fn get_port(&self) -> u16 {
        *self.port.read()
    }

    #[must_use]
    pub fn get_local_ip(&self) -> String {
        self.local_ip.read().clone()
    }

    /// Records the port the listener actually bound.
    pub fn set_port(&self, port: u16) {
        *self.port.write() = port;
    }

    /// Base URL of the local server (e.g. `http://192.168.1.20:49500`).
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.get_local_ip(), self.get_port())
    }

    /// URL a sender connects its WebSocket to.
    #[must_use]
    pub fn websocket_url(&self) -> String {
        format!("ws://{}:{}{}", self.get_local_ip(), self.get_port(), WS_PATH)
    }
}

/// Finds the address this machine is reachable at on the LAN.
pub trait IpDetector: Send + Sync {
    fn detect(&self) -> Result<String, NetworkError>;
}

/// Detects the address of the system's default interface.
#[derive(Debug, Clone, Default)]
pub struct LocalIpDetector;

impl IpDetector for LocalIpDetector {
    fn detect(&self) -> Result<String, NetworkError> {
        local_ip_address::local_ip()
            .map(|ip| ip.to_string())
            .map_err(|e| NetworkError::Detection(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("Failed to detect local IP: {0}")]
    Detection(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedIp(&'static str);

    impl IpDetector for FixedIp {
        fn detect(&self) -> Result<String, NetworkError> {
            Ok(self.0.to_string())
        }
    }

    struct NoNetwork;

    impl IpDetector for NoNetwork {
        fn detect(&self) -> Result<String, NetworkError> {
            Err(NetworkError::Detection("no interfaces".into()))
        }
    }

    #[test]
    fn explicit_context_uses_provided_ip() {
        let ctx = NetworkContext::explicit(49500, IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20)));
        assert_eq!(ctx.base_url(), "http://192.168.1.20:49500");
        assert_eq!(ctx.websocket_url(), "ws://192.168.1.20:49500/ws");
    }

    #[test]
    fn auto_detect_uses_detector() {
        let ctx = NetworkContext::auto_detect(0, &FixedIp("10.0.0.5")).unwrap();
        assert_eq!(ctx.get_local_ip(), "10.0.0.5");

        ctx.set_port(51000);
        assert_eq!(ctx.get_port(), 51000);
    }

    #[test]
    fn auto_detect_propagates_failure() {
        assert!(NetworkContext::auto_detect(0, &NoNetwork).is_err());
    }
}

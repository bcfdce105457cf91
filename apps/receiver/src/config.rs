//! Receiver configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::net::IpAddr;
use std::path::Path;

use anyhow::{Context, Result};
use hushcast_core::ReceiverConfig;
use serde::Deserialize;

/// Receiver configuration loaded from YAML with environment overrides.
///
/// Runtime tunables (CDN, timeouts, fades) sit at the top level next to the
/// server settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to bind the HTTP server to; 0 picks a free port.
    /// Override: `HUSHCAST_BIND_PORT`
    pub bind_port: u16,

    /// IP address advertised to senders. Auto-detected if not specified.
    /// Override: `HUSHCAST_ADVERTISE_IP`
    pub advertise_ip: Option<IpAddr>,

    /// Advertise the receiver over mDNS.
    pub mdns: bool,

    /// Name senders see when browsing for receivers.
    /// Override: `HUSHCAST_FRIENDLY_NAME`
    pub friendly_name: Option<String>,

    #[serde(flatten)]
    pub receiver: ReceiverConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_port: 49500,
            advertise_ip: None,
            mdns: true,
            friendly_name: None,
            receiver: ReceiverConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config
            .receiver
            .validate()
            .context("Invalid receiver configuration")?;
        Ok(config)
    }

    /// Applies overrides looked up by variable name. Unparseable values are
    /// ignored with a warning.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("HUSHCAST_BIND_PORT") {
            match val.parse() {
                Ok(port) => self.bind_port = port,
                Err(_) => log::warn!("Ignoring HUSHCAST_BIND_PORT={}", val),
            }
        }

        if let Some(val) = lookup("HUSHCAST_ADVERTISE_IP") {
            match val.parse() {
                Ok(ip) => self.advertise_ip = Some(ip),
                Err(_) => log::warn!("Ignoring HUSHCAST_ADVERTISE_IP={}", val),
            }
        }

        if let Some(val) = lookup("HUSHCAST_FRIENDLY_NAME") {
            self.friendly_name = Some(val);
        }

        if let Some(val) = lookup("HUSHCAST_CDN_BASE_URL") {
            self.receiver.cdn_base_url = val;
        }

        if let Some(val) = lookup("HUSHCAST_IDLE_TIMEOUT_SECS") {
            match val.parse() {
                Ok(secs) => self.receiver.idle_timeout_secs = secs,
                Err(_) => log::warn!("Ignoring HUSHCAST_IDLE_TIMEOUT_SECS={}", val),
            }
        }
    }
}

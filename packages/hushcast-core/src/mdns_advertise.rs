//! mDNS advertisement so senders on the LAN can find the receiver.
//!
//! Best-effort: failure is logged by the caller and the receiver keeps
//! running, reachable by address only.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use mdns_sd::{ServiceDaemon, ServiceInfo};

use crate::protocol_constants::{MDNS_SERVICE_TYPE, WS_PATH};

/// Registers the receiver with the local mDNS responder for as long as it
/// lives.
pub struct MdnsAdvertiser {
    daemon: ServiceDaemon,
    service_fullname: String,
    unregistered: AtomicBool,
}

impl MdnsAdvertiser {
    /// Advertises `friendly_name` at `advertise_ip:port`. Without a name the
    /// machine hostname is used.
    ///
    /// # Errors
    /// Returns an error if mDNS is unavailable or registration fails.
    pub fn new(
        friendly_name: Option<&str>,
        advertise_ip: IpAddr,
        port: u16,
    ) -> Result<Self, mdns_sd::Error> {
        let daemon = ServiceDaemon::new()?;

        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "receiver".to_string());
        let instance_name = match friendly_name {
            Some(name) if !name.trim().is_empty() => name.trim().to_string(),
            _ => format!("Hushcast {}", hostname),
        };

        let service = ServiceInfo::new(
            MDNS_SERVICE_TYPE,
            &instance_name,
            &format!("{}.local.", dns_label(&hostname)),
            advertise_ip,
            port,
            Some(txt_records()),
        )?;

        let fullname = service.get_fullname().to_string();
        daemon.register(service)?;

        log::info!(
            "[mDNS] Advertising '{}' at {}:{}",
            instance_name,
            advertise_ip,
            port
        );

        Ok(Self {
            daemon,
            service_fullname: fullname,
            unregistered: AtomicBool::new(false),
        })
    }

    /// Withdraws the advertisement. Later calls are no-ops.
    pub fn shutdown(&self) {
        if self.unregistered.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.daemon.unregister(&self.service_fullname) {
            log::warn!("[mDNS] Failed to unregister service: {}", e);
        }
    }
}

impl Drop for MdnsAdvertiser {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Where a sender finds the receiver's endpoints.
fn txt_records() -> HashMap<String, String> {
    HashMap::from([
        ("ws_path".to_string(), WS_PATH.to_string()),
        ("status_path".to_string(), "/api/status".to_string()),
        ("version".to_string(), env!("CARGO_PKG_VERSION").to_string()),
    ])
}

/// Lowercases `hostname` and strips everything DNS labels cannot carry.
fn dns_label(hostname: &str) -> String {
    let label: String = hostname
        .to_lowercase()
        .replace([' ', '_'], "-")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect();
    let label = label.trim_matches('-');
    if label.is_empty() {
        "hushcast".to_string()
    } else {
        label.to_string()
    }
}

//! Interface between the control point and its discovery source.
//!
//! A [`DiscoveryController`] reports root devices appearing, leaving and
//! rebooting on the network. [`SsdpDiscovery`] is the SSDP implementation;
//! the network tracker only depends on the trait.

mod ssdp;

use std::net::IpAddr;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;

pub use ssdp::SsdpDiscovery;

/// UPnP architecture version announced by a device (`UPnP/1.1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpnpVersion {
    pub major: u32,
    pub minor: u32,
}

impl Default for UpnpVersion {
    fn default() -> Self {
        Self { major: 1, minor: 0 }
    }
}

impl UpnpVersion {
    /// Extracts the `UPnP/x.y` token of a `SERVER` header.
    pub fn from_server_header(server: &str) -> Option<Self> {
        let token = server
            .split_whitespace()
            .find_map(|t| t.strip_prefix("UPnP/").or_else(|| t.strip_prefix("upnp/")))?;
        let (major, minor) = token.trim_end_matches(',').split_once('.')?;
        Some(Self {
            major: major.parse().ok()?,
            minor: minor.parse().ok()?,
        })
    }

    /// UPnP 1.0 peers only understand the string form of extended types.
    pub fn requires_simple_values(&self) -> bool {
        self.major == 1 && self.minor == 0
    }
}

/// How the control point reaches a root device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkData {
    /// URL of the root device description (`LOCATION`)
    pub description_location: String,
    /// Local address the device was discovered on; requests leave from it
    pub endpoint_ip: IpAddr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootEntry {
    /// Root device UUID, without the `uuid:` prefix
    pub uuid: String,
    pub preferred_link: LinkData,
    pub upnp_version: UpnpVersion,
    /// `BOOTID.UPNP.ORG`
    pub boot_id: Option<u32>,
    /// `CONFIGID.UPNP.ORG`
    pub config_id: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DiscoveryEvent {
    RootDeviceAdded(RootEntry),
    RootDeviceRemoved(RootEntry),
    DeviceRebooted {
        entry: RootEntry,
        configuration_changed: bool,
    },
}

#[async_trait]
pub trait DiscoveryController: Send + Sync {
    /// Starts reporting events on `events`.
    async fn start(&self, events: UnboundedSender<DiscoveryEvent>) -> std::io::Result<()>;

    /// Asks every device to announce itself again.
    async fn search_all(&self) -> std::io::Result<()>;

    async fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upnp_version_from_server_header() {
        assert_eq!(
            UpnpVersion::from_server_header("Linux/5.10 UPnP/1.1 PMOMusic/0.3"),
            Some(UpnpVersion { major: 1, minor: 1 })
        );
        assert_eq!(UpnpVersion::from_server_header("Unknown"), None);
        assert!(UpnpVersion::default().requires_simple_values());
    }
}

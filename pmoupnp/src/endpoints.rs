//! Configuration d'une interface réseau locale.
//!
//! Un device peut être joint par plusieurs interfaces : chaque
//! [`EndpointConfiguration`] porte l'adresse de l'une d'elles et les
//! chemins HTTP sous lesquels les documents de description, le contrôle
//! et l'eventing de chaque service sont publiés sur cette interface.

use std::{
    collections::HashMap,
    hash::{DefaultHasher, Hash, Hasher},
    net::{IpAddr, Ipv4Addr},
    sync::Arc,
};

use pmoconfig::{DEFAULT_CONTROL_PATH, DEFAULT_DESCRIPTION_PATH, DEFAULT_EVENTING_PATH};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    devices::{Device, DeviceError},
    object_trait::xml_document_string,
    services::{Service, ServiceError},
};

// configId est un entier sur 24 bits (UDA 1.1 §1.1)
const CONFIG_ID_MASK: u64 = 0x00FF_FFFF;

#[derive(Debug, Error)]
pub enum EndpointError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("XML serialization failed: {0}")]
    Xml(#[from] xmltree::Error),
}

/// Triplet d'URLs d'un service, relatives à l'hôte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceUrls {
    pub scpd_url: String,
    pub control_url: String,
    pub event_sub_url: String,
}

/// Cible d'un chemin HTTP publié.
#[derive(Debug, Clone)]
pub enum EndpointTarget {
    RootDescription(Arc<Device>),
    Scpd(Arc<Service>),
    Control(Arc<Service>),
    Eventing(Arc<Service>),
}

#[derive(Debug, Clone)]
pub struct EndpointConfiguration {
    endpoint_ip: IpAddr,
    http_port: u16,
    description_path_base: String,
    control_path_base: String,
    eventing_path_base: String,
    config_id: u32,
    root_description_paths: HashMap<String, String>,
    service_urls: HashMap<(String, String), ServiceUrls>,
    targets: HashMap<String, EndpointTarget>,
}

fn normalize_base(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

/// Dernier segment d'un identifiant de service
/// (`urn:upnp-org:serviceId:AVTransport` → `AVTransport`).
fn short_service_id(service_id: &str) -> &str {
    service_id.rsplit(':').next().unwrap_or(service_id)
}

impl EndpointConfiguration {
    pub fn new(endpoint_ip: IpAddr, http_port: u16) -> Self {
        Self {
            endpoint_ip,
            http_port,
            description_path_base: DEFAULT_DESCRIPTION_PATH.to_string(),
            control_path_base: DEFAULT_CONTROL_PATH.to_string(),
            eventing_path_base: DEFAULT_EVENTING_PATH.to_string(),
            config_id: 0,
            root_description_paths: HashMap::new(),
            service_urls: HashMap::new(),
            targets: HashMap::new(),
        }
    }

    /// Remplace les préfixes des chemins publiés.
    pub fn with_paths(mut self, description: &str, control: &str, eventing: &str) -> Self {
        self.description_path_base = normalize_base(description);
        self.control_path_base = normalize_base(control);
        self.eventing_path_base = normalize_base(eventing);
        self
    }

    pub fn endpoint_ip(&self) -> IpAddr {
        self.endpoint_ip
    }

    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    pub fn config_id(&self) -> u32 {
        self.config_id
    }

    /// `http://ip:port`
    pub fn base_url(&self) -> String {
        match self.endpoint_ip {
            IpAddr::V4(ip) => format!("http://{}:{}", ip, self.http_port),
            IpAddr::V6(ip) => format!("http://[{}]:{}", ip, self.http_port),
        }
    }

    /// Calcule les chemins de publication de chaque device racine et de
    /// chacun de leurs services, puis le `configId` correspondant.
    pub fn generate_object_urls(&mut self, root_devices: &[Arc<Device>]) {
        self.root_description_paths.clear();
        self.service_urls.clear();
        self.targets.clear();

        for root in root_devices {
            let path = format!(
                "{}/{}/description.xml",
                self.description_path_base,
                root.uuid()
            );
            self.root_description_paths
                .insert(root.uuid().to_string(), path.clone());
            self.targets
                .insert(path, EndpointTarget::RootDescription(root.clone()));

            for device in root.all_devices() {
                for service in device.services() {
                    self.register_service(&device, &service);
                }
            }
        }

        match self.compute_config_id(root_devices) {
            Ok(id) => self.config_id = id,
            Err(e) => warn!("⚠️ Cannot compute configId for {}: {}", self.endpoint_ip, e),
        }
        debug!(
            "✅ Endpoint {} publishes {} paths (configId {})",
            self.endpoint_ip,
            self.targets.len(),
            self.config_id
        );
    }

    fn register_service(&mut self, device: &Arc<Device>, service: &Arc<Service>) {
        let sid = short_service_id(service.service_id());
        let uuid = device.uuid();
        let urls = ServiceUrls {
            scpd_url: format!("{}/{}/{}/description.xml", self.description_path_base, uuid, sid),
            control_url: format!("{}/{}/{}", self.control_path_base, uuid, sid),
            event_sub_url: format!("{}/{}/{}", self.eventing_path_base, uuid, sid),
        };

        self.targets
            .insert(urls.scpd_url.clone(), EndpointTarget::Scpd(service.clone()));
        self.targets
            .insert(urls.control_url.clone(), EndpointTarget::Control(service.clone()));
        self.targets.insert(
            urls.event_sub_url.clone(),
            EndpointTarget::Eventing(service.clone()),
        );
        self.service_urls.insert(
            (uuid.to_string(), service.service_id().to_string()),
            urls,
        );
    }

    /// Hache les documents de description publiés sur 24 bits.
    fn compute_config_id(&self, root_devices: &[Arc<Device>]) -> Result<u32, EndpointError> {
        let mut probe = self.clone();
        probe.config_id = 0;

        let mut hasher = DefaultHasher::new();
        for root in root_devices {
            let doc = root.build_root_device_description(&probe, None)?;
            xml_document_string(&doc)?.hash(&mut hasher);
            for device in root.all_devices() {
                for service in device.services() {
                    let scpd = service.build_scpd_document(&probe)?;
                    xml_document_string(&scpd)?.hash(&mut hasher);
                }
            }
        }
        Ok((hasher.finish() & CONFIG_ID_MASK) as u32)
    }

    pub fn get_service_urls(&self, device_uuid: &str, service_id: &str) -> Option<&ServiceUrls> {
        self.service_urls
            .get(&(device_uuid.to_string(), service_id.to_string()))
    }

    pub fn root_description_path(&self, device_uuid: &str) -> Option<&str> {
        self.root_description_paths
            .get(device_uuid)
            .map(String::as_str)
    }

    /// URL absolue du document de description (en-tête `LOCATION` de SSDP).
    pub fn root_description_url(&self, device_uuid: &str) -> Option<String> {
        self.root_description_path(device_uuid)
            .map(|path| format!("{}{}", self.base_url(), path))
    }

    /// Objet publié sous `path`.
    pub fn resolve(&self, path: &str) -> Option<&EndpointTarget> {
        self.targets.get(path)
    }
}

/// Adresses IPv4 des interfaces locales hors loopback, ou loopback seule
/// si aucune autre n'est disponible.
pub fn local_endpoint_addresses() -> Vec<IpAddr> {
    let mut addresses: Vec<IpAddr> = match get_if_addrs::get_if_addrs() {
        Ok(interfaces) => interfaces
            .into_iter()
            .filter(|iface| !iface.is_loopback())
            .map(|iface| iface.ip())
            .filter(IpAddr::is_ipv4)
            .collect(),
        Err(e) => {
            warn!("⚠️ Cannot list network interfaces: {}", e);
            Vec::new()
        }
    };

    addresses.dedup();
    if addresses.is_empty() {
        addresses.push(IpAddr::V4(Ipv4Addr::LOCALHOST));
    }
    addresses
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::DeviceInformation;

    fn root() -> Arc<Device> {
        let device = Arc::new(
            Device::new(
                "schemas-upnp-org:device:MediaRenderer",
                1,
                "5cb2a3b1-0000-4000-8000-000000000001",
                DeviceInformation {
                    friendly_name: "Salon".to_string(),
                    manufacturer: "PMOMusic".to_string(),
                    model_name: "Renderer".to_string(),
                    ..Default::default()
                },
            )
            .unwrap(),
        );
        device
            .add_service(Arc::new(
                Service::new(
                    "schemas-upnp-org:service:AVTransport",
                    1,
                    "urn:upnp-org:serviceId:AVTransport",
                )
                .unwrap(),
            ))
            .unwrap();
        device
    }

    #[test]
    fn test_generated_paths() {
        let root = root();
        let mut config = EndpointConfiguration::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080)
            .with_paths("/desc/", "control", "/event");
        config.generate_object_urls(&[root.clone()]);

        let uuid = root.uuid();
        assert_eq!(
            config.root_description_path(uuid),
            Some(format!("/desc/{}/description.xml", uuid).as_str())
        );
        assert_eq!(
            config.root_description_url(uuid).unwrap(),
            format!("http://127.0.0.1:8080/desc/{}/description.xml", uuid)
        );

        let urls = config
            .get_service_urls(uuid, "urn:upnp-org:serviceId:AVTransport")
            .unwrap();
        assert_eq!(urls.scpd_url, format!("/desc/{}/AVTransport/description.xml", uuid));
        assert_eq!(urls.control_url, format!("/control/{}/AVTransport", uuid));
        assert_eq!(urls.event_sub_url, format!("/event/{}/AVTransport", uuid));

        assert!(matches!(
            config.resolve(&urls.control_url),
            Some(EndpointTarget::Control(_))
        ));
        assert!(config.resolve("/nowhere").is_none());
    }

    #[test]
    fn test_config_id_is_24_bits_and_stable() {
        let root = root();
        let mut a = EndpointConfiguration::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080);
        let mut b = a.clone();
        a.generate_object_urls(&[root.clone()]);
        b.generate_object_urls(&[root]);
        assert!(a.config_id() <= CONFIG_ID_MASK as u32);
        assert_eq!(a.config_id(), b.config_id());
    }

    #[test]
    fn test_local_addresses_never_empty() {
        assert!(!local_endpoint_addresses().is_empty());
    }
}

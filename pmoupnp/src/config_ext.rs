//! Extension pour intégrer la configuration de l'hôte UPnP dans pmoconfig
//!
//! Ce module fournit le trait `UpnpConfigExt` qui ajoute à
//! `pmoconfig::Config` la lecture des réglages du serveur HTTP de l'hôte
//! et des noms publiés par ses devices.

use anyhow::Result;
use pmoconfig::{Config, DEFAULT_CONTROL_PATH, DEFAULT_DESCRIPTION_PATH, DEFAULT_EVENTING_PATH};
use serde_yaml::Value;

const DEFAULT_HTTP_PORT: u16 = 8080;
const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";
const DEFAULT_MANUFACTURER: &str = "PMOMusic";

/// Réglages du serveur HTTP qui publie les devices locaux.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub http_port: u16,
    pub bind_address: String,
    pub description_path: String,
    pub control_path: String,
    pub eventing_path: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            http_port: DEFAULT_HTTP_PORT,
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            description_path: DEFAULT_DESCRIPTION_PATH.to_string(),
            control_path: DEFAULT_CONTROL_PATH.to_string(),
            eventing_path: DEFAULT_EVENTING_PATH.to_string(),
        }
    }
}

impl ServerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            http_port: config.get_http_port(),
            bind_address: config.get_bind_address(),
            description_path: config.get_description_path(),
            control_path: config.get_control_path(),
            eventing_path: config.get_eventing_path(),
        }
    }
}

/// Trait d'extension pour ajouter la configuration UPnP à pmoconfig
///
/// # Exemple
///
/// ```rust,ignore
/// use pmoconfig::get_config;
/// use pmoupnp::UpnpConfigExt;
///
/// let config = get_config();
/// let settings = config.get_upnp_server_settings();
/// let uuid = config.get_upnp_device_uuid("mediarenderer", "salon")?;
/// ```
pub trait UpnpConfigExt {
    /// Réglages du serveur HTTP de l'hôte
    fn get_upnp_server_settings(&self) -> ServerSettings;

    /// Fabricant affiché dans les descriptions (défaut: "PMOMusic")
    fn get_upnp_manufacturer(&self) -> Result<String>;

    /// Définit le fabricant affiché dans les descriptions
    fn set_upnp_manufacturer(&self, manufacturer: String) -> Result<()>;

    /// UUID persistant d'un device, généré au premier appel
    fn get_upnp_device_uuid(&self, devtype: &str, name: &str) -> Result<String>;
}

impl UpnpConfigExt for Config {
    fn get_upnp_server_settings(&self) -> ServerSettings {
        ServerSettings::from_config(self)
    }

    fn get_upnp_manufacturer(&self) -> Result<String> {
        match self.get_value(&["upnp", "device", "manufacturer"]) {
            Ok(Value::String(s)) if !s.is_empty() => Ok(s),
            _ => Ok(DEFAULT_MANUFACTURER.to_string()),
        }
    }

    fn set_upnp_manufacturer(&self, manufacturer: String) -> Result<()> {
        self.set_value(
            &["upnp", "device", "manufacturer"],
            Value::String(manufacturer),
        )
    }

    fn get_upnp_device_uuid(&self, devtype: &str, name: &str) -> Result<String> {
        self.get_device_udn(devtype, name)
    }
}

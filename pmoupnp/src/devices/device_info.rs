//! Informations affichables d'un device.

use std::{net::IpAddr, sync::Arc};

/// Calcule une URL valide pour l'interface locale qui reçoit la requête.
///
/// Reçoit l'adresse IP de l'interface et la langue demandée ; `None`
/// omet l'élément correspondant.
pub type GetUrlForEndpoint = Arc<dyn Fn(IpAddr, Option<&str>) -> Option<String> + Send + Sync>;

/// Fournisseur des informations d'un device, selon la langue demandée.
pub trait LocalizedDeviceInformation: Send + Sync {
    fn friendly_name(&self, locale: Option<&str>) -> String;
    fn manufacturer(&self, locale: Option<&str>) -> String;
    fn manufacturer_url(&self, _locale: Option<&str>) -> Option<String> {
        None
    }
    fn model_description(&self, _locale: Option<&str>) -> Option<String> {
        None
    }
    fn model_name(&self, locale: Option<&str>) -> String;
    fn model_number(&self, _locale: Option<&str>) -> Option<String> {
        None
    }
    fn model_url(&self, _locale: Option<&str>) -> Option<String> {
        None
    }
    fn serial_number(&self, _locale: Option<&str>) -> Option<String> {
        None
    }
    fn upc(&self) -> Option<String> {
        None
    }
}

/// Informations fixes, identiques pour toutes les langues.
#[derive(Debug, Clone, Default)]
pub struct DeviceInformation {
    pub friendly_name: String,
    pub manufacturer: String,
    pub manufacturer_url: Option<String>,
    pub model_description: Option<String>,
    pub model_name: String,
    pub model_number: Option<String>,
    pub model_url: Option<String>,
    pub serial_number: Option<String>,
    pub upc: Option<String>,
}

impl LocalizedDeviceInformation for DeviceInformation {
    fn friendly_name(&self, _locale: Option<&str>) -> String {
        self.friendly_name.clone()
    }

    fn manufacturer(&self, _locale: Option<&str>) -> String {
        self.manufacturer.clone()
    }

    fn manufacturer_url(&self, _locale: Option<&str>) -> Option<String> {
        self.manufacturer_url.clone()
    }

    fn model_description(&self, _locale: Option<&str>) -> Option<String> {
        self.model_description.clone()
    }

    fn model_name(&self, _locale: Option<&str>) -> String {
        self.model_name.clone()
    }

    fn model_number(&self, _locale: Option<&str>) -> Option<String> {
        self.model_number.clone()
    }

    fn model_url(&self, _locale: Option<&str>) -> Option<String> {
        self.model_url.clone()
    }

    fn serial_number(&self, _locale: Option<&str>) -> Option<String> {
        self.serial_number.clone()
    }

    fn upc(&self) -> Option<String> {
        self.upc.clone()
    }
}

/// Icône d'un device (`<icon>`).
#[derive(Clone)]
pub struct IconDescriptor {
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub url: GetUrlForEndpoint,
}

impl std::fmt::Debug for IconDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IconDescriptor")
            .field("mime_type", &self.mime_type)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("depth", &self.depth)
            .finish()
    }
}

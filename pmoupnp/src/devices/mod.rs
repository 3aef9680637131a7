//! Module pour les devices UPnP.
//!
//! Un [`Device`] est identifié par son UUID (`UDN = "uuid:" + UUID`) et
//! porte ses services puis ses devices embarqués. L'ordre d'ajout fixe
//! l'ordre des éléments du document de description : les membres définis
//! par le standard d'abord, les extensions du fabricant ensuite.
//!
//! # Exemple
//!
//! ```ignore
//! use pmoupnp::devices::{Device, DeviceInformation};
//! use pmoupnp::services::Service;
//! use std::sync::Arc;
//!
//! let info = DeviceInformation {
//!     friendly_name: "Salon".to_string(),
//!     manufacturer: "PMOMusic".to_string(),
//!     model_name: "Renderer".to_string(),
//!     ..Default::default()
//! };
//! let device = Arc::new(Device::new(
//!     "schemas-upnp-org:device:MediaRenderer",
//!     1,
//!     "2fac1234-31f8-11b4-a222-08002b34c003",
//!     info,
//! )?);
//!
//! let rendering = Arc::new(Service::new(
//!     "schemas-upnp-org:service:RenderingControl",
//!     1,
//!     "urn:upnp-org:serviceId:RenderingControl",
//! )?);
//! device.add_service(rendering)?;
//! ```

mod device_info;
mod device_methods;
pub mod errors;

use std::sync::{Arc, OnceLock, Weak};

use parking_lot::RwLock;

pub use device_info::{
    DeviceInformation, GetUrlForEndpoint, IconDescriptor, LocalizedDeviceInformation,
};
pub use errors::DeviceError;

use crate::{UpnpObjectSet, UpnpObjectType, services::Service};

/// Modèle d'un device UPnP.
pub struct Device {
    /// Métadonnées de l'objet (le nom est l'UUID)
    object: UpnpObjectType,

    /// Type sans préfixe `urn:` ni version (ex: `schemas-upnp-org:device:MediaRenderer`)
    device_type: String,

    version: u32,

    uuid: String,

    /// Informations affichables, éventuellement localisées
    information: Arc<dyn LocalizedDeviceInformation>,

    icons: RwLock<Vec<IconDescriptor>>,

    presentation_url: RwLock<Option<GetUrlForEndpoint>>,

    parent: OnceLock<Weak<Device>>,

    services: UpnpObjectSet<Service>,

    /// Sous-devices (embedded devices)
    devices: UpnpObjectSet<Device>,
}

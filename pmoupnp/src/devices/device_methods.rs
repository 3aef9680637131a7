use std::{
    fmt,
    sync::{Arc, Weak},
};

use parking_lot::RwLock;
use xmltree::{Element, XMLNode};

use crate::{
    UpnpObjectSet, UpnpObjectType, UpnpTyped,
    object_trait::{spec_version_element, text_element},
    devices::{
        Device, DeviceError, GetUrlForEndpoint, IconDescriptor, LocalizedDeviceInformation,
    },
    endpoints::EndpointConfiguration,
    services::Service,
};

const DEVICE_NAMESPACE: &str = "urn:schemas-upnp-org:device-1-0";

impl UpnpTyped for Device {
    fn as_upnp_object_type(&self) -> &UpnpObjectType {
        &self.object
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("device_type", &self.device_type)
            .field("version", &self.version)
            .field("uuid", &self.uuid)
            .field("services", &self.services.len())
            .field("devices", &self.devices.len())
            .finish()
    }
}

impl Device {
    /// Crée un nouveau modèle de device.
    ///
    /// # Arguments
    ///
    /// * `device_type` - Type UPnP sans préfixe `urn:` ni version
    /// * `version` - Version du type de device, au moins 1
    /// * `uuid` - Identifiant stable du device
    /// * `information` - Fournisseur des informations affichables
    pub fn new(
        device_type: &str,
        version: u32,
        uuid: &str,
        information: impl LocalizedDeviceInformation + 'static,
    ) -> Result<Self, DeviceError> {
        if version == 0 {
            return Err(DeviceError::InvalidVersion);
        }

        Ok(Self {
            object: UpnpObjectType::new(uuid, "Device"),
            device_type: device_type.to_string(),
            version,
            uuid: uuid.to_string(),
            information: Arc::new(information),
            icons: RwLock::new(Vec::new()),
            presentation_url: RwLock::new(None),
            parent: Default::default(),
            services: UpnpObjectSet::new(),
            devices: UpnpObjectSet::new(),
        })
    }

    pub fn device_type(&self) -> &str {
        &self.device_type
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// `uuid:` + UUID
    pub fn udn(&self) -> String {
        format!("uuid:{}", self.uuid)
    }

    /// `urn:` + type + `:` + version
    pub fn device_type_version_urn(&self) -> String {
        format!("urn:{}:{}", self.device_type, self.version)
    }

    pub fn information(&self) -> &Arc<dyn LocalizedDeviceInformation> {
        &self.information
    }

    pub fn add_icon(&self, icon: IconDescriptor) {
        self.icons.write().push(icon);
    }

    pub fn set_presentation_url(&self, url: GetUrlForEndpoint) {
        *self.presentation_url.write() = Some(url);
    }

    pub fn parent(&self) -> Option<Arc<Device>> {
        self.parent.get().and_then(Weak::upgrade)
    }

    pub fn is_root(&self) -> bool {
        self.parent.get().is_none()
    }

    /// Remonte les parents jusqu'au device sans parent.
    pub fn root_device(self: &Arc<Self>) -> Arc<Device> {
        let mut current = self.clone();
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    /// Ajoute un device embarqué, à la suite des précédents.
    ///
    /// Aucun UDN du sous-arbre ajouté ne doit déjà être présent dans
    /// l'arbre de `self`.
    pub fn add_embedded_device(self: &Arc<Self>, device: Arc<Device>) -> Result<(), DeviceError> {
        let root = self.root_device();
        for d in device.all_devices() {
            if root.find_device_by_udn(&d.udn()).is_some() {
                return Err(DeviceError::DeviceAlreadyExists(d.udn()));
            }
        }

        device
            .parent
            .set(Arc::downgrade(self))
            .map_err(|_| DeviceError::AlreadyAttached(device.udn()))?;
        self.devices.insert(device)?;
        Ok(())
    }

    /// Ajoute un service, à la suite des précédents.
    pub fn add_service(self: &Arc<Self>, service: Arc<Service>) -> Result<(), DeviceError> {
        if self.services.contains(service.service_id()) {
            return Err(
                crate::UpnpObjectSetError::AlreadyExists(service.service_id().to_string()).into(),
            );
        }
        service.attach_to_device(self)?;
        self.services.insert(service)?;
        Ok(())
    }

    pub fn services(&self) -> Vec<Arc<Service>> {
        self.services.all()
    }

    pub fn get_service(&self, service_id: &str) -> Option<Arc<Service>> {
        self.services.get_by_name(service_id)
    }

    pub fn embedded_devices(&self) -> Vec<Arc<Device>> {
        self.devices.all()
    }

    /// Ce device puis tous ses descendants, en profondeur d'abord.
    pub fn all_devices(self: &Arc<Self>) -> Vec<Arc<Device>> {
        let mut result = vec![self.clone()];
        for child in self.devices.all() {
            result.extend(child.all_devices());
        }
        result
    }

    pub fn find_device_by_udn(self: &Arc<Self>, udn: &str) -> Option<Arc<Device>> {
        self.all_devices().into_iter().find(|d| d.udn() == udn)
    }

    /// Devices du sous-arbre du type demandé, de version égale ou, si
    /// `search_compatible`, supérieure ou égale.
    pub fn find_devices_by_type_and_version(
        self: &Arc<Self>,
        device_type: &str,
        version: u32,
        search_compatible: bool,
    ) -> Vec<Arc<Device>> {
        self.all_devices()
            .into_iter()
            .filter(|d| {
                d.device_type == device_type
                    && if search_compatible {
                        d.version >= version
                    } else {
                        d.version == version
                    }
            })
            .collect()
    }

    pub fn find_services_by_type_and_version(
        self: &Arc<Self>,
        service_type: &str,
        version: u32,
        search_compatible: bool,
    ) -> Vec<Arc<Service>> {
        self.all_devices()
            .into_iter()
            .flat_map(|d| d.services())
            .filter(|s| {
                if search_compatible {
                    s.is_compatible(service_type, version)
                } else {
                    s.service_type() == service_type && s.version() == version
                }
            })
            .collect()
    }

    /// Document de description complet (`<root>`), réservé au device racine.
    pub fn build_root_device_description(
        &self,
        config: &EndpointConfiguration,
        locale: Option<&str>,
    ) -> Result<Element, DeviceError> {
        if !self.is_root() {
            return Err(DeviceError::NotRootDevice(self.udn()));
        }

        let mut root = Element::new("root");
        root.attributes
            .insert("xmlns".to_string(), DEVICE_NAMESPACE.to_string());
        root.attributes
            .insert("configId".to_string(), config.config_id().to_string());
        root.children
            .push(XMLNode::Element(spec_version_element()));

        self.add_device_description(&mut root, config, locale)?;
        Ok(root)
    }

    /// Ajoute l'élément `<device>` de ce device à `parent`, puis, à
    /// l'intérieur, ses services et ses devices embarqués.
    pub fn add_device_description(
        &self,
        parent: &mut Element,
        config: &EndpointConfiguration,
        locale: Option<&str>,
    ) -> Result<(), DeviceError> {
        let info = &self.information;
        let ip = config.endpoint_ip();
        let mut elem = Element::new("device");

        let push = |elem: &mut Element, name: &str, value: Option<String>| {
            if let Some(v) = value {
                elem.children.push(XMLNode::Element(text_element(name, &v)));
            }
        };

        push(&mut elem, "deviceType", Some(self.device_type_version_urn()));
        push(&mut elem, "friendlyName", Some(info.friendly_name(locale)));
        push(&mut elem, "manufacturer", Some(info.manufacturer(locale)));
        push(&mut elem, "manufacturerURL", info.manufacturer_url(locale));
        push(&mut elem, "modelDescription", info.model_description(locale));
        push(&mut elem, "modelName", Some(info.model_name(locale)));
        push(&mut elem, "modelNumber", info.model_number(locale));
        push(&mut elem, "modelURL", info.model_url(locale));
        push(&mut elem, "serialNumber", info.serial_number(locale));
        push(&mut elem, "UDN", Some(self.udn()));
        push(&mut elem, "UPC", info.upc());

        let icons = self.icons.read().clone();
        let mut icon_list = Element::new("iconList");
        for icon in icons {
            let Some(url) = (icon.url)(ip, locale) else {
                continue;
            };
            let mut icon_elem = Element::new("icon");
            push(&mut icon_elem, "mimetype", Some(icon.mime_type.clone()));
            push(&mut icon_elem, "width", Some(icon.width.to_string()));
            push(&mut icon_elem, "height", Some(icon.height.to_string()));
            push(&mut icon_elem, "depth", Some(icon.depth.to_string()));
            push(&mut icon_elem, "url", Some(url));
            icon_list.children.push(XMLNode::Element(icon_elem));
        }
        if !icon_list.children.is_empty() {
            elem.children.push(XMLNode::Element(icon_list));
        }

        let services = self.services.all();
        if !services.is_empty() {
            let mut service_list = Element::new("serviceList");
            for service in services {
                service.add_device_description_for_service(&mut service_list, config)?;
            }
            elem.children.push(XMLNode::Element(service_list));
        }

        let devices = self.devices.all();
        if !devices.is_empty() {
            let mut device_list = Element::new("deviceList");
            for device in devices {
                device.add_device_description(&mut device_list, config, locale)?;
            }
            elem.children.push(XMLNode::Element(device_list));
        }

        let presentation = self.presentation_url.read().clone();
        push(
            &mut elem,
            "presentationURL",
            presentation.and_then(|cb| cb(ip, locale)),
        );

        parent.children.push(XMLNode::Element(elem));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use super::*;
    use crate::devices::DeviceInformation;

    fn info(name: &str) -> DeviceInformation {
        DeviceInformation {
            friendly_name: name.to_string(),
            manufacturer: "PMOMusic".to_string(),
            model_name: "Test".to_string(),
            serial_number: Some("42".to_string()),
            ..Default::default()
        }
    }

    fn device(uuid: &str) -> Arc<Device> {
        Arc::new(Device::new("schemas-upnp-org:device:MediaRenderer", 2, uuid, info(uuid)).unwrap())
    }

    fn tree() -> (Arc<Device>, Arc<Device>, Arc<Device>) {
        let root = device("root");
        let child = device("child");
        let grandchild = device("grandchild");
        root.add_embedded_device(child.clone()).unwrap();
        child.add_embedded_device(grandchild.clone()).unwrap();
        root.add_service(Arc::new(
            Service::new(
                "schemas-upnp-org:service:RenderingControl",
                1,
                "urn:upnp-org:serviceId:RenderingControl",
            )
            .unwrap(),
        ))
        .unwrap();
        (root, child, grandchild)
    }

    #[test]
    fn test_udn_and_root_walk() {
        let (root, child, grandchild) = tree();
        assert_eq!(grandchild.udn(), "uuid:grandchild");
        assert!(Arc::ptr_eq(&grandchild.root_device(), &root));
        assert!(Arc::ptr_eq(&child.root_device(), &root));
        assert!(Arc::ptr_eq(&root.root_device(), &root));
        assert!(root.is_root());
        assert!(!child.is_root());
    }

    #[test]
    fn test_attach_rules() {
        let (root, child, grandchild) = tree();
        let other = device("other");
        assert!(matches!(
            other.add_embedded_device(child.clone()),
            Err(DeviceError::AlreadyAttached(_))
        ));
        assert!(matches!(
            grandchild.add_embedded_device(root.clone()),
            Err(DeviceError::DeviceAlreadyExists(_))
        ));
        assert!(matches!(
            root.add_embedded_device(device("child")),
            Err(DeviceError::DeviceAlreadyExists(_))
        ));
    }

    #[test]
    fn test_lookups() {
        let (root, _, _) = tree();
        let names: Vec<_> = root.all_devices().iter().map(|d| d.uuid().to_string()).collect();
        assert_eq!(names, vec!["root", "child", "grandchild"]);
        assert!(root.find_device_by_udn("uuid:grandchild").is_some());
        assert!(root.find_device_by_udn("uuid:nobody").is_none());

        let t = "schemas-upnp-org:device:MediaRenderer";
        assert_eq!(root.find_devices_by_type_and_version(t, 1, true).len(), 3);
        assert_eq!(root.find_devices_by_type_and_version(t, 1, false).len(), 0);
        assert_eq!(root.find_devices_by_type_and_version(t, 2, false).len(), 3);

        let s = "schemas-upnp-org:service:RenderingControl";
        assert_eq!(root.find_services_by_type_and_version(s, 1, false).len(), 1);
        assert_eq!(root.find_services_by_type_and_version(s, 2, true).len(), 0);
    }

    #[test]
    fn test_root_description() {
        let (root, child, _) = tree();
        root.set_presentation_url(Arc::new(|ip, _| Some(format!("http://{}/ui", ip))));
        root.add_icon(IconDescriptor {
            mime_type: "image/png".to_string(),
            width: 48,
            height: 48,
            depth: 24,
            url: Arc::new(|_, _| Some("/icon.png".to_string())),
        });

        let mut config = EndpointConfiguration::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080);
        config.generate_object_urls(&[root.clone()]);

        let doc = root.build_root_device_description(&config, None).unwrap();
        assert_eq!(doc.name, "root");
        let dev = doc.get_child("device").unwrap();
        let names: Vec<_> = dev
            .children
            .iter()
            .filter_map(|n| n.as_element())
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(
            names,
            vec![
                "deviceType",
                "friendlyName",
                "manufacturer",
                "modelName",
                "serialNumber",
                "UDN",
                "iconList",
                "serviceList",
                "deviceList",
                "presentationURL"
            ]
        );
        assert_eq!(
            dev.get_child("presentationURL").unwrap().get_text().unwrap(),
            "http://127.0.0.1/ui"
        );

        assert!(matches!(
            child.build_root_device_description(&config, None),
            Err(DeviceError::NotRootDevice(_))
        ));
    }
}

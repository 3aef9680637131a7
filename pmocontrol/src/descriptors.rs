//! Description documents of a root device, as fetched by the network tracker.
//!
//! A [`RootDescriptor`] holds the root device description and one
//! [`ServiceDescriptor`] per service of the root device and of its embedded
//! devices. Both carry a state which only moves forward; once a root is
//! invalidated, none of its descriptors can change state again.

use std::{collections::HashMap, fmt, sync::Arc};

use parking_lot::Mutex;
use tokio::task::AbortHandle;
use url::Url;
use xmltree::Element;

use crate::{discovery::RootEntry, errors::DescriptionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorState {
    Initializing,
    AwaitingDeviceDescription,
    AwaitingServiceDescriptions,
    Ready,
    Invalid,
    Erroneous,
}

impl DescriptorState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DescriptorState::Invalid | DescriptorState::Erroneous)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceDescriptorState {
    NotInitialized,
    AwaitingDescription,
    Ready,
    Invalid,
    Erroneous,
}

/// Splits `urn:domain:kind:Type:version` into (`domain:kind:Type`, version).
pub fn parse_type_version_urn(urn: &str) -> Option<(String, u32)> {
    let body = urn.strip_prefix("urn:")?;
    let (type_, version) = body.rsplit_once(':')?;
    Some((type_.to_string(), version.trim().parse().ok()?))
}

fn child_text(elem: &Element, name: &str) -> Option<String> {
    elem.get_child(name)
        .and_then(|c| c.get_text())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

fn child_elements<'a>(elem: &'a Element, name: &'a str) -> impl Iterator<Item = &'a Element> {
    elem.children
        .iter()
        .filter_map(|n| n.as_element())
        .filter(move |e| e.name == name)
}

struct ServiceInner {
    state: ServiceDescriptorState,
    scpd: Option<Arc<Element>>,
}

/// Description of one service, as listed in its device's `<serviceList>`.
pub struct ServiceDescriptor {
    service_type: String,
    version: u32,
    urn: String,
    service_id: String,
    device_uuid: String,
    scpd_url: Url,
    control_url: Url,
    event_sub_url: Url,
    inner: Mutex<ServiceInner>,
}

impl fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("urn", &self.urn)
            .field("service_id", &self.service_id)
            .field("device_uuid", &self.device_uuid)
            .field("state", &self.state())
            .finish()
    }
}

impl ServiceDescriptor {
    fn from_element(elem: &Element, device_uuid: &str, base: &Url) -> Result<Self, DescriptionError> {
        let urn = child_text(elem, "serviceType").ok_or(DescriptionError::MissingField("serviceType"))?;
        let (service_type, version) =
            parse_type_version_urn(&urn).ok_or_else(|| DescriptionError::InvalidUrl(urn.clone()))?;
        let service_id = child_text(elem, "serviceId").ok_or(DescriptionError::MissingField("serviceId"))?;

        let resolve = |field: &'static str| -> Result<Url, DescriptionError> {
            let relative = child_text(elem, field).ok_or(DescriptionError::MissingField(field))?;
            base.join(&relative)
                .map_err(|_| DescriptionError::InvalidUrl(relative))
        };

        Ok(Self {
            service_type,
            version,
            urn,
            service_id,
            device_uuid: device_uuid.to_string(),
            scpd_url: resolve("SCPDURL")?,
            control_url: resolve("controlURL")?,
            event_sub_url: resolve("eventSubURL")?,
            inner: Mutex::new(ServiceInner {
                state: ServiceDescriptorState::NotInitialized,
                scpd: None,
            }),
        })
    }

    pub fn service_type(&self) -> &str {
        &self.service_type
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// `urn:domain:service:Type:version`
    pub fn service_type_version_urn(&self) -> &str {
        &self.urn
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    pub fn device_uuid(&self) -> &str {
        &self.device_uuid
    }

    pub fn scpd_url(&self) -> &Url {
        &self.scpd_url
    }

    pub fn control_url(&self) -> &Url {
        &self.control_url
    }

    pub fn event_sub_url(&self) -> &Url {
        &self.event_sub_url
    }

    pub fn state(&self) -> ServiceDescriptorState {
        self.inner.lock().state
    }

    /// Parsed SCPD, once the service is ready.
    pub fn scpd(&self) -> Option<Arc<Element>> {
        self.inner.lock().scpd.clone()
    }

    fn transition(&self, state: ServiceDescriptorState) {
        let mut inner = self.inner.lock();
        if inner.state != ServiceDescriptorState::Invalid {
            inner.state = state;
        }
    }

    fn set_scpd(&self, scpd: Element) {
        let mut inner = self.inner.lock();
        if inner.state == ServiceDescriptorState::AwaitingDescription {
            inner.scpd = Some(Arc::new(scpd));
            inner.state = ServiceDescriptorState::Ready;
        }
    }
}

/// Read-only view of a `<device>` element of a description.
#[derive(Debug, Clone)]
pub struct DeviceDescriptor {
    element: Element,
}

impl DeviceDescriptor {
    pub fn new(element: Element) -> Self {
        Self { element }
    }

    pub fn element(&self) -> &Element {
        &self.element
    }

    /// UUID from `<UDN>`, without the `uuid:` prefix.
    pub fn uuid(&self) -> Option<String> {
        child_text(&self.element, "UDN").map(|udn| {
            udn.strip_prefix("uuid:")
                .map(str::to_string)
                .unwrap_or(udn)
        })
    }

    /// `urn:domain:device:Type:version`
    pub fn device_type_version_urn(&self) -> Option<String> {
        child_text(&self.element, "deviceType")
    }

    pub fn device_type(&self) -> Option<String> {
        self.device_type_version_urn()
            .and_then(|urn| parse_type_version_urn(&urn))
            .map(|(t, _)| t)
    }

    pub fn version(&self) -> Option<u32> {
        self.device_type_version_urn()
            .and_then(|urn| parse_type_version_urn(&urn))
            .map(|(_, v)| v)
    }

    pub fn friendly_name(&self) -> Option<String> {
        child_text(&self.element, "friendlyName")
    }

    pub fn child_devices(&self) -> Vec<DeviceDescriptor> {
        self.element
            .get_child("deviceList")
            .map(|list| child_elements(list, "device").cloned().map(Self::new).collect())
            .unwrap_or_default()
    }

    pub fn service_elements(&self) -> Vec<&Element> {
        self.element
            .get_child("serviceList")
            .map(|list| child_elements(list, "service").collect())
            .unwrap_or_default()
    }

    /// This device or one of its descendants with the given UUID.
    pub fn find_device(&self, uuid: &str) -> Option<DeviceDescriptor> {
        if self.uuid().as_deref() == Some(uuid) {
            return Some(self.clone());
        }
        self.child_devices()
            .into_iter()
            .find_map(|child| child.find_device(uuid))
    }
}

struct RootInner {
    state: DescriptorState,
    description: Option<Arc<Element>>,
    /// Device UUID → services in document order
    services: HashMap<String, Vec<Arc<ServiceDescriptor>>>,
    reported: bool,
    fetch: Option<AbortHandle>,
}

/// A root device known to the tracker and its description documents.
pub struct RootDescriptor {
    entry: RootEntry,
    inner: Mutex<RootInner>,
}

impl fmt::Debug for RootDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootDescriptor")
            .field("uuid", &self.entry.uuid)
            .field("state", &self.state())
            .finish()
    }
}

impl RootDescriptor {
    pub fn new(entry: RootEntry) -> Self {
        Self {
            entry,
            inner: Mutex::new(RootInner {
                state: DescriptorState::Initializing,
                description: None,
                services: HashMap::new(),
                reported: false,
                fetch: None,
            }),
        }
    }

    pub fn entry(&self) -> &RootEntry {
        &self.entry
    }

    pub fn uuid(&self) -> &str {
        &self.entry.uuid
    }

    pub fn state(&self) -> DescriptorState {
        self.inner.lock().state
    }

    /// Raw `<root>` document.
    pub fn description(&self) -> Option<Arc<Element>> {
        self.inner.lock().description.clone()
    }

    pub fn root_device(&self) -> Option<DeviceDescriptor> {
        self.description()
            .and_then(|root| root.get_child("device").cloned())
            .map(DeviceDescriptor::new)
    }

    pub fn find_device(&self, uuid: &str) -> Option<DeviceDescriptor> {
        self.root_device().and_then(|root| root.find_device(uuid))
    }

    pub fn services_of(&self, device_uuid: &str) -> Vec<Arc<ServiceDescriptor>> {
        self.inner
            .lock()
            .services
            .get(device_uuid)
            .cloned()
            .unwrap_or_default()
    }

    pub fn service(&self, device_uuid: &str, urn: &str) -> Option<Arc<ServiceDescriptor>> {
        self.services_of(device_uuid)
            .into_iter()
            .find(|sd| sd.service_type_version_urn() == urn)
    }

    /// True once `RootDeviceAdded` has been raised for this descriptor.
    pub fn was_reported(&self) -> bool {
        self.inner.lock().reported
    }

    /// Moves the root and all its services to `Invalid` and aborts the
    /// running fetch. Returns false if the root was already terminal.
    pub fn invalidate(&self) -> bool {
        let (services, fetch) = {
            let mut inner = self.inner.lock();
            if inner.state.is_terminal() {
                return false;
            }
            inner.state = DescriptorState::Invalid;
            let services: Vec<_> = inner.services.values().flatten().cloned().collect();
            (services, inner.fetch.take())
        };
        for sd in services {
            sd.transition(ServiceDescriptorState::Invalid);
        }
        if let Some(fetch) = fetch {
            fetch.abort();
        }
        true
    }

    fn transition(&self, from: DescriptorState, to: DescriptorState) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != from {
            return false;
        }
        inner.state = to;
        true
    }

    pub(crate) fn set_fetch_handle(&self, handle: AbortHandle) {
        let mut inner = self.inner.lock();
        if inner.state.is_terminal() {
            handle.abort();
        } else {
            inner.fetch = Some(handle);
        }
    }

    pub(crate) fn begin_device_fetch(&self) -> bool {
        self.transition(
            DescriptorState::Initializing,
            DescriptorState::AwaitingDeviceDescription,
        )
    }

    /// Stores the device description and returns the services to fetch,
    /// depth first in document order.
    pub(crate) fn set_device_description(
        &self,
        root: Element,
    ) -> Result<Vec<Arc<ServiceDescriptor>>, DescriptionError> {
        let location = &self.entry.preferred_link.description_location;
        let location_url =
            Url::parse(location).map_err(|_| DescriptionError::InvalidUrl(location.clone()))?;
        let base = match child_text(&root, "URLBase") {
            Some(base) => Url::parse(&base).map_err(|_| DescriptionError::InvalidUrl(base))?,
            None => location_url,
        };
        let device = root
            .get_child("device")
            .cloned()
            .map(DeviceDescriptor::new)
            .ok_or(DescriptionError::MissingField("device"))?;

        let mut services = HashMap::new();
        let mut queue = Vec::new();
        collect_services(&device, &base, &mut services, &mut queue)?;

        let mut inner = self.inner.lock();
        if inner.state != DescriptorState::AwaitingDeviceDescription {
            return Err(DescriptionError::Aborted);
        }
        inner.description = Some(Arc::new(root));
        inner.services = services;
        inner.state = DescriptorState::AwaitingServiceDescriptions;
        Ok(queue)
    }

    pub(crate) fn begin_service_fetch(&self, sd: &ServiceDescriptor) -> bool {
        if self.state() != DescriptorState::AwaitingServiceDescriptions {
            return false;
        }
        sd.transition(ServiceDescriptorState::AwaitingDescription);
        true
    }

    pub(crate) fn set_service_description(&self, sd: &ServiceDescriptor, scpd: Element) -> bool {
        if self.state() != DescriptorState::AwaitingServiceDescriptions {
            return false;
        }
        sd.set_scpd(scpd);
        true
    }

    pub(crate) fn mark_service_erroneous(&self, sd: &ServiceDescriptor) {
        sd.transition(ServiceDescriptorState::Erroneous);
        self.mark_erroneous();
    }

    pub(crate) fn mark_erroneous(&self) {
        let mut inner = self.inner.lock();
        if !inner.state.is_terminal() {
            inner.state = DescriptorState::Erroneous;
        }
        inner.fetch = None;
    }

    /// Completes the pipeline. Returns true when the root must be reported.
    pub(crate) fn mark_ready(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != DescriptorState::AwaitingServiceDescriptions {
            return false;
        }
        inner.state = DescriptorState::Ready;
        inner.fetch = None;
        true
    }

    /// Records that `RootDeviceAdded` is being raised. Fails once the root
    /// left `Ready` or was already reported.
    pub(crate) fn mark_reported(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != DescriptorState::Ready || inner.reported {
            return false;
        }
        inner.reported = true;
        true
    }
}

fn collect_services(
    device: &DeviceDescriptor,
    base: &Url,
    services: &mut HashMap<String, Vec<Arc<ServiceDescriptor>>>,
    queue: &mut Vec<Arc<ServiceDescriptor>>,
) -> Result<(), DescriptionError> {
    let uuid = device.uuid().ok_or(DescriptionError::MissingField("UDN"))?;
    let mut own = Vec::new();
    for elem in device.service_elements() {
        let sd = Arc::new(ServiceDescriptor::from_element(elem, &uuid, base)?);
        queue.push(sd.clone());
        own.push(sd);
    }
    if !own.is_empty() {
        services.insert(uuid, own);
    }
    for child in device.child_devices() {
        collect_services(&child, base, services, queue)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use super::*;
    use crate::discovery::{LinkData, UpnpVersion};

    pub(crate) const DESCRIPTION: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <specVersion><major>1</major><minor>1</minor></specVersion>
  <device>
    <deviceType>urn:schemas-upnp-org:device:MediaRenderer:1</deviceType>
    <friendlyName>Salon</friendlyName>
    <UDN>uuid:root-1</UDN>
    <serviceList>
      <service>
        <serviceType>urn:schemas-upnp-org:service:RenderingControl:1</serviceType>
        <serviceId>urn:upnp-org:serviceId:RenderingControl</serviceId>
        <SCPDURL>/desc/rc.xml</SCPDURL>
        <controlURL>/control/rc</controlURL>
        <eventSubURL>/event/rc</eventSubURL>
      </service>
    </serviceList>
    <deviceList>
      <device>
        <deviceType>urn:schemas-upnp-org:device:Embedded:2</deviceType>
        <friendlyName>Inner</friendlyName>
        <UDN>uuid:child-1</UDN>
        <serviceList>
          <service>
            <serviceType>urn:schemas-upnp-org:service:AVTransport:1</serviceType>
            <serviceId>urn:upnp-org:serviceId:AVTransport</serviceId>
            <SCPDURL>avt.xml</SCPDURL>
            <controlURL>/control/avt</controlURL>
            <eventSubURL>/event/avt</eventSubURL>
          </service>
        </serviceList>
      </device>
    </deviceList>
  </device>
</root>"#;

    fn entry() -> RootEntry {
        RootEntry {
            uuid: "root-1".to_string(),
            preferred_link: LinkData {
                description_location: "http://10.0.0.2:49152/desc/root.xml".to_string(),
                endpoint_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            },
            upnp_version: UpnpVersion::default(),
            boot_id: None,
            config_id: None,
        }
    }

    #[test]
    fn test_parse_type_version_urn() {
        assert_eq!(
            parse_type_version_urn("urn:schemas-upnp-org:service:AVTransport:2"),
            Some(("schemas-upnp-org:service:AVTransport".to_string(), 2))
        );
        assert_eq!(parse_type_version_urn("AVTransport"), None);
    }

    #[test]
    fn test_device_description_collects_services() {
        let rd = RootDescriptor::new(entry());
        assert!(rd.begin_device_fetch());
        let queue = rd
            .set_device_description(Element::parse(DESCRIPTION.as_bytes()).unwrap())
            .unwrap();

        assert_eq!(rd.state(), DescriptorState::AwaitingServiceDescriptions);
        assert_eq!(queue.len(), 2);
        assert_eq!(
            queue[0].scpd_url().as_str(),
            "http://10.0.0.2:49152/desc/rc.xml"
        );
        assert_eq!(
            queue[1].scpd_url().as_str(),
            "http://10.0.0.2:49152/desc/avt.xml"
        );
        assert_eq!(queue[1].device_uuid(), "child-1");
        assert!(rd
            .service("child-1", "urn:schemas-upnp-org:service:AVTransport:1")
            .is_some());

        let child = rd.find_device("child-1").unwrap();
        assert_eq!(child.friendly_name().as_deref(), Some("Inner"));
        assert_eq!(child.version(), Some(2));
    }

    #[test]
    fn test_invalidate_is_final() {
        let rd = RootDescriptor::new(entry());
        rd.begin_device_fetch();
        let queue = rd
            .set_device_description(Element::parse(DESCRIPTION.as_bytes()).unwrap())
            .unwrap();

        assert!(rd.invalidate());
        assert!(!rd.invalidate());
        assert_eq!(rd.state(), DescriptorState::Invalid);
        assert!(queue.iter().all(|sd| sd.state() == ServiceDescriptorState::Invalid));

        assert!(!rd.begin_service_fetch(&queue[0]));
        assert!(!rd.mark_ready());
        rd.mark_erroneous();
        assert_eq!(rd.state(), DescriptorState::Invalid);
    }

    fn ready_root() -> RootDescriptor {
        let rd = RootDescriptor::new(entry());
        rd.begin_device_fetch();
        let queue = rd
            .set_device_description(Element::parse(DESCRIPTION.as_bytes()).unwrap())
            .unwrap();
        for sd in &queue {
            assert!(rd.begin_service_fetch(sd));
            assert!(rd.set_service_description(sd, Element::new("scpd")));
        }
        assert!(rd.mark_ready());
        rd
    }

    #[test]
    fn test_report_is_claimed_once() {
        let rd = ready_root();
        assert!(!rd.was_reported());
        assert!(rd.mark_reported());
        assert!(!rd.mark_reported());
        assert!(rd.was_reported());
    }

    #[test]
    fn test_invalidated_root_is_never_reported() {
        let rd = ready_root();
        assert!(rd.invalidate());
        assert!(!rd.mark_reported());
        assert!(!rd.was_reported());
    }

    #[test]
    fn test_missing_device_is_an_error() {
        let rd = RootDescriptor::new(entry());
        rd.begin_device_fetch();
        let result = rd.set_device_description(Element::parse("<root/>".as_bytes()).unwrap());
        assert!(matches!(result, Err(DescriptionError::MissingField("device"))));
    }
}

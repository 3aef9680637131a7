//! Proxy tree of a connected device.
//!
//! Built from the documents of a `Ready` [`RootDescriptor`]: one
//! [`CpDevice`] per device, one [`CpService`] per service, with the actions
//! and state variables of its SCPD. Actions are invoked through the
//! [`DeviceConnection`] the services are linked to.

use std::{
    fmt,
    str::FromStr,
    sync::{Arc, Weak},
};

use parking_lot::RwLock;
use pmoupnp::{
    actions::ArgumentDirection,
    variable_types::{DataType, StateValue, StateVarType, element_text},
};
use tracing::debug;
use xmltree::Element;

use crate::{
    descriptors::{DeviceDescriptor, RootDescriptor, ServiceDescriptor},
    device_connection::DeviceConnection,
    errors::{ConnectionError, DescriptionError},
    events::EventBus,
};

/// Resolves an extended data type from its schema URI and type name.
pub type DataTypeResolver = Arc<dyn Fn(&str, &str) -> Option<DataType> + Send + Sync>;

#[derive(Debug, Clone)]
pub enum ServiceEvent {
    StateVariableChanged {
        variable: Arc<CpStateVariable>,
        value: StateValue,
    },
    SubscriptionFailed(String),
}

fn child_elements<'a>(elem: &'a Element, name: &'a str) -> impl Iterator<Item = &'a Element> {
    elem.children
        .iter()
        .filter_map(|n| n.as_element())
        .filter(move |e| e.name == name)
}

fn list_children<'a>(elem: &'a Element, list: &'a str, item: &'a str) -> Vec<&'a Element> {
    elem.get_child(list)
        .map(|l| child_elements(l, item).collect())
        .unwrap_or_default()
}

fn required_text(elem: &Element, name: &str) -> Result<String, DescriptionError> {
    elem.get_child(name)
        .map(element_text)
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| DescriptionError::InvalidScpd(format!("<{}> missing in <{}>", name, elem.name)))
}

#[derive(Debug)]
pub struct CpStateVariable {
    name: String,
    data_type: DataType,
    send_events: bool,
    allowed_values: Option<Vec<String>>,
    value: RwLock<Option<StateValue>>,
}

impl CpStateVariable {
    fn from_scpd(elem: &Element, resolver: Option<&DataTypeResolver>) -> Result<Self, DescriptionError> {
        let name = required_text(elem, "name")?;
        let data_type_elem = elem
            .get_child("dataType")
            .ok_or_else(|| DescriptionError::InvalidScpd(format!("No dataType for {}", name)))?;
        let data_type = resolve_data_type(data_type_elem, resolver)?;
        let send_events = elem
            .attributes
            .get("sendEvents")
            .is_none_or(|v| !v.eq_ignore_ascii_case("no"));
        let allowed_values = elem.get_child("allowedValueList").map(|list| {
            child_elements(list, "allowedValue")
                .map(element_text)
                .collect::<Vec<_>>()
        });

        Ok(Self {
            name,
            data_type,
            send_events,
            allowed_values,
            value: RwLock::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    pub fn is_sending_events(&self) -> bool {
        self.send_events
    }

    pub fn allowed_values(&self) -> Option<&[String]> {
        self.allowed_values.as_deref()
    }

    /// Last evented value.
    pub fn value(&self) -> Option<StateValue> {
        self.value.read().clone()
    }

    pub(crate) fn update(&self, value: StateValue) {
        *self.value.write() = Some(value);
    }
}

/// `<dataType>` of an SCPD. Extended types (`type="prefix:Name"`) go through
/// `resolver`; those it does not know are handled as strings.
fn resolve_data_type(
    elem: &Element,
    resolver: Option<&DataTypeResolver>,
) -> Result<DataType, DescriptionError> {
    if let Some(qualified) = elem.attributes.get("type") {
        let (prefix, name) = qualified.split_once(':').unwrap_or(("", qualified.as_str()));
        let schema = elem
            .namespaces
            .as_ref()
            .and_then(|ns| ns.get(prefix))
            .unwrap_or_default();
        if let Some(data_type) = resolver.and_then(|r| r(schema, name)) {
            return Ok(data_type);
        }
        debug!("Extended data type {} unresolved, using string", qualified);
        return Ok(DataType::Standard(StateVarType::String));
    }

    let wire_name = element_text(elem);
    StateVarType::from_str(&wire_name)
        .map(DataType::Standard)
        .map_err(|e| DescriptionError::InvalidScpd(e.to_string()))
}

#[derive(Debug)]
pub struct CpArgument {
    name: String,
    direction: ArgumentDirection,
    related_state_variable: Arc<CpStateVariable>,
    is_return_value: bool,
}

impl CpArgument {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> ArgumentDirection {
        self.direction
    }

    pub fn related_state_variable(&self) -> &Arc<CpStateVariable> {
        &self.related_state_variable
    }

    pub fn data_type(&self) -> &DataType {
        self.related_state_variable.data_type()
    }

    pub fn is_return_value(&self) -> bool {
        self.is_return_value
    }
}

pub struct CpAction {
    name: String,
    in_arguments: Vec<CpArgument>,
    out_arguments: Vec<CpArgument>,
    service: Weak<CpService>,
}

impl fmt::Debug for CpAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CpAction")
            .field("name", &self.name)
            .field("in_arguments", &self.in_arguments)
            .field("out_arguments", &self.out_arguments)
            .finish()
    }
}

impl CpAction {
    fn from_scpd(
        elem: &Element,
        variables: &[Arc<CpStateVariable>],
        service: Weak<CpService>,
    ) -> Result<Self, DescriptionError> {
        let name = required_text(elem, "name")?;
        let mut in_arguments = Vec::new();
        let mut out_arguments = Vec::new();

        for arg in list_children(elem, "argumentList", "argument") {
            let arg_name = required_text(arg, "name")?;
            let related = required_text(arg, "relatedStateVariable")?;
            let related_state_variable = variables
                .iter()
                .find(|v| v.name() == related)
                .cloned()
                .ok_or_else(|| {
                    DescriptionError::InvalidScpd(format!(
                        "Argument {} of {} refers to unknown variable {}",
                        arg_name, name, related
                    ))
                })?;
            let direction = match required_text(arg, "direction")?.to_ascii_lowercase().as_str() {
                "in" => ArgumentDirection::In,
                "out" => ArgumentDirection::Out,
                other => {
                    return Err(DescriptionError::InvalidScpd(format!(
                        "Invalid direction '{}' for argument {}",
                        other, arg_name
                    )));
                }
            };
            let argument = CpArgument {
                name: arg_name,
                direction,
                related_state_variable,
                is_return_value: arg.get_child("retval").is_some(),
            };
            match direction {
                ArgumentDirection::In => in_arguments.push(argument),
                ArgumentDirection::Out => out_arguments.push(argument),
            }
        }

        Ok(Self {
            name,
            in_arguments,
            out_arguments,
            service,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn in_arguments(&self) -> &[CpArgument] {
        &self.in_arguments
    }

    pub fn out_arguments(&self) -> &[CpArgument] {
        &self.out_arguments
    }

    pub fn service(&self) -> Option<Arc<CpService>> {
        self.service.upgrade()
    }

    /// True if `params` has one value per in-argument, each of its type.
    pub fn matches_signature(&self, params: &[StateValue]) -> bool {
        params.len() == self.in_arguments.len()
            && self
                .in_arguments
                .iter()
                .zip(params)
                .all(|(arg, value)| arg.data_type().is_assignable_from(value))
    }

    /// Calls the action on the device and returns its out-arguments.
    pub async fn invoke(&self, params: Vec<StateValue>) -> Result<Vec<StateValue>, ConnectionError> {
        let connection = self
            .service()
            .and_then(|s| s.connection())
            .ok_or_else(|| ConnectionError::NotConnected(self.name.clone()))?;
        connection.on_action_called(self, params).await
    }
}

pub struct CpService {
    device_uuid: String,
    descriptor: Arc<ServiceDescriptor>,
    actions: Vec<Arc<CpAction>>,
    state_variables: Vec<Arc<CpStateVariable>>,
    connection: RwLock<Weak<DeviceConnection>>,
    events: EventBus<ServiceEvent>,
}

impl fmt::Debug for CpService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CpService")
            .field("urn", &self.service_type_version_urn())
            .field("device_uuid", &self.device_uuid)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl CpService {
    fn build(
        descriptor: Arc<ServiceDescriptor>,
        resolver: Option<&DataTypeResolver>,
    ) -> Result<Arc<Self>, DescriptionError> {
        let scpd = descriptor.scpd().ok_or_else(|| {
            DescriptionError::ServiceNotReady(descriptor.service_type_version_urn().to_string())
        })?;

        let state_variables = list_children(&scpd, "serviceStateTable", "stateVariable")
            .into_iter()
            .map(|elem| CpStateVariable::from_scpd(elem, resolver).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;

        let mut failure = None;
        let service = Arc::new_cyclic(|weak: &Weak<CpService>| {
            let mut actions = Vec::new();
            for elem in list_children(&scpd, "actionList", "action") {
                match CpAction::from_scpd(elem, &state_variables, weak.clone()) {
                    Ok(action) => actions.push(Arc::new(action)),
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }
            CpService {
                device_uuid: descriptor.device_uuid().to_string(),
                descriptor: descriptor.clone(),
                actions,
                state_variables: state_variables.clone(),
                connection: RwLock::new(Weak::new()),
                events: EventBus::new("service"),
            }
        });

        match failure {
            Some(e) => Err(e),
            None => Ok(service),
        }
    }

    pub fn device_uuid(&self) -> &str {
        &self.device_uuid
    }

    pub fn descriptor(&self) -> &Arc<ServiceDescriptor> {
        &self.descriptor
    }

    pub fn service_type(&self) -> &str {
        self.descriptor.service_type()
    }

    pub fn version(&self) -> u32 {
        self.descriptor.version()
    }

    pub fn service_type_version_urn(&self) -> &str {
        self.descriptor.service_type_version_urn()
    }

    pub fn service_id(&self) -> &str {
        self.descriptor.service_id()
    }

    pub fn actions(&self) -> &[Arc<CpAction>] {
        &self.actions
    }

    pub fn action(&self, name: &str) -> Option<Arc<CpAction>> {
        self.actions.iter().find(|a| a.name() == name).cloned()
    }

    pub fn state_variables(&self) -> &[Arc<CpStateVariable>] {
        &self.state_variables
    }

    pub fn state_variable(&self, name: &str) -> Option<Arc<CpStateVariable>> {
        self.state_variables.iter().find(|v| v.name() == name).cloned()
    }

    pub fn events(&self) -> &EventBus<ServiceEvent> {
        &self.events
    }

    pub fn is_connected(&self) -> bool {
        self.connection().is_some()
    }

    pub fn connection(&self) -> Option<Arc<DeviceConnection>> {
        self.connection.read().upgrade()
    }

    /// Subscribes to the events of this service.
    pub async fn subscribe_state_variables(self: &Arc<Self>) -> Result<(), ConnectionError> {
        let connection = self
            .connection()
            .ok_or_else(|| ConnectionError::NotConnected(self.service_id().to_string()))?;
        connection.on_subscribe_events(self).await
    }

    pub async fn unsubscribe_state_variables(self: &Arc<Self>) -> Result<(), ConnectionError> {
        let connection = self
            .connection()
            .ok_or_else(|| ConnectionError::NotConnected(self.service_id().to_string()))?;
        connection.on_unsubscribe_events(self)
    }

    pub(crate) fn link(&self, connection: Weak<DeviceConnection>) {
        *self.connection.write() = connection;
    }

    pub(crate) fn unlink(&self) {
        *self.connection.write() = Weak::new();
    }

    pub(crate) fn state_variable_changed(&self, variable: Arc<CpStateVariable>, value: StateValue) {
        variable.update(value.clone());
        self.events
            .emit(ServiceEvent::StateVariableChanged { variable, value });
    }

    pub(crate) fn subscription_failed(&self, message: String) {
        self.events.emit(ServiceEvent::SubscriptionFailed(message));
    }
}

#[derive(Debug)]
pub struct CpDevice {
    device_type: String,
    version: u32,
    uuid: String,
    friendly_name: String,
    services: Vec<Arc<CpService>>,
    devices: Vec<Arc<CpDevice>>,
}

impl CpDevice {
    /// Builds the proxy of `device` and its embedded devices.
    pub fn build(
        root: &RootDescriptor,
        device: &DeviceDescriptor,
        resolver: Option<&DataTypeResolver>,
    ) -> Result<Arc<Self>, DescriptionError> {
        let uuid = device.uuid().ok_or(DescriptionError::MissingField("UDN"))?;
        let services = root
            .services_of(&uuid)
            .into_iter()
            .map(|sd| CpService::build(sd, resolver))
            .collect::<Result<Vec<_>, _>>()?;
        let devices = device
            .child_devices()
            .iter()
            .map(|child| Self::build(root, child, resolver))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Arc::new(Self {
            device_type: device
                .device_type()
                .ok_or(DescriptionError::MissingField("deviceType"))?,
            version: device.version().unwrap_or(1),
            friendly_name: device.friendly_name().unwrap_or_default(),
            uuid,
            services,
            devices,
        }))
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

    pub fn udn(&self) -> String {
        format!("uuid:{}", self.uuid)
    }

    pub fn friendly_name(&self) -> &str {
        &self.friendly_name
    }

    pub fn services(&self) -> &[Arc<CpService>] {
        &self.services
    }

    pub fn devices(&self) -> &[Arc<CpDevice>] {
        &self.devices
    }

    pub fn find_service(&self, urn: &str) -> Option<Arc<CpService>> {
        self.services
            .iter()
            .find(|s| s.service_type_version_urn() == urn)
            .cloned()
    }

    pub fn find_device(self: &Arc<Self>, uuid: &str) -> Option<Arc<CpDevice>> {
        if self.uuid == uuid {
            return Some(self.clone());
        }
        self.devices.iter().find_map(|d| d.find_device(uuid))
    }

    /// Services of this device and of its embedded devices, depth first.
    pub fn all_services(&self) -> Vec<Arc<CpService>> {
        let mut all = self.services.clone();
        for device in &self.devices {
            all.extend(device.all_services());
        }
        all
    }
}

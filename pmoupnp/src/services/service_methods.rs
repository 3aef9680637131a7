use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Weak},
};

use crossbeam_channel::{Receiver, unbounded};
use parking_lot::Mutex;
use tracing::debug;
use xmltree::{Element, XMLNode};

use crate::{
    UpnpObjectSet, UpnpObjectType, UpnpTyped, UpnpXml,
    object_trait::{spec_version_element, text_element},
    actions::Action,
    devices::Device,
    endpoints::EndpointConfiguration,
    services::{Service, ServiceError, StateVariableChanged},
    state_variables::StateVariable,
    variable_types::{DataType, StateValue},
};

const SCPD_NAMESPACE: &str = "urn:schemas-upnp-org:service-1-0";

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Service({}:{})", self.service_type, self.version)
    }
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("service_id", &self.object.name)
            .field("service_type", &self.service_type)
            .field("version", &self.version)
            .field("actions", &self.actions.len())
            .field("state_variables", &self.state_variables.len())
            .finish()
    }
}

impl UpnpTyped for Service {
    fn as_upnp_object_type(&self) -> &UpnpObjectType {
        &self.object
    }
}

impl Service {
    /// Crée un service.
    ///
    /// # Arguments
    ///
    /// * `service_type` - Type sans préfixe `urn:` ni version
    ///   (ex: `schemas-upnp-org:service:RenderingControl`)
    /// * `version` - Version du type de service, au moins 1
    /// * `service_id` - Identifiant unique dans le device
    ///   (ex: `urn:upnp-org:serviceId:RenderingControl`)
    pub fn new(service_type: &str, version: u32, service_id: &str) -> Result<Self, ServiceError> {
        if version == 0 {
            return Err(ServiceError::InvalidVersion);
        }

        Ok(Self {
            object: UpnpObjectType::new(service_id, "Service"),
            service_type: service_type.to_string(),
            version,
            actions: UpnpObjectSet::new(),
            state_variables: UpnpObjectSet::new(),
            device: Default::default(),
            subscribers: Mutex::new(Vec::new()),
        })
    }

    pub fn service_type(&self) -> &str {
        &self.service_type
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn service_id(&self) -> &str {
        self.get_name()
    }

    /// `urn:` + type + `:` + version
    pub fn service_type_version_urn(&self) -> String {
        format!("urn:{}:{}", self.service_type, self.version)
    }

    /// Vrai si le service répond à une demande pour `(service_type, version)` :
    /// même type et version au moins égale.
    pub fn is_compatible(&self, service_type: &str, version: u32) -> bool {
        self.service_type == service_type && self.version >= version
    }

    /// Ajoute une variable d'état à la table du service.
    pub fn add_state_variable(
        self: &Arc<Self>,
        variable: Arc<StateVariable>,
    ) -> Result<(), ServiceError> {
        if self.state_variables.contains(variable.get_name()) {
            return Err(crate::UpnpObjectSetError::AlreadyExists(
                variable.get_name().to_string(),
            )
            .into());
        }
        variable.attach_to_service(self)?;
        self.state_variables.insert(variable)?;
        Ok(())
    }

    /// Ajoute une action. Chaque argument doit être lié à une variable
    /// d'état déjà présente dans la table du service.
    pub fn add_action(self: &Arc<Self>, action: Arc<Action>) -> Result<(), ServiceError> {
        if self.actions.contains(action.get_name()) {
            return Err(crate::UpnpObjectSetError::AlreadyExists(
                action.get_name().to_string(),
            )
            .into());
        }

        for arg in action.arguments() {
            let related = arg.get_related_state_variable();
            let known = self
                .state_variables
                .get_by_name(related.get_name())
                .is_some_and(|v| Arc::ptr_eq(&v, related));
            if !known {
                return Err(ServiceError::UnknownStateVariable {
                    action: action.get_name().to_string(),
                    variable: related.get_name().to_string(),
                });
            }
        }

        action.attach_to_service(self)?;
        self.actions.insert(action)?;
        Ok(())
    }

    pub fn get_action(&self, name: &str) -> Option<Arc<Action>> {
        self.actions.get_by_name(name)
    }

    pub fn actions(&self) -> Vec<Arc<Action>> {
        self.actions.all()
    }

    pub fn get_state_variable(&self, name: &str) -> Option<Arc<StateVariable>> {
        self.state_variables.get_by_name(name)
    }

    pub fn state_variables(&self) -> Vec<Arc<StateVariable>> {
        self.state_variables.all()
    }

    pub fn get_device(&self) -> Option<Arc<Device>> {
        self.device.get().and_then(Weak::upgrade)
    }

    pub(crate) fn attach_to_device(&self, device: &Arc<Device>) -> Result<(), ServiceError> {
        self.device
            .set(Arc::downgrade(device))
            .map_err(|_| ServiceError::AlreadyAttached(self.service_id().to_string()))
    }

    /// S'abonne aux changements de valeur des variables du service.
    pub fn subscribe_changes(&self) -> Receiver<StateVariableChanged> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    pub(crate) fn on_state_variable_changed(
        &self,
        variable: &StateVariable,
        value: Option<StateValue>,
    ) {
        let event = StateVariableChanged {
            service_id: self.service_id().to_string(),
            variable: variable.get_name().to_string(),
            value,
        };
        debug!(
            "🔄 {} changed on service {}",
            event.variable, event.service_id
        );
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Préfixes de namespace des types étendus : un par schéma distinct,
    /// dans l'ordre de la table des variables.
    fn extended_type_prefixes(&self) -> Vec<(String, String)> {
        let mut prefixes: Vec<(String, String)> = Vec::new();
        for var in self.state_variables.all() {
            if let DataType::Extended(t) = var.data_type() {
                let uri = t.schema_uri().to_string();
                if !prefixes.iter().any(|(u, _)| *u == uri) {
                    let prefix = format!("dt{}", prefixes.len());
                    prefixes.push((uri, prefix));
                }
            }
        }
        prefixes
    }

    /// Document SCPD complet (`<scpd>`).
    pub fn build_scpd_document(
        &self,
        config: &EndpointConfiguration,
    ) -> Result<Element, ServiceError> {
        let mut root = Element::new("scpd");
        root.attributes
            .insert("xmlns".to_string(), SCPD_NAMESPACE.to_string());
        root.attributes
            .insert("configId".to_string(), config.config_id().to_string());

        let prefixes = self.extended_type_prefixes();
        for (uri, prefix) in &prefixes {
            root.attributes
                .insert(format!("xmlns:{}", prefix), uri.clone());
        }
        let ns_prefixes: HashMap<String, String> = prefixes.into_iter().collect();

        root.children
            .push(XMLNode::Element(spec_version_element()));

        let actions = self.actions.all();
        if !actions.is_empty() {
            let mut action_list = Element::new("actionList");
            for action in actions {
                action_list
                    .children
                    .push(XMLNode::Element(action.to_xml_element()));
            }
            root.children.push(XMLNode::Element(action_list));
        }

        let mut state_table = Element::new("serviceStateTable");
        for var in self.state_variables.all() {
            state_table
                .children
                .push(XMLNode::Element(var.to_scpd_element(&ns_prefixes)?));
        }
        root.children.push(XMLNode::Element(state_table));

        Ok(root)
    }

    /// Ajoute l'élément `<service>` de ce service à `parent` (`<serviceList>`).
    ///
    /// Les URLs proviennent du triplet enregistré pour ce service dans la
    /// configuration de l'interface qui reçoit la requête.
    pub fn add_device_description_for_service(
        &self,
        parent: &mut Element,
        config: &EndpointConfiguration,
    ) -> Result<(), ServiceError> {
        let urls = self
            .get_device()
            .and_then(|device| config.get_service_urls(device.uuid(), self.service_id()))
            .ok_or_else(|| ServiceError::MissingServiceUrls(self.service_id().to_string()))?;

        let mut elem = Element::new("service");
        for (name, text) in [
            ("serviceType", self.service_type_version_urn().as_str()),
            ("serviceId", self.service_id()),
            ("SCPDURL", urls.scpd_url.as_str()),
            ("controlURL", urls.control_url.as_str()),
            ("eventSubURL", urls.event_sub_url.as_str()),
        ] {
            elem.children.push(XMLNode::Element(text_element(name, text)));
        }

        parent.children.push(XMLNode::Element(elem));
        Ok(())
    }
}

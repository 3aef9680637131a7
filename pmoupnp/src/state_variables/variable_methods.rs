use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Weak},
    time::Duration,
};

use parking_lot::RwLock;
use tracing::trace;
use xmltree::{Element, XMLNode};

use crate::{
    UpnpObjectType, UpnpTyped,
    services::Service,
    state_variables::{StateVariable, StateVariableError},
    value_ranges::ValueRange,
    variable_types::{DataType, StateValue},
};

impl UpnpTyped for StateVariable {
    fn as_upnp_object_type(&self) -> &UpnpObjectType {
        &self.object
    }
}

impl fmt::Debug for StateVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateVariable")
            .field("name", &self.object.name)
            .field("data_type", &self.data_type.name())
            .field("value", &*self.value.read())
            .field("default_value", &self.default_value)
            .field("allowed_values", &self.allowed_values)
            .field("value_range", &self.value_range)
            .field("send_events", &self.send_events)
            .field("multicast", &self.multicast)
            .finish()
    }
}

impl StateVariable {
    pub fn new(name: &str, data_type: impl Into<DataType>) -> StateVariable {
        Self {
            object: UpnpObjectType::new(name, "StateVariable"),
            data_type: data_type.into(),
            value: RwLock::new(None),
            default_value: None,
            allowed_values: None,
            value_range: None,
            send_events: true,
            multicast: false,
            moderated_maximum_rate: None,
            moderated_minimum_delta: 0.0,
            service: Default::default(),
        }
    }

    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    pub fn get_default_value(&self) -> Option<&StateValue> {
        self.default_value.as_ref()
    }

    pub fn get_allowed_values(&self) -> Option<&[String]> {
        self.allowed_values.as_deref()
    }

    pub fn get_range(&self) -> Option<&ValueRange> {
        self.value_range.as_ref()
    }

    pub fn is_sending_events(&self) -> bool {
        self.send_events
    }

    pub fn is_multicast(&self) -> bool {
        self.multicast
    }

    pub fn moderated_maximum_rate(&self) -> Option<Duration> {
        self.moderated_maximum_rate
    }

    pub fn moderated_minimum_delta(&self) -> f64 {
        self.moderated_minimum_delta
    }

    /// Définit la valeur par défaut, qui devient aussi la valeur courante.
    pub fn set_default_value(&mut self, value: StateValue) -> Result<(), StateVariableError> {
        self.reject_extended()?;
        self.validate(Some(&value))?;
        *self.value.get_mut() = Some(value.clone());
        self.default_value = Some(value);
        Ok(())
    }

    /// Restreint la variable à une liste de chaînes (`<allowedValueList>`).
    pub fn set_allowed_values(&mut self, values: &[&str]) -> Result<(), StateVariableError> {
        self.reject_extended()?;
        if self.value_range.is_some() {
            return Err(StateVariableError::ConflictingConstraints(
                self.get_name().to_string(),
            ));
        }
        if !self.data_type.is_assignable_from(&StateValue::String(String::new())) {
            return Err(StateVariableError::TypeMismatch(self.get_name().to_string()));
        }
        self.allowed_values = Some(values.iter().map(|v| v.to_string()).collect());
        Ok(())
    }

    /// Restreint la variable à une plage numérique (`<allowedValueRange>`).
    pub fn set_range(&mut self, range: ValueRange) -> Result<(), StateVariableError> {
        self.reject_extended()?;
        if self.allowed_values.is_some() {
            return Err(StateVariableError::ConflictingConstraints(
                self.get_name().to_string(),
            ));
        }
        if !self.data_type.is_assignable_from(range.get_minimum()) {
            return Err(StateVariableError::TypeMismatch(self.get_name().to_string()));
        }
        self.value_range = Some(range);
        Ok(())
    }

    pub fn set_send_events(&mut self, send_events: bool) {
        self.send_events = send_events;
    }

    pub fn set_multicast(&mut self, multicast: bool) {
        self.multicast = multicast;
    }

    /// Politique de modération des événements (UDA 1.1 §4.3).
    pub fn set_moderation(&mut self, maximum_rate: Option<Duration>, minimum_delta: f64) {
        self.moderated_maximum_rate = maximum_rate;
        self.moderated_minimum_delta = minimum_delta;
    }

    /// Vérifie qu'une valeur respecte le type et les contraintes de la variable.
    pub fn validate(&self, value: Option<&StateValue>) -> Result<(), StateVariableError> {
        let name = self.get_name();

        if !self.data_type.is_value_assignable(value) {
            return Err(StateVariableError::TypeMismatch(name.to_string()));
        }

        let Some(value) = value else {
            return Ok(());
        };

        if let Some(range) = &self.value_range
            && !range.is_value_in_range(value)
        {
            return Err(StateVariableError::OutOfRange(name.to_string()));
        }

        if let Some(allowed) = &self.allowed_values {
            let text = value.to_string();
            if !allowed.iter().any(|a| *a == text) {
                return Err(StateVariableError::NotAllowed(name.to_string()));
            }
        }

        Ok(())
    }

    pub fn get_value(&self) -> Option<StateValue> {
        self.value.read().clone()
    }

    /// Change la valeur courante.
    ///
    /// La valeur est validée avant d'être enregistrée : en cas d'échec la
    /// valeur précédente est conservée. En cas de succès, le service
    /// propriétaire reçoit une unique notification de changement.
    pub fn set_value(&self, value: Option<StateValue>) -> Result<(), StateVariableError> {
        self.validate(value.as_ref())?;

        {
            let mut current = self.value.write();
            *current = value.clone();
        }

        trace!("State variable {} set to {:?}", self.get_name(), value);

        if let Some(service) = self.get_service() {
            service.on_state_variable_changed(self, value);
        }
        Ok(())
    }

    pub fn get_service(&self) -> Option<Arc<Service>> {
        self.service.get().and_then(Weak::upgrade)
    }

    pub(crate) fn attach_to_service(&self, service: &Arc<Service>) -> Result<(), StateVariableError> {
        self.service
            .set(Arc::downgrade(service))
            .map_err(|_| StateVariableError::AlreadyAttached(self.get_name().to_string()))
    }

    /// Fragment `<stateVariable>` d'un SCPD.
    ///
    /// `ns_prefixes` associe chaque schéma de type étendu au préfixe
    /// déclaré sur `<scpd>`.
    pub fn to_scpd_element(
        &self,
        ns_prefixes: &HashMap<String, String>,
    ) -> Result<Element, StateVariableError> {
        let mut root = Element::new("stateVariable");
        root.attributes.insert(
            "sendEvents".to_string(),
            yes_no(self.send_events).to_string(),
        );
        root.attributes.insert(
            "multicast".to_string(),
            yes_no(self.multicast).to_string(),
        );

        let mut name_elem = Element::new("name");
        name_elem
            .children
            .push(XMLNode::Text(self.get_name().to_string()));
        root.children.push(XMLNode::Element(name_elem));

        root.children.push(XMLNode::Element(
            self.data_type.scpd_data_type_element(ns_prefixes)?,
        ));

        if let Some(default) = &self.default_value {
            let mut def_elem = Element::new("defaultValue");
            def_elem
                .children
                .push(XMLNode::Text(self.data_type.to_simple_string(default)?));
            root.children.push(XMLNode::Element(def_elem));
        }

        if let Some(allowed) = &self.allowed_values {
            let mut list_elem = Element::new("allowedValueList");
            for val in allowed {
                let mut val_elem = Element::new("allowedValue");
                val_elem.children.push(XMLNode::Text(val.clone()));
                list_elem.children.push(XMLNode::Element(val_elem));
            }
            root.children.push(XMLNode::Element(list_elem));
        }

        if let Some(range) = &self.value_range {
            root.children.push(XMLNode::Element(range.to_xml_element()));
        }

        Ok(root)
    }

    fn reject_extended(&self) -> Result<(), StateVariableError> {
        if self.data_type.is_extended() {
            Err(StateVariableError::ExtendedTypeConstraint(
                self.get_name().to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable_types::{StateVarType, XmlDocumentDataType};

    fn volume() -> StateVariable {
        let mut var = StateVariable::new("Volume", StateVarType::UI2);
        var.set_range(
            ValueRange::new(&StateValue::UI2(0), &StateValue::UI2(100))
                .unwrap()
                .with_step(&StateValue::UI2(1))
                .unwrap(),
        )
        .unwrap();
        var.set_default_value(StateValue::UI2(20)).unwrap();
        var
    }

    #[test]
    fn test_set_value_validates_before_commit() {
        let var = volume();
        assert_eq!(var.get_value(), Some(StateValue::UI2(20)));

        assert_eq!(
            var.set_value(Some(StateValue::UI2(150))),
            Err(StateVariableError::OutOfRange("Volume".to_string()))
        );
        assert_eq!(
            var.set_value(Some(StateValue::from("loud"))),
            Err(StateVariableError::TypeMismatch("Volume".to_string()))
        );
        assert_eq!(var.get_value(), Some(StateValue::UI2(20)));

        var.set_value(Some(StateValue::UI2(42))).unwrap();
        assert_eq!(var.get_value(), Some(StateValue::UI2(42)));

        var.set_value(None).unwrap();
        assert_eq!(var.get_value(), None);
    }

    #[test]
    fn test_allowed_values() {
        let mut var = StateVariable::new("TransportState", StateVarType::String);
        var.set_allowed_values(&["STOPPED", "PLAYING"]).unwrap();
        assert!(var.set_value(Some(StateValue::from("PLAYING"))).is_ok());
        assert_eq!(
            var.set_value(Some(StateValue::from("PAUSED"))),
            Err(StateVariableError::NotAllowed("TransportState".to_string()))
        );
        let range = ValueRange::new(&StateValue::UI1(0), &StateValue::UI1(1)).unwrap();
        assert!(matches!(
            var.set_range(range),
            Err(StateVariableError::ConflictingConstraints(_))
        ));
    }

    #[test]
    fn test_extended_type_rejects_constraints() {
        let mut var = StateVariable::new(
            "A_ARG_TYPE_Result",
            DataType::extended(XmlDocumentDataType::new("urn:test", "Doc", "Doc")),
        );
        assert!(matches!(
            var.set_default_value(StateValue::from("x")),
            Err(StateVariableError::ExtendedTypeConstraint(_))
        ));
        assert!(matches!(
            var.set_allowed_values(&["x"]),
            Err(StateVariableError::ExtendedTypeConstraint(_))
        ));
    }

    #[test]
    fn test_scpd_fragment_order() {
        let mut var = volume();
        var.set_send_events(false);
        let elem = var.to_scpd_element(&HashMap::new()).unwrap();
        assert_eq!(elem.attributes.get("sendEvents").map(String::as_str), Some("no"));
        assert_eq!(elem.attributes.get("multicast").map(String::as_str), Some("no"));
        let names: Vec<_> = elem
            .children
            .iter()
            .filter_map(|n| n.as_element())
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(
            names,
            vec!["name", "dataType", "defaultValue", "allowedValueRange"]
        );
    }

    #[test]
    fn test_default_value_roundtrip_for_every_standard_type() {
        for t in StateVarType::all() {
            let mut var = StateVariable::new("V", *t);
            var.set_default_value(t.default_value()).unwrap();
            let data_type = var.data_type().clone();
            let default = var.get_default_value().unwrap();

            let mut parent = Element::new("V");
            data_type.soap_serialize_value(default, false, &mut parent).unwrap();
            let back = data_type.soap_deserialize_value(&parent, false).unwrap();
            assert_eq!(&back, default, "round-trip failed for {}", t);
        }
    }
}

use std::sync::{Arc, Weak};

use xmltree::{Element, XMLNode};

use crate::{
    UpnpObjectType, UpnpTyped, UpnpXml,
    actions::{Action, ActionError, Argument, ArgumentDirection},
    state_variables::StateVariable,
    variable_types::StateValue,
};

impl UpnpTyped for Argument {
    fn as_upnp_object_type(&self) -> &UpnpObjectType {
        &self.object
    }
}

impl UpnpXml for Argument {
    fn to_xml_element(&self) -> Element {
        let mut elem = Element::new("argument");

        let mut name_elem = Element::new("name");
        name_elem
            .children
            .push(XMLNode::Text(self.get_name().to_string()));
        elem.children.push(XMLNode::Element(name_elem));

        let mut dir_elem = Element::new("direction");
        dir_elem.children.push(XMLNode::Text(
            match self.direction {
                ArgumentDirection::In => "in",
                ArgumentDirection::Out => "out",
            }
            .to_string(),
        ));
        elem.children.push(XMLNode::Element(dir_elem));

        if self.is_return_value {
            elem.children.push(XMLNode::Element(Element::new("retval")));
        }

        let mut rel_elem = Element::new("relatedStateVariable");
        rel_elem.children.push(XMLNode::Text(
            self.state_variable.get_name().to_string(),
        ));
        elem.children.push(XMLNode::Element(rel_elem));

        elem
    }
}

impl Argument {
    pub fn new(name: &str, direction: ArgumentDirection, state_variable: Arc<StateVariable>) -> Self {
        Self {
            object: UpnpObjectType::new(name, "Argument"),
            direction,
            state_variable,
            is_return_value: false,
            action: Default::default(),
        }
    }

    pub fn new_in(name: &str, state_variable: Arc<StateVariable>) -> Self {
        Self::new(name, ArgumentDirection::In, state_variable)
    }

    pub fn new_out(name: &str, state_variable: Arc<StateVariable>) -> Self {
        Self::new(name, ArgumentDirection::Out, state_variable)
    }

    /// Marque un argument de sortie comme valeur de retour (`<retval/>`).
    pub fn as_return_value(mut self) -> Self {
        self.is_return_value = self.direction == ArgumentDirection::Out;
        self
    }

    pub fn direction(&self) -> ArgumentDirection {
        self.direction
    }

    pub fn is_in(&self) -> bool {
        self.direction == ArgumentDirection::In
    }

    pub fn is_out(&self) -> bool {
        self.direction == ArgumentDirection::Out
    }

    pub fn is_return_value(&self) -> bool {
        self.is_return_value
    }

    pub fn get_related_state_variable(&self) -> &Arc<StateVariable> {
        &self.state_variable
    }

    /// Vrai si `value` a le type de la variable d'état liée.
    pub fn is_value_assignable(&self, value: &StateValue) -> bool {
        self.state_variable.data_type().is_assignable_from(value)
    }

    pub fn get_action(&self) -> Option<Arc<Action>> {
        self.action.get().and_then(Weak::upgrade)
    }

    pub(crate) fn attach_to_action(&self, action: &Arc<Action>) -> Result<(), ActionError> {
        self.action
            .set(Arc::downgrade(action))
            .map_err(|_| ActionError::AlreadyAttached(self.get_name().to_string()))
    }
}

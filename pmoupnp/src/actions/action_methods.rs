use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Weak},
};

use parking_lot::RwLock;
use tracing::warn;
use xmltree::{Element, XMLNode};

use crate::{
    UpnpError, UpnpObjectType, UpnpTyped, UpnpXml,
    actions::{Action, ActionError, ActionHandler, Argument, CallContext},
    services::Service,
    variable_types::StateValue,
};

impl UpnpTyped for Action {
    fn as_upnp_object_type(&self) -> &UpnpObjectType {
        &self.object
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.object.name)
            .field("in_arguments", &*self.in_arguments.read())
            .field("out_arguments", &*self.out_arguments.read())
            .field("has_handler", &self.handler.read().is_some())
            .finish()
    }
}

impl UpnpXml for Action {
    /// Fragment `<action>` : le nom, puis tous les arguments d'entrée suivis
    /// de tous les arguments de sortie.
    fn to_xml_element(&self) -> Element {
        let mut elem = Element::new("action");

        let mut name_elem = Element::new("name");
        name_elem
            .children
            .push(XMLNode::Text(self.get_name().to_string()));
        elem.children.push(XMLNode::Element(name_elem));

        let arguments = self.arguments();
        if !arguments.is_empty() {
            let mut list = Element::new("argumentList");
            for arg in arguments {
                list.children.push(XMLNode::Element(arg.to_xml_element()));
            }
            elem.children.push(XMLNode::Element(list));
        }

        elem
    }
}

impl Action {
    pub fn new(name: &str) -> Self {
        Self {
            object: UpnpObjectType::new(name, "Action"),
            in_arguments: RwLock::new(Vec::new()),
            out_arguments: RwLock::new(Vec::new()),
            handler: RwLock::new(None),
            service: Default::default(),
        }
    }

    /// Ajoute un argument, dans l'ordre de déclaration.
    pub fn add_argument(self: &Arc<Self>, argument: Arc<Argument>) -> Result<(), ActionError> {
        let name = argument.get_name().to_string();
        if self.get_argument(&name).is_some() {
            return Err(ActionError::ArgumentAlreadyExists(name));
        }

        if argument.is_in() {
            if !self.out_arguments.read().is_empty() {
                return Err(ActionError::InputAfterOutput(name));
            }
        } else if argument.is_return_value() && !self.out_arguments.read().is_empty() {
            return Err(ActionError::ReturnValueNotFirst(name));
        }

        argument.attach_to_action(self)?;

        if argument.is_in() {
            self.in_arguments.write().push(argument);
        } else {
            self.out_arguments.write().push(argument);
        }
        Ok(())
    }

    pub fn in_arguments(&self) -> Vec<Arc<Argument>> {
        self.in_arguments.read().clone()
    }

    pub fn out_arguments(&self) -> Vec<Arc<Argument>> {
        self.out_arguments.read().clone()
    }

    /// Tous les arguments : entrées puis sorties.
    pub fn arguments(&self) -> Vec<Arc<Argument>> {
        let mut all = self.in_arguments();
        all.extend(self.out_arguments());
        all
    }

    pub fn get_argument(&self, name: &str) -> Option<Arc<Argument>> {
        self.arguments().into_iter().find(|a| a.get_name() == name)
    }

    pub fn set_handler(&self, handler: ActionHandler) {
        *self.handler.write() = Some(handler);
    }

    pub fn has_handler(&self) -> bool {
        self.handler.read().is_some()
    }

    pub fn get_service(&self) -> Option<Arc<Service>> {
        self.service.get().and_then(Weak::upgrade)
    }

    pub(crate) fn attach_to_service(&self, service: &Arc<Service>) -> Result<(), ActionError> {
        self.service
            .set(Arc::downgrade(service))
            .map_err(|_| ActionError::AlreadyAttached(self.get_name().to_string()))
    }

    /// Vrai si `params` a autant d'éléments que d'arguments d'entrée et si
    /// chaque valeur est assignable au type de l'argument correspondant.
    pub fn matches_signature(&self, params: &[StateValue]) -> bool {
        let in_arguments = self.in_arguments.read();
        in_arguments.len() == params.len()
            && in_arguments
                .iter()
                .zip(params)
                .all(|(arg, value)| arg.is_value_assignable(value))
    }

    /// Invoque le handler de l'action.
    ///
    /// # Errors
    ///
    /// * 402 si la signature est vérifiée et ne correspond pas
    /// * 602 si aucun handler n'est lié
    /// * 501 si le handler panique ou ne retourne pas autant de valeurs que
    ///   d'arguments de sortie
    /// * l'erreur retournée par le handler sinon
    pub fn invoke_action(
        &self,
        params: &[StateValue],
        check_signature: bool,
        ctx: &CallContext,
    ) -> Result<Vec<StateValue>, UpnpError> {
        if check_signature && !self.matches_signature(params) {
            return Err(UpnpError::invalid_args());
        }

        let Some(handler) = self.handler.read().clone() else {
            return Err(UpnpError::not_implemented());
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(self, params, ctx)));

        match outcome {
            Ok(Ok(out)) => {
                let expected = self.out_arguments.read().len();
                if out.len() != expected {
                    warn!(
                        "⚠️ Action {} returned {} values, {} expected",
                        self.get_name(),
                        out.len(),
                        expected
                    );
                    return Err(UpnpError::action_failed("Action Failed"));
                }
                Ok(out)
            }
            Ok(Err(err)) => Err(err),
            Err(_) => {
                warn!("❌ Handler of action {} panicked", self.get_name());
                Err(UpnpError::action_failed("Action Failed"))
            }
        }
    }
}

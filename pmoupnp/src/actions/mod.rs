//! Actions UPnP et leurs arguments.
//!
//! Une [`Action`] déclare ses arguments d'entrée puis de sortie, dans
//! l'ordre qui fixe la convention d'appel sur le fil. Chaque [`Argument`]
//! est typé par une variable d'état du service.

mod action_handler;
mod action_methods;
mod argument_methods;
mod errors;

use std::sync::{Arc, OnceLock, Weak};

use parking_lot::RwLock;

pub use action_handler::{ActionHandler, CallContext};
pub use errors::ActionError;

use crate::{UpnpObjectType, services::Service, state_variables::StateVariable};

/// Sens d'un argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentDirection {
    In,
    Out,
}

#[derive(Debug)]
pub struct Argument {
    object: UpnpObjectType,
    direction: ArgumentDirection,
    state_variable: Arc<StateVariable>,
    is_return_value: bool,
    action: OnceLock<Weak<Action>>,
}

pub struct Action {
    object: UpnpObjectType,
    in_arguments: RwLock<Vec<Arc<Argument>>>,
    out_arguments: RwLock<Vec<Arc<Argument>>>,
    handler: RwLock<Option<ActionHandler>>,
    service: OnceLock<Weak<Service>>,
}

//! Services UPnP.
//!
//! Un [`Service`] regroupe les actions et la table des variables d'état
//! d'un type de service (`schemas-upnp-org:service:RenderingControl`,
//! version 1...). Il produit son document SCPD et sa part de la
//! description du device.

mod errors;
mod service_methods;

use std::sync::{OnceLock, Weak};

use crossbeam_channel::Sender;
use parking_lot::Mutex;

pub use errors::ServiceError;

use crate::{
    UpnpObjectSet, UpnpObjectType, actions::Action, devices::Device,
    state_variables::StateVariable, variable_types::StateValue,
};

/// Notification émise à chaque changement validé d'une variable d'état.
#[derive(Debug, Clone, PartialEq)]
pub struct StateVariableChanged {
    pub service_id: String,
    pub variable: String,
    pub value: Option<StateValue>,
}

pub struct Service {
    object: UpnpObjectType,
    service_type: String,
    version: u32,
    actions: UpnpObjectSet<Action>,
    state_variables: UpnpObjectSet<StateVariable>,
    device: OnceLock<Weak<Device>>,
    subscribers: Mutex<Vec<Sender<StateVariableChanged>>>,
}

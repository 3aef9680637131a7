//! Variables d'état UPnP (`<stateVariable>`).
//!
//! Une variable porte un [`DataType`], une valeur courante et ses
//! contraintes (valeur par défaut, liste de valeurs autorisées ou plage).
//! Elle est rattachée une seule fois à son [`Service`](crate::services::Service),
//! qu'elle notifie à chaque changement de valeur validé.

mod errors;
mod variable_methods;

use std::{
    sync::{OnceLock, Weak},
    time::Duration,
};

use parking_lot::RwLock;

pub use errors::StateVariableError;

use crate::{
    UpnpObjectType, services::Service, value_ranges::ValueRange,
    variable_types::{DataType, StateValue},
};

pub struct StateVariable {
    object: UpnpObjectType,
    data_type: DataType,
    value: RwLock<Option<StateValue>>,
    default_value: Option<StateValue>,
    allowed_values: Option<Vec<String>>,
    value_range: Option<ValueRange>,
    send_events: bool,
    multicast: bool,
    moderated_maximum_rate: Option<Duration>,
    moderated_minimum_delta: f64,
    service: OnceLock<Weak<Service>>,
}

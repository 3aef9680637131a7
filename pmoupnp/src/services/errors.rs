use thiserror::Error;

use crate::{
    UpnpObjectSetError, actions::ActionError, state_variables::StateVariableError,
    variable_types::StateValueError,
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    #[error("Service version must be > 0")]
    InvalidVersion,

    #[error("Action '{action}' references state variable '{variable}' unknown to the service")]
    UnknownStateVariable { action: String, variable: String },

    #[error("No URLs registered for service '{0}' on this endpoint")]
    MissingServiceUrls(String),

    #[error("Service '{0}' is already attached to a device")]
    AlreadyAttached(String),

    #[error(transparent)]
    Duplicate(#[from] UpnpObjectSetError),

    #[error(transparent)]
    Action(#[from] ActionError),

    #[error(transparent)]
    StateVariable(#[from] StateVariableError),

    #[error(transparent)]
    Value(#[from] StateValueError),
}

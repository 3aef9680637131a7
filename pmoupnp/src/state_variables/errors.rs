use thiserror::Error;

use crate::variable_types::StateValueError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateVariableError {
    /// Contrainte interdite sur un type étendu (valeur par défaut, liste, plage)
    #[error("Variable '{0}' has an extended data type: no default value or allowed values")]
    ExtendedTypeConstraint(String),

    #[error("Value is not assignable to variable '{0}'")]
    TypeMismatch(String),

    #[error("Value out of range for variable '{0}'")]
    OutOfRange(String),

    #[error("Value not allowed for variable '{0}'")]
    NotAllowed(String),

    #[error("Variable '{0}' cannot have both an allowed value list and a range")]
    ConflictingConstraints(String),

    #[error("Variable '{0}' is already attached to a service")]
    AlreadyAttached(String),

    #[error(transparent)]
    Value(#[from] StateValueError),
}

//! Erreurs relatives aux devices UPnP.

use thiserror::Error;

use crate::{UpnpObjectSetError, services::ServiceError};

/// Erreurs liées aux devices UPnP.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    /// Version invalide
    #[error("Device version must be > 0")]
    InvalidVersion,

    /// UDN déjà présent dans l'arbre
    #[error("Device '{0}' already exists in the device tree")]
    DeviceAlreadyExists(String),

    #[error("Device '{0}' is already attached")]
    AlreadyAttached(String),

    /// Seul un device racine produit un document de description
    #[error("Device '{0}' is not a root device")]
    NotRootDevice(String),

    #[error(transparent)]
    Duplicate(#[from] UpnpObjectSetError),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

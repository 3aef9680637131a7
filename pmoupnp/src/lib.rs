//! # pmoupnp - Modèle UPnP côté device
//!
//! Arbre description/invocation d'un device UPnP : types de données,
//! variables d'état, actions, services et devices, génération des
//! documents de description (UDA 1.1), dispatch SOAP des appels
//! d'actions et hébergement HTTP des documents.
//!
//! ## Architecture
//!
//! - [`variable_types`] : types standards UPnP et types étendus
//! - [`state_variables`] : variables d'état et leurs contraintes
//! - [`actions`] : arguments, actions et invocation
//! - [`services`] : services et documents SCPD
//! - [`devices`] : arbre de devices et description racine
//! - [`endpoints`] : URLs spécifiques à chaque interface locale
//! - [`soap`] : enveloppes SOAP, côté device et côté control point
//! - [`upnp_server`] : serveur HTTP (axum) des descriptions et du contrôle

mod object_set;
mod object_trait;

pub mod actions;
pub mod config_ext;
pub mod devices;
pub mod endpoints;
pub mod services;
pub mod soap;
pub mod state_variables;
pub mod upnp_server;
pub mod value_ranges;
pub mod variable_types;

use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;
use thiserror::Error;

pub use crate::config_ext::{ServerSettings, UpnpConfigExt};
pub use crate::object_trait::*;
pub use crate::soap::error_codes;
pub use crate::upnp_server::UpnpServer;

/// Nom et nature d'un objet UPnP (variable, argument, action...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpnpObjectType {
    name: String,
    object_type: String,
}

impl UpnpObjectType {
    pub fn new(name: &str, object_type: &str) -> Self {
        Self {
            name: name.to_string(),
            object_type: object_type.to_string(),
        }
    }
}

/// Ensemble d'objets indexés par nom, qui conserve l'ordre d'insertion.
///
/// L'ordre fait partie du contrat filaire : il fixe l'ordre des éléments
/// dans les documents de description.
#[derive(Debug)]
pub struct UpnpObjectSet<T: UpnpTyped> {
    objects: RwLock<HashMap<String, Arc<T>>>,
    order: RwLock<Vec<String>>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UpnpObjectSetError {
    #[error("Object '{0}' already exists")]
    AlreadyExists(String),
}

/// Erreur protocolaire UPnP `{code, description}` (`<UPnPError>`).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("UPnP error {code}: {description}")]
pub struct UpnpError {
    pub code: u32,
    pub description: String,
}

impl UpnpError {
    pub fn new(code: u32, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
        }
    }

    pub fn invalid_action() -> Self {
        Self::new(error_codes::INVALID_ACTION, "Invalid Action")
    }

    pub fn invalid_args() -> Self {
        Self::new(error_codes::INVALID_ARGS, "Invalid Args")
    }

    pub fn action_failed(description: impl Into<String>) -> Self {
        Self::new(error_codes::ACTION_FAILED, description)
    }

    pub fn not_implemented() -> Self {
        Self::new(
            error_codes::OPTIONAL_ACTION_NOT_IMPLEMENTED,
            "Optional Action Not Implemented",
        )
    }
}

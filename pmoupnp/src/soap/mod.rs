//! # Module SOAP - Simple Object Access Protocol
//!
//! Encodage et décodage des enveloppes SOAP des appels d'actions UPnP,
//! des deux côtés du protocole.
//!
//! ## Fonctionnalités
//!
//! - ✅ Parsing d'enveloppes SOAP et extraction de l'action
//! - ✅ Construction de requêtes, réponses et SOAP Faults
//! - ✅ Dispatch d'un appel entrant sur un [`Service`](crate::services::Service)
//! - ✅ Encodage d'un appel et décodage de son résultat côté control point
//!
//! ## Example
//!
//! ```ignore
//! use pmoupnp::soap::parse_soap_action;
//!
//! let body = r#"<?xml version="1.0"?>
//! <s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
//!   <s:Body>
//!     <u:Play xmlns:u="urn:schemas-upnp-org:service:AVTransport:1">
//!       <InstanceID>0</InstanceID>
//!       <Speed>1</Speed>
//!     </u:Play>
//!   </s:Body>
//! </s:Envelope>"#;
//!
//! let action = parse_soap_action(body.as_bytes()).unwrap();
//! assert_eq!(action.name, "Play");
//! assert_eq!(action.arg_text("InstanceID").as_deref(), Some("0"));
//! ```

mod builder;
mod client;
mod fault;
mod handler;
mod parser;

pub use builder::{build_soap_request, build_soap_response};
pub use client::{encode_action_call, parse_action_result};
pub use fault::{SoapFault, build_soap_fault, parse_soap_fault};
pub use handler::{ControlResponse, handle_control_request};
pub use parser::{SoapAction, SoapEnvelope, SoapParseError, parse_soap_action, parse_soap_envelope};

use thiserror::Error;

use crate::variable_types::StateValueError;

pub(crate) const SOAP_ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub(crate) const SOAP_ENCODING: &str = "http://schemas.xmlsoap.org/soap/encoding/";
pub(crate) const UPNP_CONTROL_NS: &str = "urn:schemas-upnp-org:control-1-0";

/// Erreurs d'encodage/décodage d'un appel côté control point.
#[derive(Debug, Error)]
pub enum SoapError {
    #[error(transparent)]
    Parse(#[from] SoapParseError),

    #[error("Argument '{name}': {source}")]
    Value {
        name: String,
        source: StateValueError,
    },

    #[error("Missing out argument '{0}'")]
    MissingArgument(String),

    #[error("XML serialization failed: {0}")]
    Xml(#[from] xmltree::Error),
}

/// Codes d'erreur SOAP UPnP standards
pub mod error_codes {
    /// Action invalide
    pub const INVALID_ACTION: u32 = 401;

    /// Arguments invalides
    pub const INVALID_ARGS: u32 = 402;

    /// Action échouée
    pub const ACTION_FAILED: u32 = 501;

    /// Valeur d'argument invalide
    pub const ARGUMENT_VALUE_INVALID: u32 = 600;

    /// Argument hors limites
    pub const ARGUMENT_VALUE_OUT_OF_RANGE: u32 = 601;

    /// Action optionnelle non implémentée
    pub const OPTIONAL_ACTION_NOT_IMPLEMENTED: u32 = 602;

    /// Mémoire insuffisante
    pub const OUT_OF_MEMORY: u32 = 603;

    /// Intervention humaine requise
    pub const HUMAN_INTERVENTION_REQUIRED: u32 = 604;

    /// Argument sous forme de chaîne trop long
    pub const STRING_ARGUMENT_TOO_LONG: u32 = 605;
}

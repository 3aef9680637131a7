use pmoupnp::{UpnpError, soap::SoapError};
use thiserror::Error;

/// Failure of a single HTTP exchange.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Invalid request to {url}: {message}")]
    InvalidRequest { url: String, message: String },
    #[error("Request to {url} failed: {message}")]
    Request { url: String, message: String },
}

/// Failure while fetching or interpreting a description document.
#[derive(Error, Debug)]
pub enum DescriptionError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("GET {url} returned HTTP status {status}")]
    HttpStatus { url: String, status: u16 },
    #[error("GET {0} timed out")]
    Timeout(String),
    #[error("XML parsing error: {0}")]
    Xml(#[from] xmltree::ParseError),
    #[error("Missing required element: {0}")]
    MissingField(&'static str),
    #[error("Invalid URL '{0}'")]
    InvalidUrl(String),
    #[error("Device {0} not found in description")]
    UnknownDevice(String),
    #[error("Description of service {0} is not available")]
    ServiceNotReady(String),
    #[error("Invalid service description: {0}")]
    InvalidScpd(String),
    #[error("Fetch aborted")]
    Aborted,
}

/// Failure of an operation on a connected device.
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Service {0} is not connected to a network service")]
    NotConnected(String),
    #[error("Invalid arguments for action {0}")]
    InvalidArguments(String),
    #[error("Action {action} failed: {error}")]
    Protocol { action: String, error: UpnpError },
    #[error("Network error when invoking {action}: {message}")]
    Network {
        action: String,
        status: Option<u16>,
        message: String,
    },
    #[error("Action {0} timed out")]
    Timeout(String),
    #[error("Action {0} aborted")]
    Aborted(String),
    #[error("Service {0} is already subscribed to events")]
    AlreadySubscribed(String),
    #[error("Service {0} is not subscribed to events")]
    NotSubscribed(String),
    #[error("Event subscription of {service} failed: {message}")]
    Subscription { service: String, message: String },
    #[error("SOAP error on action {action}: {source}")]
    Soap { action: String, source: SoapError },
}

#[derive(Error, Debug)]
pub enum ControlPointError {
    #[error("Control point already started")]
    AlreadyStarted,
    #[error("Control point not started")]
    NotStarted,
    #[error("Root device {0} is not ready")]
    DescriptorNotReady(String),
    #[error("Device {0} is already connected")]
    AlreadyConnected(String),
    #[error(transparent)]
    Description(#[from] DescriptionError),
    #[error("Discovery failed: {0}")]
    Discovery(std::io::Error),
    #[error("Cannot bind NOTIFY listener on {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },
}

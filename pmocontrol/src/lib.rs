//! # pmocontrol - UPnP control point
//!
//! Discovers root devices, fetches their description documents, and lets
//! the application connect to a device to call its actions and receive its
//! events.
//!
//! ## Architecture
//!
//! - [`discovery`] : discovery source interface and its SSDP implementation
//! - [`network_tracker`] : description fetch pipeline per root device
//! - [`descriptors`] : root and service descriptors with their states
//! - [`device_tree`] : proxies of devices, services, actions and variables
//! - [`device_connection`] : SOAP action calls and event subscriptions
//! - [`control_point`] : control point and its GENA `NOTIFY` listener
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use pmocontrol::{ControlPointConfigExt, CpData, ReqwestTransport, SsdpDiscovery, UpnpControlPoint};
//!
//! let settings = pmoconfig::get_config().get_control_point_settings()?;
//! let cp_data = Arc::new(CpData::new(settings, Arc::new(ReqwestTransport::new())));
//! let control_point = UpnpControlPoint::new(cp_data, Arc::new(SsdpDiscovery::default()));
//! control_point.start().await?;
//! ```

mod events;

pub mod config_ext;
pub mod control_point;
pub mod cp_data;
pub mod descriptors;
pub mod device_connection;
pub mod device_tree;
pub mod discovery;
pub mod errors;
pub mod gena;
pub mod network_tracker;
pub mod transport;

pub use config_ext::{ControlPointConfigExt, ControlPointSettings};
pub use control_point::UpnpControlPoint;
pub use cp_data::CpData;
pub use descriptors::{
    DescriptorState, DeviceDescriptor, RootDescriptor, ServiceDescriptor, ServiceDescriptorState,
};
pub use device_connection::{ConnectionEvent, DeviceConnection};
pub use device_tree::{
    CpAction, CpArgument, CpDevice, CpService, CpStateVariable, DataTypeResolver, ServiceEvent,
};
pub use discovery::{
    DiscoveryController, DiscoveryEvent, LinkData, RootEntry, SsdpDiscovery, UpnpVersion,
};
pub use errors::{ConnectionError, ControlPointError, DescriptionError, TransportError};
pub use events::EventBus;
pub use network_tracker::{TrackerEvent, UpnpNetworkTracker};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};

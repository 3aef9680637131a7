//! Connection of the control point to one device.
//!
//! A [`DeviceConnection`] owns the proxy tree of the device, the action
//! calls in flight and the event subscriptions of its services. All of them
//! end when the connection is disconnected.

use std::{collections::HashMap, net::IpAddr, sync::Arc};

use parking_lot::Mutex;
use pmoupnp::{
    soap::{encode_action_call, parse_action_result, parse_soap_fault},
    variable_types::{DataType, StateValue},
};
use tokio::{task::AbortHandle, time::timeout};
use tracing::{debug, info, warn};

use crate::{
    cp_data::CpData,
    descriptors::RootDescriptor,
    device_tree::{CpAction, CpDevice, CpService, DataTypeResolver},
    errors::{ConnectionError, DescriptionError, TransportError},
    events::EventBus,
    gena::{GenaClientController, NotifyRequest},
    transport::{HttpRequest, HttpResponse, USER_AGENT, XML_CONTENT_TYPE},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Carries the device UUID
    DeviceDisconnected(String),
    DeviceRebooted(String),
}

struct ConnectionState {
    connected: bool,
    next_call_id: u64,
    pending_calls: HashMap<u64, AbortHandle>,
}

pub struct DeviceConnection {
    cp_data: Arc<CpData>,
    root: Arc<RootDescriptor>,
    device: Arc<CpDevice>,
    gena: Arc<GenaClientController>,
    force_simple: bool,
    state: Mutex<ConnectionState>,
    events: EventBus<ConnectionEvent>,
}

type CallOutcome = Result<Result<HttpResponse, TransportError>, tokio::time::error::Elapsed>;

/// Unregisters a pending call when the caller stops waiting for it,
/// whether the call completed or the caller's future was dropped.
struct PendingCall<'a> {
    state: &'a Mutex<ConnectionState>,
    call_id: u64,
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.state.lock().pending_calls.remove(&self.call_id) {
            handle.abort();
        }
    }
}

impl DeviceConnection {
    /// Builds the proxy of `device_uuid` from a ready root descriptor and
    /// links its services to the new connection.
    pub fn new(
        cp_data: Arc<CpData>,
        root: Arc<RootDescriptor>,
        device_uuid: &str,
        resolver: Option<&DataTypeResolver>,
    ) -> Result<Arc<Self>, DescriptionError> {
        let descriptor = root
            .find_device(device_uuid)
            .ok_or_else(|| DescriptionError::UnknownDevice(device_uuid.to_string()))?;
        let device = CpDevice::build(&root, &descriptor, resolver)?;

        let entry = root.entry();
        let force_simple = entry.upnp_version.requires_simple_values();
        let gena = GenaClientController::new(
            cp_data.clone(),
            entry.preferred_link.endpoint_ip,
            force_simple,
        );

        let connection = Arc::new(Self {
            cp_data,
            root,
            device,
            gena,
            force_simple,
            state: Mutex::new(ConnectionState {
                connected: true,
                next_call_id: 0,
                pending_calls: HashMap::new(),
            }),
            events: EventBus::new("device connection"),
        });
        for service in connection.device.all_services() {
            service.link(Arc::downgrade(&connection));
        }
        info!(
            device = connection.device.uuid(),
            "✅ Connected to {}",
            connection.device.friendly_name()
        );
        Ok(connection)
    }

    pub fn device(&self) -> &Arc<CpDevice> {
        &self.device
    }

    pub fn device_uuid(&self) -> &str {
        self.device.uuid()
    }

    pub fn root_descriptor(&self) -> &Arc<RootDescriptor> {
        &self.root
    }

    pub fn events(&self) -> &EventBus<ConnectionEvent> {
        &self.events
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    pub fn pending_call_count(&self) -> usize {
        self.state.lock().pending_calls.len()
    }

    pub fn notification_path(&self) -> &str {
        self.gena.notification_path()
    }

    pub fn endpoint_ip(&self) -> IpAddr {
        self.gena.endpoint_ip()
    }

    pub fn is_subscribed(&self, service: &CpService) -> bool {
        self.gena.is_subscribed(service)
    }

    fn owns(&self, service: &CpService) -> bool {
        service
            .connection()
            .is_some_and(|c| std::ptr::eq(Arc::as_ptr(&c), self))
    }

    /// Sends a SOAP request for `action` and decodes its out-arguments.
    ///
    /// The call is answered exactly once: with the decoded values, the
    /// fault returned by the device, a network or timeout error, or
    /// `Aborted` if the connection is closed meanwhile.
    pub async fn on_action_called(
        &self,
        action: &CpAction,
        params: Vec<StateValue>,
    ) -> Result<Vec<StateValue>, ConnectionError> {
        let name = action.name().to_string();
        let service = action
            .service()
            .filter(|s| self.owns(s))
            .ok_or_else(|| ConnectionError::NotConnected(name.clone()))?;
        if !action.matches_signature(&params) {
            return Err(ConnectionError::InvalidArguments(name));
        }

        let arguments: Vec<(&str, &DataType, &StateValue)> = action
            .in_arguments()
            .iter()
            .zip(&params)
            .map(|(arg, value)| (arg.name(), arg.data_type(), value))
            .collect();
        let urn = service.service_type_version_urn();
        let body = encode_action_call(&name, urn, &arguments, self.force_simple).map_err(
            |source| ConnectionError::Soap {
                action: name.clone(),
                source,
            },
        )?;

        let request = HttpRequest::new("POST", service.descriptor().control_url().as_str())
            .header("CONTENT-TYPE", XML_CONTENT_TYPE)
            .header("SOAPACTION", format!("\"{}#{}\"", urn, name))
            .header("USER-AGENT", USER_AGENT)
            .body(body)
            .bound_to(Some(self.endpoint_ip()));

        let transport = self.cp_data.transport().clone();
        let call_timeout = self.cp_data.settings().action_call_timeout;

        let (call_id, task) = {
            let mut state = self.state.lock();
            if !state.connected {
                return Err(ConnectionError::NotConnected(name));
            }
            let task = tokio::spawn(async move {
                timeout(call_timeout, transport.execute(request)).await
            });
            let call_id = state.next_call_id;
            state.next_call_id += 1;
            state.pending_calls.insert(call_id, task.abort_handle());
            (call_id, task)
        };

        let pending = PendingCall {
            state: &self.state,
            call_id,
        };
        let joined = task.await;
        drop(pending);

        let outcome: CallOutcome = match joined {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => {
                debug!(action = name.as_str(), "Action call aborted");
                return Err(ConnectionError::Aborted(name));
            }
            Err(e) => {
                return Err(ConnectionError::Network {
                    action: name,
                    status: None,
                    message: e.to_string(),
                });
            }
        };

        let response = match outcome {
            Err(_) => {
                warn!(action = name.as_str(), "⚠️ Action call timed out");
                return Err(ConnectionError::Timeout(name));
            }
            Ok(Err(e)) => {
                return Err(ConnectionError::Network {
                    action: name,
                    status: None,
                    message: e.to_string(),
                });
            }
            Ok(Ok(response)) => response,
        };

        self.decode_response(action, name, response)
    }

    fn decode_response(
        &self,
        action: &CpAction,
        name: String,
        response: HttpResponse,
    ) -> Result<Vec<StateValue>, ConnectionError> {
        match response.status {
            200 if response.is_xml() => {
                let out_arguments: Vec<(&str, &DataType)> = action
                    .out_arguments()
                    .iter()
                    .map(|arg| (arg.name(), arg.data_type()))
                    .collect();
                parse_action_result(&response.body, &name, &out_arguments)
                    .map_err(|source| ConnectionError::Soap { action: name, source })
            }
            200 => Err(ConnectionError::Network {
                action: name,
                status: Some(200),
                message: "response is not text/xml".to_string(),
            }),
            500 => match parse_soap_fault(&response.body) {
                Ok(fault) => Err(ConnectionError::Protocol {
                    action: name,
                    error: fault.into_upnp_error(),
                }),
                Err(e) => Err(ConnectionError::Network {
                    action: name,
                    status: Some(500),
                    message: e.to_string(),
                }),
            },
            status => Err(ConnectionError::Network {
                action: name,
                status: Some(status),
                message: format!("HTTP status {}", status),
            }),
        }
    }

    pub async fn on_subscribe_events(&self, service: &Arc<CpService>) -> Result<(), ConnectionError> {
        if !self.owns(service) {
            return Err(ConnectionError::NotConnected(service.service_id().to_string()));
        }
        self.gena.subscribe(service).await
    }

    pub fn on_unsubscribe_events(&self, service: &Arc<CpService>) -> Result<(), ConnectionError> {
        if !self.owns(service) {
            return Err(ConnectionError::NotConnected(service.service_id().to_string()));
        }
        self.gena.unsubscribe(service)
    }

    /// The device restarted with the same configuration: its subscriptions
    /// are renewed.
    pub async fn on_device_rebooted(&self) {
        if !self.is_connected() {
            return;
        }
        info!(device = self.device_uuid(), "🔄 Device rebooted, renewing subscriptions");
        self.gena.renew_all().await;
        self.events
            .emit(ConnectionEvent::DeviceRebooted(self.device_uuid().to_string()));
    }

    pub(crate) fn handle_notification(&self, request: &NotifyRequest) -> u16 {
        self.gena.handle_notification(request)
    }

    /// Aborts pending calls, drops subscriptions (optionally sending
    /// `UNSUBSCRIBE`) and unlinks the proxy tree, then raises
    /// `DeviceDisconnected`.
    pub fn disconnect(&self, unsubscribe: bool) {
        {
            let mut state = self.state.lock();
            if !state.connected {
                return;
            }
            state.connected = false;
            for (_, call) in state.pending_calls.drain() {
                call.abort();
            }
            self.gena.close(unsubscribe);
            for service in self.device.all_services() {
                service.unlink();
            }
        }
        info!(device = self.device_uuid(), "Disconnected");
        self.events
            .emit(ConnectionEvent::DeviceDisconnected(self.device_uuid().to_string()));
    }
}

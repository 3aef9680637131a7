//! Entry point of the control point.
//!
//! [`UpnpControlPoint`] ties the network tracker to the device connections
//! and hosts the HTTP listener receiving GENA `NOTIFY` requests.

use std::{
    net::{IpAddr, SocketAddr},
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Weak},
};

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri, header},
};
use parking_lot::Mutex;
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    cp_data::CpData,
    descriptors::{DescriptorState, RootDescriptor},
    device_connection::DeviceConnection,
    device_tree::DataTypeResolver,
    discovery::DiscoveryController,
    errors::ControlPointError,
    gena::NotifyRequest,
    network_tracker::{TrackerEvent, UpnpNetworkTracker},
};

struct NotifyListener {
    local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    join_handle: JoinHandle<()>,
}

pub struct UpnpControlPoint {
    cp_data: Arc<CpData>,
    tracker: Arc<UpnpNetworkTracker>,
    listener: Mutex<Option<NotifyListener>>,
}

impl UpnpControlPoint {
    pub fn new(cp_data: Arc<CpData>, discovery: Arc<dyn DiscoveryController>) -> Self {
        let tracker = UpnpNetworkTracker::new(cp_data.clone(), discovery);
        let weak: Weak<CpData> = Arc::downgrade(&cp_data);
        tracker.events().add_handler(move |event| {
            if let Some(cp_data) = weak.upgrade() {
                on_tracker_event(&cp_data, event);
            }
        });
        Self {
            cp_data,
            tracker,
            listener: Mutex::new(None),
        }
    }

    pub fn shared_control_point_data(&self) -> &Arc<CpData> {
        &self.cp_data
    }

    pub fn network_tracker(&self) -> &Arc<UpnpNetworkTracker> {
        &self.tracker
    }

    /// Address of the NOTIFY listener once started.
    pub fn notify_address(&self) -> Option<SocketAddr> {
        self.listener.lock().as_ref().map(|l| l.local_addr)
    }

    pub fn is_started(&self) -> bool {
        self.listener.lock().is_some()
    }

    /// Binds the NOTIFY listener, then starts tracking the network.
    pub async fn start(&self) -> Result<(), ControlPointError> {
        if self.is_started() {
            return Err(ControlPointError::AlreadyStarted);
        }

        let address = format!("0.0.0.0:{}", self.cp_data.settings().notify_port);
        let tcp = TcpListener::bind(&address)
            .await
            .map_err(|source| ControlPointError::Bind {
                address: address.clone(),
                source,
            })?;
        let local_addr = tcp
            .local_addr()
            .map_err(|source| ControlPointError::Bind { address, source })?;
        self.cp_data.set_notify_port(local_addr.port());

        let router = Router::new()
            .fallback(handle_notify)
            .with_state(self.cp_data.clone());
        let (shutdown, rx) = oneshot::channel();
        let join_handle = tokio::spawn(async move {
            let server = axum::serve(tcp, router).with_graceful_shutdown(async {
                let _ = rx.await;
            });
            if let Err(e) = server.await {
                warn!("❌ NOTIFY listener stopped with error: {}", e);
            }
        });

        {
            let mut listener = self.listener.lock();
            if listener.is_some() {
                let _ = shutdown.send(());
                return Err(ControlPointError::AlreadyStarted);
            }
            *listener = Some(NotifyListener {
                local_addr,
                shutdown,
                join_handle,
            });
        }
        info!("✅ NOTIFY listener on {}", local_addr);

        if let Err(e) = self.tracker.start().await {
            self.stop_listener().await;
            return Err(e);
        }
        Ok(())
    }

    /// Disconnects every device, stops tracking and closes the listener.
    pub async fn close(&self) {
        let connections: Vec<_> = self
            .cp_data
            .connections()
            .lock()
            .drain()
            .map(|(_, c)| c)
            .collect();
        for connection in connections {
            connection.disconnect(true);
        }
        self.tracker.close().await;
        self.stop_listener().await;
    }

    async fn stop_listener(&self) {
        let Some(listener) = self.listener.lock().take() else {
            return;
        };
        let _ = listener.shutdown.send(());
        if let Err(e) = listener.join_handle.await {
            debug!("NOTIFY listener task ended: {}", e);
        }
        self.cp_data.set_notify_port(0);
        info!("NOTIFY listener stopped");
    }

    /// Connects to device `device_uuid` of a ready root device.
    pub fn connect(
        &self,
        root: Arc<RootDescriptor>,
        device_uuid: &str,
        resolver: Option<DataTypeResolver>,
    ) -> Result<Arc<DeviceConnection>, ControlPointError> {
        if !self.is_started() {
            return Err(ControlPointError::NotStarted);
        }

        // Root removal invalidates the descriptor before taking this lock.
        let mut connections = self.cp_data.connections().lock();
        if root.state() != DescriptorState::Ready {
            return Err(ControlPointError::DescriptorNotReady(root.uuid().to_string()));
        }
        if connections.contains_key(device_uuid) {
            return Err(ControlPointError::AlreadyConnected(device_uuid.to_string()));
        }
        let connection =
            DeviceConnection::new(self.cp_data.clone(), root, device_uuid, resolver.as_ref())?;
        connections.insert(device_uuid.to_string(), connection.clone());
        Ok(connection)
    }

    /// Disconnects `device_uuid`, unsubscribing from its events.
    pub fn disconnect(&self, device_uuid: &str) {
        let connection = self.cp_data.connections().lock().remove(device_uuid);
        if let Some(connection) = connection {
            connection.disconnect(true);
        }
    }

    pub fn is_connected(&self, device_uuid: &str) -> bool {
        self.cp_data.connections().lock().contains_key(device_uuid)
    }

    pub fn connected_devices(&self) -> Vec<String> {
        self.cp_data.connections().lock().keys().cloned().collect()
    }

    pub fn connection(&self, device_uuid: &str) -> Option<Arc<DeviceConnection>> {
        self.cp_data.connections().lock().get(device_uuid).cloned()
    }
}

fn connections_of_root(cp_data: &CpData, root_uuid: &str, remove: bool) -> Vec<Arc<DeviceConnection>> {
    let mut connections = cp_data.connections().lock();
    let uuids: Vec<String> = connections
        .iter()
        .filter(|(_, c)| c.root_descriptor().uuid() == root_uuid)
        .map(|(uuid, _)| uuid.clone())
        .collect();
    uuids
        .iter()
        .filter_map(|uuid| {
            if remove {
                connections.remove(uuid)
            } else {
                connections.get(uuid).cloned()
            }
        })
        .collect()
}

fn on_tracker_event(cp_data: &CpData, event: &TrackerEvent) {
    match event {
        TrackerEvent::RootDeviceRemoved(root) => {
            for connection in connections_of_root(cp_data, root.uuid(), true) {
                connection.disconnect(false);
            }
        }
        TrackerEvent::DeviceRebooted(root) => {
            for connection in connections_of_root(cp_data, root.uuid(), false) {
                tokio::spawn(async move { connection.on_device_rebooted().await });
            }
        }
        TrackerEvent::RootDeviceAdded(_) => {}
    }
}

fn parse_host_ip(host: &str) -> Option<IpAddr> {
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split(']').next()?.parse().ok();
    }
    host.split(':').next()?.parse().ok()
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn handle_notify(
    State(cp_data): State<Arc<CpData>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if method.as_str() != "NOTIFY" {
        return StatusCode::METHOD_NOT_ALLOWED;
    }

    let host_ip = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_host_ip);
    let path = uri.path();
    let connection = cp_data
        .connections()
        .lock()
        .values()
        .find(|c| c.notification_path() == path && Some(c.endpoint_ip()) == host_ip)
        .cloned();
    let Some(connection) = connection else {
        return StatusCode::NOT_FOUND;
    };

    let request = NotifyRequest {
        nt: header_string(&headers, "NT"),
        nts: header_string(&headers, "NTS"),
        sid: header_string(&headers, "SID"),
        seq: header_string(&headers, "SEQ"),
        content_type: header_string(&headers, "CONTENT-TYPE"),
        body: body.to_vec(),
    };

    let status = match panic::catch_unwind(AssertUnwindSafe(|| {
        connection.handle_notification(&request)
    })) {
        Ok(status) => status,
        Err(_) => 500,
    };
    debug!(path, status, "NOTIFY answered");
    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_host_ip() {
        assert_eq!(parse_host_ip("10.0.0.1:4004"), Some(IpAddr::from([10, 0, 0, 1])));
        assert_eq!(
            parse_host_ip("[::1]:4004"),
            Some(IpAddr::from([0u16, 0, 0, 0, 0, 0, 0, 1]))
        );
        assert_eq!(parse_host_ip("device.local"), None);
    }
}

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU16, Ordering},
    },
};

use parking_lot::Mutex;

use crate::{
    config_ext::ControlPointSettings, device_connection::DeviceConnection,
    transport::HttpTransport,
};

/// State shared by the tracker, the connections and the NOTIFY listener.
pub struct CpData {
    settings: ControlPointSettings,
    transport: Arc<dyn HttpTransport>,
    notify_port: AtomicU16,
    connections: Mutex<HashMap<String, Arc<DeviceConnection>>>,
}

impl CpData {
    pub fn new(settings: ControlPointSettings, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            settings,
            transport,
            notify_port: AtomicU16::new(0),
            connections: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &ControlPointSettings {
        &self.settings
    }

    pub fn transport(&self) -> &Arc<dyn HttpTransport> {
        &self.transport
    }

    /// Port the NOTIFY listener is bound to, 0 before it starts.
    pub fn notify_port(&self) -> u16 {
        self.notify_port.load(Ordering::SeqCst)
    }

    pub(crate) fn set_notify_port(&self, port: u16) {
        self.notify_port.store(port, Ordering::SeqCst);
    }

    /// Connected devices, keyed by device UUID.
    pub(crate) fn connections(&self) -> &Mutex<HashMap<String, Arc<DeviceConnection>>> {
        &self.connections
    }
}

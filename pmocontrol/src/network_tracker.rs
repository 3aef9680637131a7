//! Tracks the root devices of the network and fetches their descriptions.
//!
//! Discovery events feed a state machine per root device: the device
//! description is fetched first, then each service description in turn.
//! A root is reported to the listeners only once every document has been
//! received; a single failure leaves it `Erroneous` and unreported.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Weak},
};

use parking_lot::Mutex;
use tokio::{sync::mpsc, task::JoinHandle, time::timeout};
use tracing::{debug, info, warn};
use url::Url;
use xmltree::Element;

use crate::{
    cp_data::CpData,
    descriptors::{RootDescriptor, ServiceDescriptor},
    discovery::{DiscoveryController, DiscoveryEvent, RootEntry},
    errors::{ControlPointError, DescriptionError},
    events::EventBus,
    transport::{HttpRequest, USER_AGENT},
};

#[derive(Debug, Clone)]
pub enum TrackerEvent {
    RootDeviceAdded(Arc<RootDescriptor>),
    RootDeviceRemoved(Arc<RootDescriptor>),
    /// The device restarted with the same configuration
    DeviceRebooted(Arc<RootDescriptor>),
}

/// Next step of a description fetch.
enum FetchStep {
    DeviceDescription,
    ServiceDescriptions(VecDeque<Arc<ServiceDescriptor>>),
    Complete,
}

pub struct UpnpNetworkTracker {
    cp_data: Arc<CpData>,
    discovery: Arc<dyn DiscoveryController>,
    roots: Mutex<HashMap<String, Arc<RootDescriptor>>>,
    events: EventBus<TrackerEvent>,
    // Orders the report of a root against its removal.
    report_order: Mutex<()>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl UpnpNetworkTracker {
    pub fn new(cp_data: Arc<CpData>, discovery: Arc<dyn DiscoveryController>) -> Arc<Self> {
        Arc::new(Self {
            cp_data,
            discovery,
            roots: Mutex::new(HashMap::new()),
            events: EventBus::new("network tracker"),
            report_order: Mutex::new(()),
            listener: Mutex::new(None),
        })
    }

    pub fn shared_control_point_data(&self) -> &Arc<CpData> {
        &self.cp_data
    }

    pub fn events(&self) -> &EventBus<TrackerEvent> {
        &self.events
    }

    pub fn known_root_descriptors(&self) -> Vec<Arc<RootDescriptor>> {
        self.roots.lock().values().cloned().collect()
    }

    pub fn root_descriptor(&self, uuid: &str) -> Option<Arc<RootDescriptor>> {
        self.roots.lock().get(uuid).cloned()
    }

    pub fn is_active(&self) -> bool {
        self.listener.lock().is_some()
    }

    /// Starts listening to discovery events and searches for every device.
    pub async fn start(self: &Arc<Self>) -> Result<(), ControlPointError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<DiscoveryEvent>();
        {
            let mut listener = self.listener.lock();
            if listener.is_some() {
                return Err(ControlPointError::AlreadyStarted);
            }
            let tracker = Arc::downgrade(self);
            *listener = Some(tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    let Some(tracker) = tracker.upgrade() else {
                        break;
                    };
                    tracker.handle_discovery_event(event);
                }
            }));
        }

        if let Err(e) = self.discovery.start(tx).await {
            if let Some(listener) = self.listener.lock().take() {
                listener.abort();
            }
            return Err(ControlPointError::Discovery(e));
        }
        if let Err(e) = self.discovery.search_all().await {
            warn!("⚠️ Initial search failed: {}", e);
        }
        info!("✅ UPnP network tracker started");
        Ok(())
    }

    /// Stops discovery, aborts every pending fetch and forgets all roots.
    pub async fn close(&self) {
        let Some(listener) = self.listener.lock().take() else {
            return;
        };
        listener.abort();
        self.discovery.close().await;

        let roots: Vec<_> = self.roots.lock().drain().map(|(_, rd)| rd).collect();
        for rd in roots {
            rd.invalidate();
        }
        info!("UPnP network tracker closed");
    }

    pub(crate) fn handle_discovery_event(self: &Arc<Self>, event: DiscoveryEvent) {
        match event {
            DiscoveryEvent::RootDeviceAdded(entry) => self.on_root_device_added(entry),
            DiscoveryEvent::RootDeviceRemoved(entry) => self.on_root_device_removed(&entry),
            DiscoveryEvent::DeviceRebooted {
                entry,
                configuration_changed,
            } => self.on_device_rebooted(entry, configuration_changed),
        }
    }

    fn on_root_device_added(self: &Arc<Self>, entry: RootEntry) {
        if let Some(known) = self.root_descriptor(&entry.uuid)
            && !known.state().is_terminal()
        {
            debug!("Root device {} already tracked", entry.uuid);
            return;
        }
        let rd = self.register_descriptor(entry);
        self.start_fetch(rd);
    }

    fn on_root_device_removed(&self, entry: &RootEntry) {
        let Some(rd) = self.roots.lock().remove(&entry.uuid) else {
            return;
        };
        let _order = self.report_order.lock();
        rd.invalidate();
        debug!("Root device {} left the network", entry.uuid);
        if rd.was_reported() {
            self.events.emit(TrackerEvent::RootDeviceRemoved(rd));
        }
    }

    fn on_device_rebooted(self: &Arc<Self>, entry: RootEntry, configuration_changed: bool) {
        let Some(rd) = self.root_descriptor(&entry.uuid) else {
            return;
        };
        let order = self.report_order.lock();
        if !configuration_changed {
            if rd.was_reported() && !rd.state().is_terminal() {
                self.events.emit(TrackerEvent::DeviceRebooted(rd));
            }
            return;
        }

        info!("🔄 Configuration of {} changed, reloading descriptions", entry.uuid);
        rd.invalidate();
        let fresh = self.register_descriptor(entry);
        if rd.was_reported() {
            self.events.emit(TrackerEvent::RootDeviceRemoved(rd));
        }
        drop(order);
        self.start_fetch(fresh);
    }

    fn register_descriptor(&self, entry: RootEntry) -> Arc<RootDescriptor> {
        let rd = Arc::new(RootDescriptor::new(entry));
        if let Some(previous) = self
            .roots
            .lock()
            .insert(rd.uuid().to_string(), rd.clone())
        {
            previous.invalidate();
        }
        rd
    }

    fn report_added(&self, rd: Arc<RootDescriptor>) {
        let _order = self.report_order.lock();
        if rd.mark_reported() {
            self.events.emit(TrackerEvent::RootDeviceAdded(rd));
        }
    }

    fn start_fetch(self: &Arc<Self>, rd: Arc<RootDescriptor>) {
        let tracker: Weak<Self> = Arc::downgrade(self);
        let cp_data = self.cp_data.clone();
        let task_rd = rd.clone();
        let handle = tokio::spawn(async move {
            let rd = task_rd;
            match run_fetch_pipeline(&cp_data, &rd).await {
                Ok(true) => {
                    info!("✅ Root device {} ready", rd.uuid());
                    if let Some(tracker) = tracker.upgrade() {
                        tracker.report_added(rd);
                    }
                }
                Ok(false) => debug!("Fetch of {} interrupted", rd.uuid()),
                Err(e) => {
                    rd.mark_erroneous();
                    debug!("Descriptions of {} unavailable: {}", rd.uuid(), e);
                }
            }
        });
        rd.set_fetch_handle(handle.abort_handle());
    }
}

/// Runs the fetch state machine of `rd`. Returns `Ok(true)` when the root
/// reached `Ready` and must be reported, `Ok(false)` when it was invalidated
/// meanwhile.
async fn run_fetch_pipeline(cp_data: &CpData, rd: &RootDescriptor) -> Result<bool, DescriptionError> {
    let mut step = FetchStep::DeviceDescription;
    loop {
        step = match step {
            FetchStep::DeviceDescription => {
                if !rd.begin_device_fetch() {
                    return Ok(false);
                }
                let location = rd.entry().preferred_link.description_location.clone();
                let url = Url::parse(&location).map_err(|_| DescriptionError::InvalidUrl(location))?;
                let description = fetch_xml(cp_data, rd, &url).await?;
                FetchStep::ServiceDescriptions(rd.set_device_description(description)?.into())
            }
            FetchStep::ServiceDescriptions(mut pending) => match pending.pop_front() {
                None => FetchStep::Complete,
                Some(sd) => {
                    if !rd.begin_service_fetch(&sd) {
                        return Ok(false);
                    }
                    match fetch_xml(cp_data, rd, sd.scpd_url()).await {
                        Ok(scpd) => {
                            if !rd.set_service_description(&sd, scpd) {
                                return Ok(false);
                            }
                        }
                        Err(e) => {
                            rd.mark_service_erroneous(&sd);
                            return Err(e);
                        }
                    }
                    FetchStep::ServiceDescriptions(pending)
                }
            },
            FetchStep::Complete => return Ok(rd.mark_ready()),
        };
    }
}

async fn fetch_xml(cp_data: &CpData, rd: &RootDescriptor, url: &Url) -> Result<Element, DescriptionError> {
    let request = HttpRequest::get(url.as_str())
        .header("USER-AGENT", USER_AGENT)
        .bound_to(Some(rd.entry().preferred_link.endpoint_ip));

    let response = timeout(
        cp_data.settings().pending_request_timeout,
        cp_data.transport().execute(request),
    )
    .await
    .map_err(|_| DescriptionError::Timeout(url.to_string()))??;

    if response.status != 200 {
        return Err(DescriptionError::HttpStatus {
            url: url.to_string(),
            status: response.status,
        });
    }
    Ok(Element::parse(response.body.as_slice())?)
}

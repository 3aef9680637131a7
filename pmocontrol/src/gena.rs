//! GENA client side: event subscriptions of a connected device.
//!
//! Each [`DeviceConnection`](crate::device_connection::DeviceConnection)
//! owns one [`GenaClientController`]. It sends `SUBSCRIBE`, renewals and
//! `UNSUBSCRIBE` requests, renews subscriptions shortly before they
//! expire, and turns the `NOTIFY` requests received on its notification
//! path into state variable updates.

use std::{
    collections::HashMap,
    net::IpAddr,
    sync::{Arc, Weak},
    time::Duration,
};

use parking_lot::Mutex;
use pmoupnp::variable_types::StateValue;
use tokio::{
    task::JoinHandle,
    time::{Instant, sleep_until, timeout},
};
use tracing::{debug, info, warn};
use xmltree::Element;

use crate::{
    cp_data::CpData,
    device_tree::{CpService, CpStateVariable},
    errors::ConnectionError,
    transport::{HttpRequest, HttpResponse, USER_AGENT, is_xml_media_type},
};

/// Event keys this far behind the last one are a wrap-around, not a replay.
pub const EVENTKEY_GAP_THRESHOLD: u32 = 100;

const EVENT_NT: &str = "upnp:event";
const EVENT_NTS: &str = "upnp:propchange";

/// Headers and body of an inbound `NOTIFY`.
#[derive(Debug, Clone, Default)]
pub struct NotifyRequest {
    pub nt: Option<String>,
    pub nts: Option<String>,
    pub sid: Option<String>,
    pub seq: Option<String>,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

struct Subscription {
    service: Arc<CpService>,
    sid: String,
    expires_at: Instant,
    last_event_key: Option<u32>,
}

fn service_key(service: &CpService) -> String {
    format!("{}::{}", service.device_uuid(), service.service_id())
}

/// `Second-1800` → 1800 s. `Second-infinite` keeps the requested duration.
/// Granted durations shorter than `floor` are raised to it.
pub fn parse_timeout(raw: Option<&str>, requested: Duration, floor: Duration) -> Duration {
    let Some(value) = raw else {
        return requested;
    };
    let lower = value.trim().to_ascii_lowercase();
    if lower == "second-infinite" {
        return requested;
    }
    lower
        .strip_prefix("second-")
        .and_then(|n| n.trim().parse::<u64>().ok())
        .map(|secs| Duration::from_secs(secs).max(floor))
        .unwrap_or(requested)
}

/// True if an event with key `seq` follows `last`.
pub fn is_event_key_fresh(last: Option<u32>, seq: u32) -> bool {
    match last {
        None => true,
        Some(last) => seq > last || last.wrapping_sub(seq) >= EVENTKEY_GAP_THRESHOLD,
    }
}

pub struct GenaClientController {
    cp_data: Arc<CpData>,
    endpoint_ip: IpAddr,
    force_simple: bool,
    notification_path: String,
    subscriptions: Mutex<HashMap<String, Subscription>>,
    renewal: Mutex<Option<JoinHandle<()>>>,
}

impl GenaClientController {
    pub fn new(cp_data: Arc<CpData>, endpoint_ip: IpAddr, force_simple: bool) -> Arc<Self> {
        Arc::new(Self {
            cp_data,
            endpoint_ip,
            force_simple,
            notification_path: format!("/{}", uuid::Uuid::new_v4()),
            subscriptions: Mutex::new(HashMap::new()),
            renewal: Mutex::new(None),
        })
    }

    /// Path of the `CALLBACK` URL, unique to this controller.
    pub fn notification_path(&self) -> &str {
        &self.notification_path
    }

    pub fn endpoint_ip(&self) -> IpAddr {
        self.endpoint_ip
    }

    pub fn callback_url(&self) -> String {
        let port = self.cp_data.notify_port();
        match self.endpoint_ip {
            IpAddr::V4(ip) => format!("http://{}:{}{}", ip, port, self.notification_path),
            IpAddr::V6(ip) => format!("http://[{}]:{}{}", ip, port, self.notification_path),
        }
    }

    pub fn is_subscribed(&self, service: &CpService) -> bool {
        self.subscriptions.lock().contains_key(&service_key(service))
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().len()
    }

    async fn exchange(&self, request: HttpRequest) -> Result<HttpResponse, String> {
        let request = request
            .header("USER-AGENT", USER_AGENT)
            .bound_to(Some(self.endpoint_ip));
        match timeout(
            self.cp_data.settings().action_call_timeout,
            self.cp_data.transport().execute(request),
        )
        .await
        {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err("request timed out".to_string()),
        }
    }

    fn timeout_header(&self) -> String {
        format!("Second-{}", self.cp_data.settings().event_subscription.as_secs())
    }

    /// Sends `SUBSCRIBE` for `service`. A failure is also reported through
    /// the service's `SubscriptionFailed` event.
    pub async fn subscribe(self: &Arc<Self>, service: &Arc<CpService>) -> Result<(), ConnectionError> {
        let key = service_key(service);
        if self.subscriptions.lock().contains_key(&key) {
            return Err(ConnectionError::AlreadySubscribed(service.service_id().to_string()));
        }

        let request = HttpRequest::new("SUBSCRIBE", service.descriptor().event_sub_url().as_str())
            .header("CALLBACK", format!("<{}>", self.callback_url()))
            .header("NT", EVENT_NT)
            .header("TIMEOUT", self.timeout_header());

        let result = match self.exchange(request).await {
            Ok(response) if response.status == 200 => match response.header("SID") {
                Some(sid) => Ok((
                    sid.trim().to_string(),
                    self.granted_duration(response.header("TIMEOUT")),
                )),
                None => Err("SUBSCRIBE response missing SID".to_string()),
            },
            Ok(response) => Err(format!("SUBSCRIBE returned HTTP {}", response.status)),
            Err(e) => Err(e),
        };

        let (sid, duration) = match result {
            Ok(ok) => ok,
            Err(message) => {
                warn!(
                    service = service.service_id(),
                    "❌ Event subscription failed: {}", message
                );
                service.subscription_failed(message.clone());
                return Err(ConnectionError::Subscription {
                    service: service.service_id().to_string(),
                    message,
                });
            }
        };

        let duplicate = {
            let mut subscriptions = self.subscriptions.lock();
            if subscriptions.contains_key(&key) {
                true
            } else {
                subscriptions.insert(
                    key,
                    Subscription {
                        service: service.clone(),
                        sid: sid.clone(),
                        expires_at: Instant::now() + duration,
                        last_event_key: None,
                    },
                );
                false
            }
        };
        if duplicate {
            self.send_unsubscribe(service, sid);
            return Err(ConnectionError::AlreadySubscribed(service.service_id().to_string()));
        }

        info!(
            service = service.service_id(),
            "✅ Subscribed to events ({}s)",
            duration.as_secs()
        );
        self.schedule_renewal();
        Ok(())
    }

    /// Drops the subscription of `service` and sends `UNSUBSCRIBE` in the
    /// background.
    pub fn unsubscribe(self: &Arc<Self>, service: &CpService) -> Result<(), ConnectionError> {
        let subscription = self
            .subscriptions
            .lock()
            .remove(&service_key(service))
            .ok_or_else(|| ConnectionError::NotSubscribed(service.service_id().to_string()))?;
        self.send_unsubscribe(&subscription.service, subscription.sid);
        self.schedule_renewal();
        Ok(())
    }

    fn send_unsubscribe(self: &Arc<Self>, service: &CpService, sid: String) {
        let request = HttpRequest::new("UNSUBSCRIBE", service.descriptor().event_sub_url().as_str())
            .header("SID", sid);
        let controller = self.clone();
        tokio::spawn(async move {
            match controller.exchange(request).await {
                Ok(response) if response.status == 200 => {}
                Ok(response) => debug!("UNSUBSCRIBE returned HTTP {}", response.status),
                Err(e) => debug!("UNSUBSCRIBE failed: {}", e),
            }
        });
    }

    /// Subscription duration granted by a response, at least twice the
    /// renewal gap.
    fn granted_duration(&self, raw: Option<&str>) -> Duration {
        let settings = self.cp_data.settings();
        parse_timeout(
            raw,
            settings.event_subscription,
            settings.subscription_renewal_gap * 2,
        )
    }

    /// Renews every subscription, e.g. after the device rebooted.
    pub async fn renew_all(self: &Arc<Self>) {
        let keys: Vec<String> = self.subscriptions.lock().keys().cloned().collect();
        self.renew(keys).await;
    }

    async fn renew_expiring(self: &Arc<Self>) {
        let limit = Instant::now() + self.cp_data.settings().subscription_renewal_gap;
        let keys: Vec<String> = self
            .subscriptions
            .lock()
            .iter()
            .filter(|(_, s)| s.expires_at <= limit)
            .map(|(k, _)| k.clone())
            .collect();
        self.renew(keys).await;
    }

    async fn renew(self: &Arc<Self>, keys: Vec<String>) {
        for key in keys {
            let Some((service, sid)) = self
                .subscriptions
                .lock()
                .get(&key)
                .map(|s| (s.service.clone(), s.sid.clone()))
            else {
                continue;
            };

            let request =
                HttpRequest::new("SUBSCRIBE", service.descriptor().event_sub_url().as_str())
                    .header("SID", sid.clone())
                    .header("TIMEOUT", self.timeout_header());

            let outcome = match self.exchange(request).await {
                Ok(response) if response.status == 200 => {
                    Ok(self.granted_duration(response.header("TIMEOUT")))
                }
                Ok(response) => Err(format!("renewal returned HTTP {}", response.status)),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(duration) => {
                    if let Some(subscription) = self.subscriptions.lock().get_mut(&key)
                        && subscription.sid == sid
                    {
                        subscription.expires_at = Instant::now() + duration;
                    }
                    debug!(service = service.service_id(), "🔄 Subscription renewed");
                }
                Err(message) => {
                    let removed = {
                        let mut subscriptions = self.subscriptions.lock();
                        match subscriptions.get(&key) {
                            Some(s) if s.sid == sid => subscriptions.remove(&key).is_some(),
                            _ => false,
                        }
                    };
                    if removed {
                        warn!(
                            service = service.service_id(),
                            "⚠️ Subscription renewal failed: {}", message
                        );
                        service.subscription_failed(message);
                    }
                }
            }
        }
        self.schedule_renewal();
    }

    /// Arms the renewal timer on the earliest expiry, minus the renewal gap.
    fn schedule_renewal(self: &Arc<Self>) {
        let earliest = self
            .subscriptions
            .lock()
            .values()
            .map(|s| s.expires_at)
            .min();

        let mut renewal = self.renewal.lock();
        if let Some(previous) = renewal.take() {
            previous.abort();
        }
        let Some(earliest) = earliest else {
            return;
        };

        let gap = self.cp_data.settings().subscription_renewal_gap;
        let deadline = earliest.checked_sub(gap).unwrap_or_else(Instant::now);
        let controller: Weak<Self> = Arc::downgrade(self);
        *renewal = Some(tokio::spawn(async move {
            sleep_until(deadline).await;
            let Some(controller) = controller.upgrade() else {
                return;
            };
            // Detach the running timer so the rescheduling below does not abort it
            drop(controller.renewal.lock().take());
            controller.renew_expiring().await;
        }));
    }

    /// Stops the renewal timer and forgets every subscription, sending
    /// `UNSUBSCRIBE` first if asked to.
    pub fn close(self: &Arc<Self>, unsubscribe: bool) {
        if let Some(renewal) = self.renewal.lock().take() {
            renewal.abort();
        }
        let subscriptions: Vec<Subscription> =
            self.subscriptions.lock().drain().map(|(_, s)| s).collect();
        if unsubscribe {
            for subscription in subscriptions {
                self.send_unsubscribe(&subscription.service, subscription.sid);
            }
        }
    }

    /// Processes an inbound `NOTIFY` and returns the HTTP status to answer.
    pub fn handle_notification(&self, request: &NotifyRequest) -> u16 {
        let header_is = |value: &Option<String>, expected: &str| {
            value
                .as_deref()
                .is_some_and(|v| v.trim().eq_ignore_ascii_case(expected))
        };
        if !header_is(&request.nt, EVENT_NT) || !header_is(&request.nts, EVENT_NTS) {
            return 412;
        }
        let Some(sid) = request.sid.as_deref().map(str::trim) else {
            return 412;
        };

        let (key, service, last_event_key) = {
            let subscriptions = self.subscriptions.lock();
            match subscriptions.iter().find(|(_, s)| s.sid == sid) {
                Some((key, s)) => (key.clone(), s.service.clone(), s.last_event_key),
                None => return 412,
            }
        };

        let Some(seq) = request.seq.as_deref().and_then(|s| s.trim().parse::<u32>().ok()) else {
            return 400;
        };
        if !is_event_key_fresh(last_event_key, seq) {
            debug!(sid, seq, "Stale event ignored");
            return 200;
        }
        if !request.content_type.as_deref().is_some_and(is_xml_media_type) {
            return 400;
        }

        let changes = match parse_property_set(&request.body, &service, self.force_simple) {
            Ok(changes) => changes,
            Err(e) => {
                debug!(sid, "Invalid property set: {}", e);
                return 400;
            }
        };

        {
            let mut subscriptions = self.subscriptions.lock();
            match subscriptions.get_mut(&key) {
                Some(s) if s.sid == sid => s.last_event_key = Some(seq),
                _ => return 412,
            }
        }
        for (variable, value) in changes {
            service.state_variable_changed(variable, value);
        }
        200
    }
}

impl Drop for GenaClientController {
    fn drop(&mut self) {
        if let Some(renewal) = self.renewal.get_mut().take() {
            renewal.abort();
        }
    }
}

/// Reads the `<e:propertyset>` of a `NOTIFY`. Unknown variables are skipped.
fn parse_property_set(
    body: &[u8],
    service: &CpService,
    force_simple: bool,
) -> Result<Vec<(Arc<CpStateVariable>, StateValue)>, String> {
    let root = Element::parse(body).map_err(|e| e.to_string())?;
    if root.name != "propertyset" {
        return Err(format!("unexpected root <{}>", root.name));
    }

    let mut changes = Vec::new();
    for property in xml_children(&root).filter(|e| e.name == "property") {
        for value_elem in xml_children(property) {
            let Some(variable) = service.state_variable(&value_elem.name) else {
                debug!("Event for unknown variable {}", value_elem.name);
                continue;
            };
            let is_simple = force_simple || xml_children(value_elem).next().is_none();
            let value = variable
                .data_type()
                .soap_deserialize_value(value_elem, is_simple)
                .map_err(|e| format!("{}: {}", value_elem.name, e))?;
            changes.push((variable, value));
        }
    }
    Ok(changes)
}

fn xml_children(element: &Element) -> impl Iterator<Item = &Element> {
    element.children.iter().filter_map(|node| node.as_element())
}

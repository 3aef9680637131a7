#![allow(dead_code)]

use std::{
    collections::HashMap,
    net::{IpAddr, Ipv4Addr},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use pmocontrol::{
    ControlPointSettings, CpData, DiscoveryController, DiscoveryEvent, HttpRequest, HttpResponse,
    HttpTransport, LinkData, RootEntry, TransportError, UpnpVersion,
};
use tokio::sync::mpsc::UnboundedSender;

pub const ROOT_UUID: &str = "root-1";
pub const LOCATION: &str = "http://10.0.0.2:49152/desc/root.xml";
pub const RC_SCPD_URL: &str = "http://10.0.0.2:49152/desc/rc.xml";
pub const AVT_SCPD_URL: &str = "http://10.0.0.2:49152/desc/avt.xml";
pub const RC_CONTROL_URL: &str = "http://10.0.0.2:49152/control/rc";
pub const RC_EVENT_URL: &str = "http://10.0.0.2:49152/event/rc";
pub const RC_URN: &str = "urn:schemas-upnp-org:service:RenderingControl:1";

pub const ROOT_DESCRIPTION: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <specVersion><major>1</major><minor>1</minor></specVersion>
  <device>
    <deviceType>urn:schemas-upnp-org:device:MediaRenderer:1</deviceType>
    <friendlyName>Salon</friendlyName>
    <UDN>uuid:root-1</UDN>
    <serviceList>
      <service>
        <serviceType>urn:schemas-upnp-org:service:RenderingControl:1</serviceType>
        <serviceId>urn:upnp-org:serviceId:RenderingControl</serviceId>
        <SCPDURL>/desc/rc.xml</SCPDURL>
        <controlURL>/control/rc</controlURL>
        <eventSubURL>/event/rc</eventSubURL>
      </service>
      <service>
        <serviceType>urn:schemas-upnp-org:service:AVTransport:1</serviceType>
        <serviceId>urn:upnp-org:serviceId:AVTransport</serviceId>
        <SCPDURL>/desc/avt.xml</SCPDURL>
        <controlURL>/control/avt</controlURL>
        <eventSubURL>/event/avt</eventSubURL>
      </service>
    </serviceList>
  </device>
</root>"#;

pub const RC_SCPD: &str = r#"<?xml version="1.0"?>
<scpd xmlns="urn:schemas-upnp-org:service-1-0">
  <specVersion><major>1</major><minor>1</minor></specVersion>
  <actionList>
    <action>
      <name>GetVolume</name>
      <argumentList>
        <argument><name>InstanceID</name><direction>in</direction><relatedStateVariable>A_ARG_TYPE_InstanceID</relatedStateVariable></argument>
        <argument><name>CurrentVolume</name><direction>out</direction><relatedStateVariable>Volume</relatedStateVariable></argument>
      </argumentList>
    </action>
  </actionList>
  <serviceStateTable>
    <stateVariable sendEvents="no"><name>A_ARG_TYPE_InstanceID</name><dataType>ui4</dataType></stateVariable>
    <stateVariable sendEvents="yes"><name>Volume</name><dataType>ui2</dataType></stateVariable>
  </serviceStateTable>
</scpd>"#;

pub const AVT_SCPD: &str = r#"<?xml version="1.0"?>
<scpd xmlns="urn:schemas-upnp-org:service-1-0">
  <specVersion><major>1</major><minor>1</minor></specVersion>
  <actionList>
    <action><name>Stop</name></action>
  </actionList>
  <serviceStateTable>
    <stateVariable sendEvents="yes"><name>TransportState</name><dataType>string</dataType></stateVariable>
  </serviceStateTable>
</scpd>"#;

pub enum Route {
    Respond(HttpResponse),
    /// Never answers
    Hang,
}

/// In-memory transport answering from a URL table and recording requests.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<(String, String), Route>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    /// Routes of the two-service renderer described above.
    pub fn with_renderer() -> Arc<Self> {
        let transport = Arc::new(Self::default());
        transport.route("GET", LOCATION, Route::Respond(xml(200, ROOT_DESCRIPTION)));
        transport.route("GET", RC_SCPD_URL, Route::Respond(xml(200, RC_SCPD)));
        transport.route("GET", AVT_SCPD_URL, Route::Respond(xml(200, AVT_SCPD)));
        transport
    }

    pub fn route(&self, method: &str, url: &str, route: Route) {
        self.routes
            .lock()
            .insert((method.to_string(), url.to_string()), route);
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    pub fn requests_to(&self, method: &str, url: &str) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.url == url)
            .collect()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().push(request.clone());
        let response = match self
            .routes
            .lock()
            .get(&(request.method.clone(), request.url.clone()))
        {
            Some(Route::Respond(response)) => Some(response.clone()),
            Some(Route::Hang) => None,
            None => Some(HttpResponse::new(404)),
        };
        match response {
            Some(response) => Ok(response),
            None => std::future::pending().await,
        }
    }
}

pub fn xml(status: u16, body: &str) -> HttpResponse {
    HttpResponse::new(status)
        .with_header("Content-Type", "text/xml; charset=\"utf-8\"")
        .with_body(body.as_bytes().to_vec())
}

/// Discovery source driven by the test.
#[derive(Default)]
pub struct FakeDiscovery {
    sender: Mutex<Option<UnboundedSender<DiscoveryEvent>>>,
}

impl FakeDiscovery {
    pub fn emit(&self, event: DiscoveryEvent) {
        if let Some(sender) = self.sender.lock().as_ref() {
            sender.send(event).unwrap();
        }
    }
}

#[async_trait]
impl DiscoveryController for FakeDiscovery {
    async fn start(&self, events: UnboundedSender<DiscoveryEvent>) -> std::io::Result<()> {
        *self.sender.lock() = Some(events);
        Ok(())
    }

    async fn search_all(&self) -> std::io::Result<()> {
        Ok(())
    }

    async fn close(&self) {
        self.sender.lock().take();
    }
}

pub fn entry(endpoint_ip: IpAddr) -> RootEntry {
    RootEntry {
        uuid: ROOT_UUID.to_string(),
        preferred_link: LinkData {
            description_location: LOCATION.to_string(),
            endpoint_ip,
        },
        upnp_version: UpnpVersion { major: 1, minor: 1 },
        boot_id: Some(1),
        config_id: Some(1),
    }
}

pub fn lan_entry() -> RootEntry {
    entry(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)))
}

pub fn cp_data(transport: Arc<MockTransport>) -> Arc<CpData> {
    Arc::new(CpData::new(ControlPointSettings::default(), transport))
}

/// Polls `check` until it returns a value, at most 100 times 50 ms apart.
pub async fn wait_for<T>(mut check: impl FnMut() -> Option<T>) -> T {
    for _ in 0..100 {
        if let Some(value) = check() {
            return value;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("condition not reached");
}

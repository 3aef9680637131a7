/*!
SSDP discovery source of the control point.

The client must **not** bind to UDP port 1900: the SSDP server of a local
UPnP host listens there, and two sockets bound on 1900 get incoming
datagrams load-balanced between them, so replies are lost randomly.
The client binds an ephemeral port, sends `M-SEARCH` for root devices and
reads the unicast replies. Devices which stop answering are reported as
removed once their `max-age` has elapsed.
*/

use std::{
    collections::HashMap,
    io,
    net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket as StdUdpSocket},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::{
    net::UdpSocket,
    sync::mpsc::UnboundedSender,
    task::JoinHandle,
    time::{Instant, interval},
};
use tracing::{debug, info, trace, warn};

use super::{DiscoveryController, DiscoveryEvent, LinkData, RootEntry, UpnpVersion};

const SSDP_MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);
const SSDP_PORT: u16 = 1900;
const DEFAULT_MAX_AGE: u32 = 1800;
const ROOT_DEVICE_TARGET: &str = "upnp:rootdevice";
const DEFAULT_SEARCH_PERIOD: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq)]
enum SsdpKind {
    Alive,
    ByeBye,
    SearchResponse,
}

#[derive(Debug, Clone, PartialEq)]
struct SsdpMessage {
    kind: SsdpKind,
    usn: String,
    /// NT of a NOTIFY, ST of a search response
    target: String,
    location: Option<String>,
    server: String,
    max_age: u32,
    boot_id: Option<u32>,
    config_id: Option<u32>,
}

struct KnownRoot {
    entry: RootEntry,
    expires_at: Instant,
}

/// Root devices currently visible, and the events their messages imply.
#[derive(Default)]
struct RootTable {
    roots: HashMap<String, KnownRoot>,
}

impl RootTable {
    fn apply(&mut self, msg: SsdpMessage, endpoint_ip: IpAddr, now: Instant) -> Option<DiscoveryEvent> {
        if !msg.target.eq_ignore_ascii_case(ROOT_DEVICE_TARGET) {
            return None;
        }
        let uuid = extract_uuid_from_usn(&msg.usn)?;

        if msg.kind == SsdpKind::ByeBye {
            let known = self.roots.remove(&uuid)?;
            return Some(DiscoveryEvent::RootDeviceRemoved(known.entry));
        }

        let entry = RootEntry {
            uuid: uuid.clone(),
            preferred_link: LinkData {
                description_location: msg.location?,
                endpoint_ip,
            },
            upnp_version: UpnpVersion::from_server_header(&msg.server).unwrap_or_default(),
            boot_id: msg.boot_id,
            config_id: msg.config_id,
        };
        let expires_at = now + Duration::from_secs(u64::from(msg.max_age));

        match self.roots.get_mut(&uuid) {
            None => {
                self.roots.insert(
                    uuid,
                    KnownRoot {
                        entry: entry.clone(),
                        expires_at,
                    },
                );
                Some(DiscoveryEvent::RootDeviceAdded(entry))
            }
            Some(known) => {
                known.expires_at = expires_at;
                let rebooted = matches!(
                    (known.entry.boot_id, entry.boot_id),
                    (Some(old), Some(new)) if old != new
                );
                let configuration_changed = known.entry.config_id != entry.config_id
                    || known.entry.preferred_link != entry.preferred_link;
                known.entry = entry.clone();

                if rebooted {
                    Some(DiscoveryEvent::DeviceRebooted {
                        entry,
                        configuration_changed,
                    })
                } else {
                    None
                }
            }
        }
    }

    fn expire(&mut self, now: Instant) -> Vec<DiscoveryEvent> {
        let expired: Vec<String> = self
            .roots
            .iter()
            .filter(|(_, r)| r.expires_at <= now)
            .map(|(uuid, _)| uuid.clone())
            .collect();
        expired
            .into_iter()
            .filter_map(|uuid| self.roots.remove(&uuid))
            .map(|r| DiscoveryEvent::RootDeviceRemoved(r.entry))
            .collect()
    }
}

struct Running {
    socket: Arc<UdpSocket>,
    task: JoinHandle<()>,
}

/// SSDP-backed [`DiscoveryController`].
pub struct SsdpDiscovery {
    search_period: Duration,
    running: Mutex<Option<Running>>,
}

impl Default for SsdpDiscovery {
    fn default() -> Self {
        Self::new(DEFAULT_SEARCH_PERIOD)
    }
}

impl SsdpDiscovery {
    pub fn new(search_period: Duration) -> Self {
        Self {
            search_period,
            running: Mutex::new(None),
        }
    }

    fn open_socket() -> io::Result<UdpSocket> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)).into())?;
        socket.set_nonblocking(true)?;

        let socket: StdUdpSocket = socket.into();
        socket.set_multicast_loop_v4(true)?;
        UdpSocket::from_std(socket)
    }
}

async fn send_msearch(socket: &UdpSocket, st: &str, mx: u32) -> io::Result<()> {
    let msg = format!(
        "M-SEARCH * HTTP/1.1\r\n\
         HOST: {}:{}\r\n\
         MAN: \"ssdp:discover\"\r\n\
         MX: {}\r\n\
         ST: {}\r\n\
         USER-AGENT: PMOMusic UPnP/1.1 pmocontrol/0.3\r\n\
         \r\n",
        SSDP_MULTICAST_ADDR,
        SSDP_PORT,
        mx.max(1),
        st
    );
    socket
        .send_to(msg.as_bytes(), SocketAddr::from((SSDP_MULTICAST_ADDR, SSDP_PORT)))
        .await?;
    debug!("📤 M-SEARCH sent (ST={})", st);
    Ok(())
}

#[async_trait]
impl DiscoveryController for SsdpDiscovery {
    async fn start(&self, events: UnboundedSender<DiscoveryEvent>) -> io::Result<()> {
        if self.running.lock().is_some() {
            return Ok(());
        }
        let socket = Arc::new(Self::open_socket()?);
        let period = self.search_period;
        let task_socket = socket.clone();

        let task = tokio::spawn(async move {
            let mut table = RootTable::default();
            let mut ticker = interval(period);
            let mut buf = vec![0u8; 8192];
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        for event in table.expire(Instant::now()) {
                            if events.send(event).is_err() {
                                return;
                            }
                        }
                        if let Err(e) = send_msearch(&task_socket, ROOT_DEVICE_TARGET, 3).await {
                            warn!("❌ Failed to send M-SEARCH: {}", e);
                        }
                    }
                    received = task_socket.recv_from(&mut buf) => {
                        let (n, from) = match received {
                            Ok(r) => r,
                            Err(e) => {
                                warn!("❌ SSDP client read error: {}", e);
                                continue;
                            }
                        };
                        let data = String::from_utf8_lossy(&buf[..n]);
                        let Some(msg) = parse_message(&data) else {
                            trace!("SSDP message from {} ignored", from);
                            continue;
                        };
                        let endpoint_ip = match local_ip_towards(from) {
                            Ok(ip) => ip,
                            Err(e) => {
                                debug!("No local route towards {}: {}", from, e);
                                continue;
                            }
                        };
                        if let Some(event) = table.apply(msg, endpoint_ip, Instant::now())
                            && events.send(event).is_err()
                        {
                            return;
                        }
                    }
                }
            }
        });

        *self.running.lock() = Some(Running { socket, task });
        info!("✅ SSDP discovery started");
        Ok(())
    }

    async fn search_all(&self) -> io::Result<()> {
        let socket = self.running.lock().as_ref().map(|r| r.socket.clone());
        match socket {
            Some(socket) => send_msearch(&socket, ROOT_DEVICE_TARGET, 3).await,
            None => Ok(()),
        }
    }

    async fn close(&self) {
        if let Some(running) = self.running.lock().take() {
            running.task.abort();
            info!("SSDP discovery stopped");
        }
    }
}

/// Local address used to reach `remote`.
fn local_ip_towards(remote: SocketAddr) -> io::Result<IpAddr> {
    let socket = StdUdpSocket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)))?;
    socket.connect(remote)?;
    Ok(socket.local_addr()?.ip())
}

fn parse_message(data: &str) -> Option<SsdpMessage> {
    let mut lines = data.lines();
    let first_line = lines.next()?.trim().to_ascii_uppercase();
    let headers = parse_headers(lines);

    let (kind, target) = if first_line.starts_with("NOTIFY ") {
        let kind = match headers.get("NTS")?.to_ascii_lowercase().as_str() {
            "ssdp:alive" => SsdpKind::Alive,
            "ssdp:byebye" => SsdpKind::ByeBye,
            _ => return None,
        };
        (kind, headers.get("NT")?.clone())
    } else if first_line.starts_with("HTTP/") && first_line.contains(" 200 ") {
        (SsdpKind::SearchResponse, headers.get("ST")?.clone())
    } else {
        return None;
    };

    let location = headers.get("LOCATION").cloned();
    if kind != SsdpKind::ByeBye && location.is_none() {
        return None;
    }

    Some(SsdpMessage {
        kind,
        usn: headers.get("USN")?.clone(),
        target,
        location,
        server: headers.get("SERVER").cloned().unwrap_or_default(),
        max_age: parse_max_age(headers.get("CACHE-CONTROL")),
        boot_id: headers.get("BOOTID.UPNP.ORG").and_then(|v| v.parse().ok()),
        config_id: headers.get("CONFIGID.UPNP.ORG").and_then(|v| v.parse().ok()),
    })
}

fn parse_headers<'a, I>(lines: I) -> HashMap<String, String>
where
    I: Iterator<Item = &'a str>,
{
    let mut headers = HashMap::new();
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        // Values may contain ':'
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim().to_ascii_uppercase();
            let value = value.trim().to_string();
            if !name.is_empty() {
                headers.insert(name, value);
            }
        }
    }
    headers
}

fn parse_max_age(value: Option<&String>) -> u32 {
    value
        .and_then(|v| {
            let lower = v.to_ascii_lowercase();
            let idx = lower.find("max-age")?;
            let after = lower[idx + 7..].trim_start().trim_start_matches('=').trim_start();
            let digits: String = after.chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse().ok()
        })
        .unwrap_or(DEFAULT_MAX_AGE)
}

/// `uuid:1234::upnp:rootdevice` → `1234`
fn extract_uuid_from_usn(usn: &str) -> Option<String> {
    let lower = usn.trim().to_ascii_lowercase();
    let start = lower.find("uuid:")? + 5;
    let rest = &lower[start..];
    let uuid = rest.split("::").next().unwrap_or(rest);
    (!uuid.is_empty()).then(|| uuid.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALIVE: &str = "NOTIFY * HTTP/1.1\r\n\
        HOST: 239.255.255.250:1900\r\n\
        CACHE-CONTROL: max-age=100\r\n\
        LOCATION: http://192.168.1.20:8080/desc/root.xml\r\n\
        NT: upnp:rootdevice\r\n\
        NTS: ssdp:alive\r\n\
        SERVER: Linux/5.10 UPnP/1.1 Renderer/1.0\r\n\
        USN: uuid:ABCD-1::upnp:rootdevice\r\n\
        BOOTID.UPNP.ORG: 1\r\n\
        CONFIGID.UPNP.ORG: 7\r\n\
        \r\n";

    fn ip() -> IpAddr {
        IpAddr::from([192, 168, 1, 10])
    }

    #[test]
    fn test_parse_alive() {
        let msg = parse_message(ALIVE).unwrap();
        assert_eq!(msg.kind, SsdpKind::Alive);
        assert_eq!(msg.max_age, 100);
        assert_eq!(msg.boot_id, Some(1));
        assert_eq!(msg.config_id, Some(7));
        assert_eq!(extract_uuid_from_usn(&msg.usn).as_deref(), Some("abcd-1"));
    }

    #[test]
    fn test_parse_rejects_unknown_messages() {
        assert!(parse_message("M-SEARCH * HTTP/1.1\r\nST: ssdp:all\r\n\r\n").is_none());
        assert!(parse_message("HTTP/1.1 200 OK\r\nST: upnp:rootdevice\r\nUSN: uuid:x\r\n\r\n").is_none());
    }

    #[test]
    fn test_table_lifecycle() {
        let mut table = RootTable::default();
        let now = Instant::now();
        let alive = parse_message(ALIVE).unwrap();

        match table.apply(alive.clone(), ip(), now) {
            Some(DiscoveryEvent::RootDeviceAdded(entry)) => {
                assert_eq!(entry.uuid, "abcd-1");
                assert_eq!(entry.upnp_version, UpnpVersion { major: 1, minor: 1 });
                assert_eq!(entry.preferred_link.endpoint_ip, ip());
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(table.apply(alive.clone(), ip(), now), None);

        let mut rebooted = alive.clone();
        rebooted.boot_id = Some(2);
        assert!(matches!(
            table.apply(rebooted.clone(), ip(), now),
            Some(DiscoveryEvent::DeviceRebooted { configuration_changed: false, .. })
        ));

        rebooted.boot_id = Some(3);
        rebooted.config_id = Some(8);
        assert!(matches!(
            table.apply(rebooted, ip(), now),
            Some(DiscoveryEvent::DeviceRebooted { configuration_changed: true, .. })
        ));

        let mut byebye = alive;
        byebye.kind = SsdpKind::ByeBye;
        assert!(matches!(
            table.apply(byebye, ip(), now),
            Some(DiscoveryEvent::RootDeviceRemoved(_))
        ));
        assert!(table.roots.is_empty());
    }

    #[test]
    fn test_table_expiry() {
        let mut table = RootTable::default();
        let now = Instant::now();
        table.apply(parse_message(ALIVE).unwrap(), ip(), now);
        assert!(table.expire(now + Duration::from_secs(50)).is_empty());
        assert_eq!(table.expire(now + Duration::from_secs(100)).len(), 1);
    }
}

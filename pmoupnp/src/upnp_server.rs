//! Serveur HTTP de l'hôte UPnP.
//!
//! [`UpnpServer`] publie les devices racines enregistrés sur chaque
//! interface locale : documents de description (`GET`) et URLs de
//! contrôle SOAP (`POST`). Toutes les requêtes passent par un unique
//! handler de repli qui résout le chemin via l'[`EndpointConfiguration`]
//! de l'interface ciblée.

use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use axum::{
    Router,
    body::Bytes,
    extract::{ConnectInfo, State},
    http::{HeaderMap, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use parking_lot::RwLock;
use thiserror::Error;
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    ServerSettings, UpnpTyped,
    actions::CallContext,
    devices::Device,
    endpoints::{EndpointConfiguration, EndpointTarget, local_endpoint_addresses},
    object_trait::xml_document_string,
    soap::handle_control_request,
};

const XML_CONTENT_TYPE: &str = "text/xml; charset=\"utf-8\"";

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Device {0} is not a root device")]
    NotRootDevice(String),

    #[error("Device {0} is already registered")]
    DeviceAlreadyRegistered(String),

    #[error("Server already started")]
    AlreadyStarted,

    #[error("Cannot bind {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },
}

#[derive(Default)]
struct HostState {
    roots: RwLock<Vec<Arc<Device>>>,
    endpoints: RwLock<Vec<EndpointConfiguration>>,
}

impl HostState {
    /// Configuration de l'interface désignée par l'en-tête `Host`, ou la
    /// première à défaut.
    fn endpoint_for(&self, headers: &HeaderMap) -> Option<EndpointConfiguration> {
        let endpoints = self.endpoints.read();
        let host_ip = headers
            .get(header::HOST)
            .and_then(|h| h.to_str().ok())
            .and_then(parse_host_ip);

        host_ip
            .and_then(|ip| endpoints.iter().find(|e| e.endpoint_ip() == ip))
            .or_else(|| endpoints.first())
            .cloned()
    }
}

fn parse_host_ip(host: &str) -> Option<IpAddr> {
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split(']').next()?.parse().ok();
    }
    host.split(':').next()?.parse().ok()
}

/// Hôte HTTP des devices UPnP locaux.
pub struct UpnpServer {
    settings: ServerSettings,
    state: Arc<HostState>,
    local_addr: Option<SocketAddr>,
    shutdown: Option<oneshot::Sender<()>>,
    join_handle: Option<JoinHandle<()>>,
}

impl UpnpServer {
    pub fn new(settings: ServerSettings) -> Self {
        Self {
            settings,
            state: Arc::new(HostState::default()),
            local_addr: None,
            shutdown: None,
            join_handle: None,
        }
    }

    /// Enregistre un device racine. Ses URLs sont publiées immédiatement si
    /// le serveur tourne déjà.
    pub fn register_device(&self, device: Arc<Device>) -> Result<(), ServerError> {
        if !device.is_root() {
            return Err(ServerError::NotRootDevice(device.udn()));
        }
        {
            let mut roots = self.state.roots.write();
            if roots.iter().any(|d| d.uuid() == device.uuid()) {
                return Err(ServerError::DeviceAlreadyRegistered(device.udn()));
            }
            info!("✅ Device {} registered ({})", device.udn(), device.device_type_version_urn());
            roots.push(device);
        }

        if let Some(addr) = self.local_addr {
            self.refresh_endpoints(addr.port());
        }
        Ok(())
    }

    pub fn root_devices(&self) -> Vec<Arc<Device>> {
        self.state.roots.read().clone()
    }

    /// Configurations publiées, une par interface locale.
    pub fn endpoints(&self) -> Vec<EndpointConfiguration> {
        self.state.endpoints.read().clone()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    fn refresh_endpoints(&self, port: u16) {
        let roots = self.root_devices();
        let endpoints = local_endpoint_addresses()
            .into_iter()
            .map(|ip| {
                let mut config = EndpointConfiguration::new(ip, port).with_paths(
                    &self.settings.description_path,
                    &self.settings.control_path,
                    &self.settings.eventing_path,
                );
                config.generate_object_urls(&roots);
                config
            })
            .collect();
        *self.state.endpoints.write() = endpoints;
    }

    /// Démarre le serveur HTTP et retourne l'adresse effectivement liée.
    pub async fn start(&mut self) -> Result<SocketAddr, ServerError> {
        if self.join_handle.is_some() {
            return Err(ServerError::AlreadyStarted);
        }

        let address = format!("{}:{}", self.settings.bind_address, self.settings.http_port);
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| ServerError::Bind {
                address: address.clone(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| ServerError::Bind {
            address: address.clone(),
            source,
        })?;

        self.local_addr = Some(local_addr);
        self.refresh_endpoints(local_addr.port());

        let router = Router::new()
            .fallback(serve_upnp)
            .with_state(self.state.clone());

        let (tx, rx) = oneshot::channel();
        self.shutdown = Some(tx);
        self.join_handle = Some(tokio::spawn(async move {
            let server = axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async {
                let _ = rx.await;
            });
            if let Err(e) = server.await {
                warn!("❌ UPnP host stopped with error: {}", e);
            }
        }));

        info!("✅ UPnP host listening on {}", local_addr);
        Ok(local_addr)
    }

    /// Arrête le serveur et attend la fin de la tâche d'écoute.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.await;
        }
        self.local_addr = None;
        info!("UPnP host stopped");
    }
}

fn xml_response(status: StatusCode, body: String) -> Response {
    (status, [(header::CONTENT_TYPE, XML_CONTENT_TYPE)], body).into_response()
}

fn is_xml_content(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("text/xml"))
}

async fn serve_upnp(
    State(state): State<Arc<HostState>>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(config) = state.endpoint_for(&headers) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let Some(target) = config.resolve(uri.path()) else {
        debug!("No UPnP object at {}", uri.path());
        return StatusCode::NOT_FOUND.into_response();
    };

    let locale = headers
        .get(header::ACCEPT_LANGUAGE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string());

    match (target, method) {
        (EndpointTarget::RootDescription(device), Method::GET) => {
            let document = device
                .build_root_device_description(&config, locale.as_deref())
                .map_err(|e| e.to_string())
                .and_then(|doc| xml_document_string(&doc).map_err(|e| e.to_string()));
            match document {
                Ok(xml) => xml_response(StatusCode::OK, xml),
                Err(e) => {
                    warn!("❌ Cannot build description of {}: {}", device.udn(), e);
                    StatusCode::INTERNAL_SERVER_ERROR.into_response()
                }
            }
        }
        (EndpointTarget::Scpd(service), Method::GET) => {
            let document = service
                .build_scpd_document(&config)
                .map_err(|e| e.to_string())
                .and_then(|doc| xml_document_string(&doc).map_err(|e| e.to_string()));
            match document {
                Ok(xml) => xml_response(StatusCode::OK, xml),
                Err(e) => {
                    warn!("❌ Cannot build SCPD of {}: {}", service.get_name(), e);
                    StatusCode::INTERNAL_SERVER_ERROR.into_response()
                }
            }
        }
        (EndpointTarget::Control(service), Method::POST) => {
            if !is_xml_content(&headers) {
                return StatusCode::UNSUPPORTED_MEDIA_TYPE.into_response();
            }
            let ctx = CallContext {
                endpoint_ip: Some(config.endpoint_ip()),
                remote_addr: Some(remote),
                locale,
            };
            let response = handle_control_request(service, &body, &ctx);
            let status =
                StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            xml_response(status, response.body)
        }
        (_, method) => {
            debug!("Method {} not allowed on {}", method, uri.path());
            StatusCode::METHOD_NOT_ALLOWED.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        action_handler,
        actions::{Action, Argument},
        devices::DeviceInformation,
        services::Service,
        soap::build_soap_request,
        state_variables::StateVariable,
        variable_types::{StateValue, StateVarType},
    };

    const UUID: &str = "0b7c9f1e-5a55-4c1d-8d40-2a1f3e4b5c6d";

    fn renderer() -> Arc<Device> {
        let device = Arc::new(
            Device::new(
                "schemas-upnp-org:device:MediaRenderer",
                1,
                UUID,
                DeviceInformation {
                    friendly_name: "Salon".to_string(),
                    manufacturer: "PMOMusic".to_string(),
                    model_name: "Renderer".to_string(),
                    ..Default::default()
                },
            )
            .unwrap(),
        );
        let service = Arc::new(
            Service::new(
                "schemas-upnp-org:service:RenderingControl",
                1,
                "urn:upnp-org:serviceId:RenderingControl",
            )
            .unwrap(),
        );
        let volume = Arc::new(StateVariable::new("Volume", StateVarType::UI2));
        service.add_state_variable(volume.clone()).unwrap();
        let get = Arc::new(Action::new("GetVolume"));
        get.add_argument(Arc::new(Argument::new_out("CurrentVolume", volume)))
            .unwrap();
        get.set_handler(action_handler!(|_a, _p, _c| Ok(vec![StateValue::UI2(7)])));
        service.add_action(get).unwrap();
        device.add_service(service).unwrap();
        device
    }

    async fn started() -> (UpnpServer, String, EndpointConfiguration) {
        let mut server = UpnpServer::new(ServerSettings {
            http_port: 0,
            bind_address: "127.0.0.1".to_string(),
            ..Default::default()
        });
        server.register_device(renderer()).unwrap();
        let addr = server.start().await.unwrap();
        let config = server.endpoints().remove(0);
        (server, format!("http://{}", addr), config)
    }

    #[test]
    fn test_parse_host_ip() {
        assert_eq!(parse_host_ip("127.0.0.1:8080"), Some(IpAddr::from([127, 0, 0, 1])));
        assert_eq!(parse_host_ip("[::1]:80"), "::1".parse().ok());
        assert_eq!(parse_host_ip("localhost"), None);
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let server = UpnpServer::new(ServerSettings::default());
        server.register_device(renderer()).unwrap();
        assert!(matches!(
            server.register_device(renderer()),
            Err(ServerError::DeviceAlreadyRegistered(_))
        ));
    }

    #[tokio::test]
    async fn test_description_documents_are_served() {
        let (mut server, base, config) = started().await;
        let client = reqwest::Client::new();

        let path = config.root_description_path(UUID).unwrap();
        let response = client.get(format!("{}{}", base, path)).send().await.unwrap();
        assert_eq!(response.status(), 200);
        let body = response.text().await.unwrap();
        assert!(body.contains("<friendlyName>Salon</friendlyName>"));

        let urls = config
            .get_service_urls(UUID, "urn:upnp-org:serviceId:RenderingControl")
            .unwrap()
            .clone();
        let response = client
            .get(format!("{}{}", base, urls.scpd_url))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert!(response.text().await.unwrap().contains("<name>GetVolume</name>"));

        let response = client.get(format!("{}/nowhere", base)).send().await.unwrap();
        assert_eq!(response.status(), 404);

        let response = client.put(format!("{}{}", base, path)).send().await.unwrap();
        assert_eq!(response.status(), 405);

        server.stop().await;
    }

    #[tokio::test]
    async fn test_control_requests() {
        let (mut server, base, config) = started().await;
        let client = reqwest::Client::new();
        let urls = config
            .get_service_urls(UUID, "urn:upnp-org:serviceId:RenderingControl")
            .unwrap()
            .clone();
        let url = format!("{}{}", base, urls.control_url);
        let envelope = build_soap_request(
            "urn:schemas-upnp-org:service:RenderingControl:1",
            "GetVolume",
            Vec::new(),
        )
        .unwrap();

        let response = client
            .post(&url)
            .header("Content-Type", "application/json")
            .body(envelope.clone())
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 415);

        let response = client
            .post(&url)
            .header("Content-Type", XML_CONTENT_TYPE)
            .header("SOAPACTION", "\"urn:schemas-upnp-org:service:RenderingControl:1#GetVolume\"")
            .body(envelope)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert!(response
            .text()
            .await
            .unwrap()
            .contains("<CurrentVolume>7</CurrentVolume>"));

        let response = client.get(&url).send().await.unwrap();
        assert_eq!(response.status(), 405);

        server.stop().await;
    }
}

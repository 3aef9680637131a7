//! HTTP exchanges of the control point.
//!
//! Every request the control point emits (description fetches, SOAP calls,
//! GENA subscriptions) goes through an [`HttpTransport`]. Timeouts are
//! applied by the callers, so an implementation only has to perform the
//! exchange. [`ReqwestTransport`] is the production implementation; tests
//! plug in-memory transports.

use std::{collections::HashMap, net::IpAddr};

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{Client, Method};
use tracing::{debug, trace};

use crate::errors::TransportError;

pub const XML_CONTENT_TYPE: &str = "text/xml; charset=\"utf-8\"";

/// `USER-AGENT` of every request of the control point.
pub const USER_AGENT: &str = "PMOMusic UPnP/1.1 pmocontrol/0.3";

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// Local address the request must leave from
    pub local_ip: Option<IpAddr>,
}

impl HttpRequest {
    pub fn new(method: &str, url: &str) -> Self {
        Self {
            method: method.to_string(),
            url: url.to_string(),
            headers: Vec::new(),
            body: Vec::new(),
            local_ip: None,
        }
    }

    pub fn get(url: &str) -> Self {
        Self::new("GET", url)
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn bound_to(mut self, local_ip: Option<IpAddr>) -> Self {
        self.local_ip = local_ip;
        self
    }

    /// Case-insensitive header lookup.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// True when the media type of `Content-Type` is `text/xml`.
    pub fn is_xml(&self) -> bool {
        self.header("Content-Type").is_some_and(is_xml_media_type)
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// `text/xml; charset="utf-8"` → true.
pub fn is_xml_media_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|media| media.trim().eq_ignore_ascii_case("text/xml"))
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// reqwest-backed transport.
///
/// Advertises `Accept-Encoding: gzip, deflate` and decompresses bodies
/// transparently. One client is kept per local address.
#[derive(Default)]
pub struct ReqwestTransport {
    clients: Mutex<HashMap<Option<IpAddr>, Client>>,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn client(&self, local_ip: Option<IpAddr>, url: &str) -> Result<Client, TransportError> {
        let mut clients = self.clients.lock();
        if let Some(client) = clients.get(&local_ip) {
            return Ok(client.clone());
        }
        let client = Client::builder()
            .gzip(true)
            .deflate(true)
            .local_address(local_ip)
            .build()
            .map_err(|e| TransportError::InvalidRequest {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        debug!("HTTP client created for local address {:?}", local_ip);
        clients.insert(local_ip, client.clone());
        Ok(client)
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let method =
            Method::from_bytes(request.method.as_bytes()).map_err(|e| TransportError::InvalidRequest {
                url: request.url.clone(),
                message: e.to_string(),
            })?;
        let client = self.client(request.local_ip, &request.url)?;

        trace!("{} {}", request.method, request.url);
        let mut builder = client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body);
        }

        let failed = |e: reqwest::Error| TransportError::Request {
            url: request.url.clone(),
            message: e.to_string(),
        };
        let response = builder.send().await.map_err(failed)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        let body = response.bytes().await.map_err(failed)?.to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let response = HttpResponse::new(200).with_header("content-type", XML_CONTENT_TYPE);
        assert_eq!(response.header("Content-Type"), Some(XML_CONTENT_TYPE));
        assert!(response.is_xml());
        assert!(!HttpResponse::new(200).is_xml());
    }

    #[test]
    fn test_xml_media_type() {
        assert!(is_xml_media_type("text/xml"));
        assert!(is_xml_media_type("TEXT/XML ; charset=utf-8"));
        assert!(!is_xml_media_type("application/xml"));
    }

    #[test]
    fn test_request_builder() {
        let request = HttpRequest::new("SUBSCRIBE", "http://10.0.0.2/evt")
            .header("NT", "upnp:event")
            .bound_to(Some(IpAddr::from([10, 0, 0, 1])));
        assert_eq!(request.header_value("nt"), Some("upnp:event"));
        assert_eq!(request.local_ip, Some(IpAddr::from([10, 0, 0, 1])));
    }
}

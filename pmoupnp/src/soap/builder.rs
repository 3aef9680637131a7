//! Construction de requêtes et réponses SOAP

use xmltree::{Element, EmitterConfig, XMLNode};

use crate::soap::{SOAP_ENCODING, SOAP_ENVELOPE_NS};

pub(crate) fn build_soap_envelope_with_body(body_child: Element) -> Result<String, xmltree::Error> {
    // Body
    let mut body = Element::new("s:Body");
    body.children.push(XMLNode::Element(body_child));

    // Envelope
    let mut envelope = Element::new("s:Envelope");
    envelope
        .attributes
        .insert("xmlns:s".to_string(), SOAP_ENVELOPE_NS.to_string());
    envelope
        .attributes
        .insert("s:encodingStyle".to_string(), SOAP_ENCODING.to_string());
    envelope.children.push(XMLNode::Element(body));

    let mut buf = Vec::new();
    let config = EmitterConfig::new()
        .write_document_declaration(true)
        .perform_indent(false);
    envelope.write_with_config(&mut buf, config)?;

    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn action_element(name: String, service_urn: &str, arguments: Vec<Element>) -> Element {
    let mut elem = Element::new(&name);
    elem.attributes
        .insert("xmlns:u".to_string(), service_urn.to_string());
    elem.children
        .extend(arguments.into_iter().map(XMLNode::Element));
    elem
}

/// Construit une réponse SOAP UPnP
///
/// # Arguments
///
/// * `service_urn` - URN du service (ex: "urn:schemas-upnp-org:service:AVTransport:1")
/// * `action` - Nom de l'action (ex: "GetPositionInfo")
/// * `values` - Éléments des arguments de sortie, dans l'ordre de déclaration
pub fn build_soap_response(
    service_urn: &str,
    action: &str,
    values: Vec<Element>,
) -> Result<String, xmltree::Error> {
    build_soap_envelope_with_body(action_element(
        format!("u:{}Response", action),
        service_urn,
        values,
    ))
}

/// Construit une requête SOAP UPnP, arguments d'entrée dans l'ordre.
pub fn build_soap_request(
    service_urn: &str,
    action: &str,
    args: Vec<Element>,
) -> Result<String, xmltree::Error> {
    build_soap_envelope_with_body(action_element(format!("u:{}", action), service_urn, args))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_trait::text_element;

    #[test]
    fn test_build_response() {
        let values = vec![
            text_element("Track", "5"),
            text_element("TrackDuration", "00:03:45"),
        ];

        let xml = build_soap_response(
            "urn:schemas-upnp-org:service:AVTransport:1",
            "GetPositionInfo",
            values,
        )
        .unwrap();

        assert!(xml.contains("GetPositionInfoResponse"));
        assert!(xml.contains("<Track>5</Track>"));
        assert!(xml.contains("<TrackDuration>00:03:45</TrackDuration>"));
        assert!(xml.contains("xmlns:s=\"http://schemas.xmlsoap.org/soap/envelope/\""));
    }

    #[test]
    fn test_build_empty_request() {
        let xml = build_soap_request("urn:schemas-upnp-org:service:AVTransport:1", "Stop", Vec::new())
            .unwrap();

        assert!(xml.contains("u:Stop"));
        assert!(xml.contains("xmlns:u=\"urn:schemas-upnp-org:service:AVTransport:1\""));
    }
}

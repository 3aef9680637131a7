//! SOAP Faults pour UPnP

use xmltree::{Element, XMLNode};

use crate::{
    UpnpError,
    object_trait::text_element,
    soap::{
        SoapParseError, UPNP_CONTROL_NS, builder::build_soap_envelope_with_body,
        parse_soap_envelope,
    },
    variable_types::element_text,
};

/// Erreur SOAP (Fault)
#[derive(Debug, Clone, PartialEq)]
pub struct SoapFault {
    /// Code d'erreur (ex: "s:Client")
    pub fault_code: String,

    /// Description de l'erreur
    pub fault_string: String,

    /// Détails UPnP optionnels (`<UPnPError>`)
    pub upnp_error: Option<UpnpError>,
}

impl SoapFault {
    /// Erreur UPnP portée par le fault, ou 501 à défaut de détail exploitable.
    pub fn into_upnp_error(self) -> UpnpError {
        self.upnp_error
            .unwrap_or_else(|| UpnpError::action_failed(self.fault_string))
    }
}

/// Construit un SOAP Fault XML
///
/// # Arguments
///
/// * `fault_code` - Code du fault (ex: "s:Client")
/// * `fault_string` - Message d'erreur
/// * `upnp_error` - Erreur UPnP optionnelle placée dans `<detail>`
pub fn build_soap_fault(
    fault_code: &str,
    fault_string: &str,
    upnp_error: Option<&UpnpError>,
) -> Result<String, xmltree::Error> {
    let mut fault = Element::new("s:Fault");
    fault
        .children
        .push(XMLNode::Element(text_element("faultcode", fault_code)));
    fault
        .children
        .push(XMLNode::Element(text_element("faultstring", fault_string)));

    if let Some(error) = upnp_error {
        let mut upnp = Element::new("UPnPError");
        upnp.attributes
            .insert("xmlns".to_string(), UPNP_CONTROL_NS.to_string());
        upnp.children.push(XMLNode::Element(text_element(
            "errorCode",
            &error.code.to_string(),
        )));
        upnp.children.push(XMLNode::Element(text_element(
            "errorDescription",
            &error.description,
        )));

        let mut detail = Element::new("detail");
        detail.children.push(XMLNode::Element(upnp));
        fault.children.push(XMLNode::Element(detail));
    }

    build_soap_envelope_with_body(fault)
}

/// Parse le corps d'une réponse HTTP 500 en SOAP Fault.
pub fn parse_soap_fault(xml: &[u8]) -> Result<SoapFault, SoapParseError> {
    let envelope = parse_soap_envelope(xml)?;
    let fault = envelope
        .body
        .get_child("Fault")
        .ok_or(SoapParseError::NoFault)?;

    let text_of = |name: &str| fault.get_child(name).map(element_text).unwrap_or_default();

    let upnp_error = fault
        .get_child("detail")
        .and_then(|d| d.get_child("UPnPError"))
        .and_then(|e| {
            let code = e
                .get_child("errorCode")
                .map(element_text)?
                .trim()
                .parse::<u32>()
                .ok()?;
            let description = e
                .get_child("errorDescription")
                .map(element_text)
                .unwrap_or_default();
            Some(UpnpError::new(code, description))
        });

    Ok(SoapFault {
        fault_code: text_of("faultcode"),
        fault_string: text_of("faultstring"),
        upnp_error,
    })
}

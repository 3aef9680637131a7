//! Parser SOAP pour actions UPnP

use std::io::BufReader;

use xmltree::Element;

use crate::variable_types::element_text;

/// Enveloppe SOAP : en-tête optionnel et corps.
#[derive(Debug, Clone)]
pub struct SoapEnvelope {
    pub header: Option<Element>,
    pub body: Element,
}

impl SoapEnvelope {
    /// Premier élément du corps (l'action, sa réponse ou un Fault).
    pub fn body_content(&self) -> Option<&Element> {
        self.body.children.iter().find_map(|n| n.as_element())
    }
}

/// Action UPnP extraite d'une enveloppe SOAP
#[derive(Debug, Clone)]
pub struct SoapAction {
    /// Nom de l'action (ex: "Play", "SetAVTransportURI")
    pub name: String,

    /// Namespace de l'action (ex: "urn:schemas-upnp-org:service:AVTransport:1")
    pub namespace: Option<String>,

    /// Éléments des arguments, dans l'ordre du document
    pub arguments: Vec<Element>,
}

impl SoapAction {
    pub fn argument(&self, name: &str) -> Option<&Element> {
        self.arguments.iter().find(|e| e.name == name)
    }

    /// Texte d'un argument simple.
    pub fn arg_text(&self, name: &str) -> Option<String> {
        self.argument(name).map(element_text)
    }
}

/// Erreur de parsing SOAP
#[derive(Debug, thiserror::Error)]
pub enum SoapParseError {
    #[error("XML parse error: {0}")]
    XmlError(#[from] xmltree::ParseError),

    #[error("Missing SOAP Envelope")]
    MissingEnvelope,

    #[error("Missing SOAP Body")]
    MissingBody,

    #[error("No action found in SOAP Body")]
    NoAction,

    #[error("Unexpected body element <{0}>")]
    UnexpectedElement(String),

    #[error("Missing SOAP Fault")]
    NoFault,
}

/// Parse une action SOAP à partir de bytes XML
pub fn parse_soap_action(xml: &[u8]) -> Result<SoapAction, SoapParseError> {
    let envelope = parse_soap_envelope(xml)?;
    let action_elem = envelope.body_content().ok_or(SoapParseError::NoAction)?;

    Ok(SoapAction {
        name: action_elem.name.clone(),
        namespace: action_elem.namespace.clone(),
        arguments: action_elem
            .children
            .iter()
            .filter_map(|n| n.as_element())
            .cloned()
            .collect(),
    })
}

/// Parse une enveloppe SOAP complète
pub fn parse_soap_envelope(xml: &[u8]) -> Result<SoapEnvelope, SoapParseError> {
    let reader = BufReader::new(xml);
    let root = Element::parse(reader)?;

    if root.name != "Envelope" {
        return Err(SoapParseError::MissingEnvelope);
    }

    let header = root.get_child("Header").cloned();
    let body = root
        .get_child("Body")
        .cloned()
        .ok_or(SoapParseError::MissingBody)?;

    Ok(SoapEnvelope { header, body })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_action() {
        let xml = r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <u:Play xmlns:u="urn:schemas-upnp-org:service:AVTransport:1">
      <InstanceID>0</InstanceID>
      <Speed>1</Speed>
    </u:Play>
  </s:Body>
</s:Envelope>"#;

        let action = parse_soap_action(xml.as_bytes()).unwrap();
        assert_eq!(action.name, "Play");
        assert_eq!(
            action.namespace,
            Some("urn:schemas-upnp-org:service:AVTransport:1".to_string())
        );
        let names: Vec<_> = action.arguments.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["InstanceID", "Speed"]);
        assert_eq!(action.arg_text("Speed").as_deref(), Some("1"));
    }

    #[test]
    fn test_parse_action_no_args() {
        let xml = r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <u:Stop xmlns:u="urn:schemas-upnp-org:service:AVTransport:1"/>
  </s:Body>
</s:Envelope>"#;

        let action = parse_soap_action(xml.as_bytes()).unwrap();
        assert_eq!(action.name, "Stop");
        assert!(action.arguments.is_empty());
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            parse_soap_envelope(b"<notxml"),
            Err(SoapParseError::XmlError(_))
        ));
        assert!(matches!(
            parse_soap_envelope(b"<Other/>"),
            Err(SoapParseError::MissingEnvelope)
        ));
        assert!(matches!(
            parse_soap_action(
                br#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"><s:Body/></s:Envelope>"#
            ),
            Err(SoapParseError::NoAction)
        ));
    }
}

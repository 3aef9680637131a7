use xmltree::{Element, EmitterConfig, XMLNode};

use crate::UpnpObjectType;

/// Sérialisation d'un document complet avec en-tête XML et indentation.
pub fn xml_document_string(elem: &Element) -> Result<String, xmltree::Error> {
    let config = EmitterConfig::new()
        .perform_indent(true)
        .indent_string("  ")
        .write_document_declaration(false);

    let mut buf = Vec::new();
    elem.write_with_config(&mut buf, config)?;

    let mut xml_string = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n".to_string();
    xml_string.push_str(&String::from_utf8_lossy(&buf));
    Ok(xml_string)
}

/// Objet représentable par un fragment XML.
pub trait UpnpXml {
    fn to_xml_element(&self) -> Element;

    fn to_xml(&self) -> Result<String, xmltree::Error> {
        xml_document_string(&self.to_xml_element())
    }
}

/// Objet UPnP nommé.
pub trait UpnpTyped {
    fn as_upnp_object_type(&self) -> &UpnpObjectType;

    fn get_name(&self) -> &str {
        &self.as_upnp_object_type().name
    }

    fn get_object_type(&self) -> &str {
        &self.as_upnp_object_type().object_type
    }
}

pub(crate) fn text_element(name: &str, text: &str) -> Element {
    let mut elem = Element::new(name);
    elem.children.push(XMLNode::Text(text.to_string()));
    elem
}

/// `<specVersion>` 1.1
pub(crate) fn spec_version_element() -> Element {
    let mut spec = Element::new("specVersion");
    spec.children
        .push(XMLNode::Element(text_element("major", "1")));
    spec.children
        .push(XMLNode::Element(text_element("minor", "1")));
    spec
}

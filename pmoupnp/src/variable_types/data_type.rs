//! Abstraction commune aux types standards et étendus.

use std::{collections::HashMap, fmt, sync::Arc};

use xmltree::{Element, XMLNode};

use crate::variable_types::{StateValue, StateValueError, StateVarType};

/// Type de données défini par un schéma XML tiers (UDA 1.1 §2.5).
///
/// Les valeurs d'un type étendu sont échangées soit sous forme d'un
/// sous-document conforme au schéma, soit, si le type le permet ou si le
/// pair est un client UPnP 1.0, sous une forme chaîne équivalente.
pub trait ExtendedDataType: Send + Sync + fmt::Debug {
    /// URI du schéma XML qui définit le type.
    fn schema_uri(&self) -> &str;

    /// Nom du type dans son schéma.
    fn data_type_name(&self) -> &str;

    /// Indique si le type possède une représentation chaîne équivalente.
    fn supports_string_equivalent(&self) -> bool {
        false
    }

    fn is_assignable_from(&self, value: &StateValue) -> bool;

    fn serialize_structured(&self, value: &StateValue) -> Result<Element, StateValueError>;

    fn deserialize_structured(&self, element: &Element) -> Result<StateValue, StateValueError>;

    fn serialize_simple(&self, _value: &StateValue) -> Result<String, StateValueError> {
        Err(StateValueError::ConversionError(format!(
            "Data type '{}' has no string equivalent",
            self.data_type_name()
        )))
    }

    fn deserialize_simple(&self, _text: &str) -> Result<StateValue, StateValueError> {
        Err(StateValueError::ConversionError(format!(
            "Data type '{}' has no string equivalent",
            self.data_type_name()
        )))
    }
}

/// Type d'une variable d'état : standard ou étendu.
#[derive(Debug, Clone)]
pub enum DataType {
    Standard(StateVarType),
    Extended(Arc<dyn ExtendedDataType>),
}

impl From<StateVarType> for DataType {
    fn from(value: StateVarType) -> Self {
        DataType::Standard(value)
    }
}

impl DataType {
    pub fn extended(data_type: impl ExtendedDataType + 'static) -> Self {
        DataType::Extended(Arc::new(data_type))
    }

    /// Nom du type (`ui4`, `string`, ou nom du type étendu).
    pub fn name(&self) -> &str {
        match self {
            DataType::Standard(t) => t.wire_name(),
            DataType::Extended(t) => t.data_type_name(),
        }
    }

    pub fn is_extended(&self) -> bool {
        matches!(self, DataType::Extended(_))
    }

    pub fn as_standard(&self) -> Option<StateVarType> {
        match self {
            DataType::Standard(t) => Some(*t),
            DataType::Extended(_) => None,
        }
    }

    pub fn supports_string_equivalent(&self) -> bool {
        match self {
            DataType::Standard(_) => true,
            DataType::Extended(t) => t.supports_string_equivalent(),
        }
    }

    /// Vrai si `value` peut être stockée dans une variable de ce type.
    ///
    /// Un type standard accepte la même représentation mémoire (`int` ≡ `i4`,
    /// `number` ≡ `fixed.14.4` ≡ `r8`) ; un type étendu décide lui-même.
    pub fn is_assignable_from(&self, value: &StateValue) -> bool {
        match self {
            DataType::Standard(t) => value
                .var_type()
                .is_some_and(|vt| vt.storage_type() == t.storage_type()),
            DataType::Extended(t) => t.is_assignable_from(value),
        }
    }

    /// Vrai si `value` est absente ou assignable.
    pub fn is_value_assignable(&self, value: Option<&StateValue>) -> bool {
        value.is_none_or(|v| self.is_assignable_from(v))
    }

    /// Forme chaîne d'une valeur (valeur par défaut, événements UPnP 1.0).
    pub fn to_simple_string(&self, value: &StateValue) -> Result<String, StateValueError> {
        self.check_assignable(value)?;
        match self {
            DataType::Standard(_) => Ok(value.to_string()),
            DataType::Extended(t) => t.serialize_simple(value),
        }
    }

    /// Inverse de [`to_simple_string`](Self::to_simple_string).
    pub fn from_simple_string(&self, text: &str) -> Result<StateValue, StateValueError> {
        match self {
            DataType::Standard(t) => StateValue::from_string(text, t),
            DataType::Extended(t) => t.deserialize_simple(text),
        }
    }

    /// Écrit la valeur comme contenu de `parent`.
    ///
    /// Un type étendu est écrit sous sa forme chaîne si `force_simple` est
    /// demandé ou s'il la supporte, sinon comme sous-document.
    pub fn soap_serialize_value(
        &self,
        value: &StateValue,
        force_simple: bool,
        parent: &mut Element,
    ) -> Result<(), StateValueError> {
        self.check_assignable(value)?;
        match self {
            DataType::Standard(_) => {
                parent.children.push(XMLNode::Text(value.to_string()));
            }
            DataType::Extended(t) if force_simple || t.supports_string_equivalent() => {
                parent.children.push(XMLNode::Text(t.serialize_simple(value)?));
            }
            DataType::Extended(t) => {
                parent
                    .children
                    .push(XMLNode::Element(t.serialize_structured(value)?));
            }
        }
        Ok(())
    }

    /// Lit la valeur contenue dans `parent`, inverse exact de
    /// [`soap_serialize_value`](Self::soap_serialize_value).
    pub fn soap_deserialize_value(
        &self,
        parent: &Element,
        is_simple: bool,
    ) -> Result<StateValue, StateValueError> {
        match self {
            DataType::Standard(t) => StateValue::from_string(&element_text(parent), t),
            DataType::Extended(t) if is_simple || t.supports_string_equivalent() => {
                t.deserialize_simple(&element_text(parent))
            }
            DataType::Extended(t) => {
                let child = parent
                    .children
                    .iter()
                    .find_map(|n| n.as_element())
                    .ok_or_else(|| {
                        StateValueError::ParseError(format!(
                            "Missing structured value for data type '{}'",
                            t.data_type_name()
                        ))
                    })?;
                t.deserialize_structured(child)
            }
        }
    }

    /// Élément `<dataType>` d'un SCPD.
    ///
    /// `ns_prefixes` associe l'URI de schéma de chaque type étendu au
    /// préfixe déclaré sur la racine du document.
    pub fn scpd_data_type_element(
        &self,
        ns_prefixes: &HashMap<String, String>,
    ) -> Result<Element, StateValueError> {
        let mut elem = Element::new("dataType");
        match self {
            DataType::Standard(t) => {
                elem.children.push(XMLNode::Text(t.wire_name().to_string()));
            }
            DataType::Extended(t) => {
                let prefix = ns_prefixes.get(t.schema_uri()).ok_or_else(|| {
                    StateValueError::TypeError(format!(
                        "No namespace prefix registered for schema '{}'",
                        t.schema_uri()
                    ))
                })?;
                elem.attributes.insert(
                    "type".to_string(),
                    format!("{}:{}", prefix, t.data_type_name()),
                );
                elem.children.push(XMLNode::Text("string".to_string()));
            }
        }
        Ok(elem)
    }

    fn check_assignable(&self, value: &StateValue) -> Result<(), StateValueError> {
        if self.is_assignable_from(value) {
            Ok(())
        } else {
            Err(StateValueError::TypeError(format!(
                "Value {:?} is not assignable to data type '{}'",
                value.var_type(),
                self.name()
            )))
        }
    }
}

/// Texte concaténé d'un élément, vide s'il n'en a pas.
pub fn element_text(elem: &Element) -> String {
    elem.get_text().map(|t| t.into_owned()).unwrap_or_default()
}

/// Type étendu dont les valeurs sont des documents XML de racine donnée.
#[derive(Debug, Clone)]
pub struct XmlDocumentDataType {
    schema_uri: String,
    name: String,
    root_element: String,
}

impl XmlDocumentDataType {
    pub fn new(schema_uri: &str, name: &str, root_element: &str) -> Self {
        Self {
            schema_uri: schema_uri.to_string(),
            name: name.to_string(),
            root_element: root_element.to_string(),
        }
    }
}

impl ExtendedDataType for XmlDocumentDataType {
    fn schema_uri(&self) -> &str {
        &self.schema_uri
    }

    fn data_type_name(&self) -> &str {
        &self.name
    }

    fn is_assignable_from(&self, value: &StateValue) -> bool {
        matches!(value, StateValue::Xml(e) if e.name == self.root_element)
    }

    fn serialize_structured(&self, value: &StateValue) -> Result<Element, StateValueError> {
        match value {
            StateValue::Xml(e) => Ok(e.clone()),
            _ => Err(StateValueError::TypeError(format!(
                "Expected an XML document for '{}'",
                self.name
            ))),
        }
    }

    fn deserialize_structured(&self, element: &Element) -> Result<StateValue, StateValueError> {
        if element.name != self.root_element {
            return Err(StateValueError::ParseError(format!(
                "Expected <{}>, found <{}>",
                self.root_element, element.name
            )));
        }
        Ok(StateValue::Xml(element.clone()))
    }

    // La forme simple est le document sérialisé (échappé comme texte)
    fn serialize_simple(&self, value: &StateValue) -> Result<String, StateValueError> {
        match value {
            StateValue::Xml(_) => Ok(value.to_string()),
            _ => Err(StateValueError::TypeError(format!(
                "Expected an XML document for '{}'",
                self.name
            ))),
        }
    }

    fn deserialize_simple(&self, text: &str) -> Result<StateValue, StateValueError> {
        let element = Element::parse(text.as_bytes())
            .map_err(|e| StateValueError::ParseError(e.to_string()))?;
        self.deserialize_structured(&element)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn didl_type() -> DataType {
        DataType::extended(XmlDocumentDataType::new(
            "urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/",
            "DIDL-Lite",
            "DIDL-Lite",
        ))
    }

    fn didl_value() -> StateValue {
        StateValue::Xml(Element::parse("<DIDL-Lite><item id=\"1\"/></DIDL-Lite>".as_bytes()).unwrap())
    }

    #[test]
    fn test_standard_assignability() {
        let t = DataType::Standard(StateVarType::I4);
        assert!(t.is_assignable_from(&StateValue::I4(1)));
        assert!(t.is_assignable_from(&StateValue::Int(1)));
        assert!(!t.is_assignable_from(&StateValue::UI4(1)));
        assert!(t.is_value_assignable(None));
        assert!(!t.is_value_assignable(Some(&StateValue::from("1"))));
    }

    #[test]
    fn test_standard_soap_roundtrip() {
        let t = DataType::Standard(StateVarType::DateTime);
        let value = StateVarType::DateTime.default_value();
        let mut parent = Element::new("Arg");
        t.soap_serialize_value(&value, false, &mut parent).unwrap();
        assert_eq!(t.soap_deserialize_value(&parent, false).unwrap(), value);
    }

    #[test]
    fn test_deserialize_failure_is_reported() {
        let t = DataType::Standard(StateVarType::UI1);
        let mut parent = Element::new("Arg");
        parent.children.push(XMLNode::Text("-4".to_string()));
        assert!(matches!(
            t.soap_deserialize_value(&parent, false),
            Err(StateValueError::ParseError(_))
        ));
    }

    #[test]
    fn test_extended_structured_and_simple_forms() {
        let t = didl_type();
        let value = didl_value();

        let mut structured = Element::new("Result");
        t.soap_serialize_value(&value, false, &mut structured).unwrap();
        assert!(structured.get_child("DIDL-Lite").is_some());
        assert_eq!(t.soap_deserialize_value(&structured, false).unwrap(), value);

        let mut simple = Element::new("Result");
        t.soap_serialize_value(&value, true, &mut simple).unwrap();
        assert!(simple.get_child("DIDL-Lite").is_none());
        assert_eq!(t.soap_deserialize_value(&simple, true).unwrap(), value);
    }

    #[test]
    fn test_extended_rejects_standard_values() {
        let t = didl_type();
        assert!(!t.is_assignable_from(&StateValue::from("<DIDL-Lite/>")));
        let mut parent = Element::new("Result");
        assert!(t.soap_serialize_value(&StateValue::UI1(1), false, &mut parent).is_err());
    }

    #[test]
    fn test_scpd_data_type_element() {
        let mut prefixes = HashMap::new();
        prefixes.insert(
            "urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/".to_string(),
            "dt0".to_string(),
        );
        let elem = didl_type().scpd_data_type_element(&prefixes).unwrap();
        assert_eq!(elem.attributes.get("type").map(String::as_str), Some("dt0:DIDL-Lite"));

        let elem = DataType::Standard(StateVarType::UI4)
            .scpd_data_type_element(&prefixes)
            .unwrap();
        assert_eq!(element_text(&elem), "ui4");

        assert!(didl_type().scpd_data_type_element(&HashMap::new()).is_err());
    }
}

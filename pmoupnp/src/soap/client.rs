//! Encodage des appels et décodage des résultats côté control point.

use xmltree::Element;

use crate::{
    soap::{SoapError, SoapParseError, build_soap_request, parse_soap_envelope},
    variable_types::{DataType, StateValue},
};

/// Vrai si l'élément ne contient que du texte (forme simple d'une valeur).
pub(crate) fn is_simple_value(elem: &Element) -> bool {
    elem.children.iter().all(|n| n.as_element().is_none())
}

/// Construit l'enveloppe d'un appel d'action.
///
/// `arguments` donne, dans l'ordre des arguments d'entrée, le nom, le type
/// et la valeur de chacun. `force_simple` impose la forme chaîne des types
/// étendus (pairs UPnP 1.0).
pub fn encode_action_call(
    action_name: &str,
    service_urn: &str,
    arguments: &[(&str, &DataType, &StateValue)],
    force_simple: bool,
) -> Result<String, SoapError> {
    let mut elements = Vec::with_capacity(arguments.len());
    for (name, data_type, value) in arguments {
        let mut elem = Element::new(name);
        data_type
            .soap_serialize_value(value, force_simple, &mut elem)
            .map_err(|source| SoapError::Value {
                name: name.to_string(),
                source,
            })?;
        elements.push(elem);
    }
    Ok(build_soap_request(service_urn, action_name, elements)?)
}

/// Décode la réponse d'une action selon ses arguments de sortie formels.
pub fn parse_action_result(
    xml: &[u8],
    action_name: &str,
    out_arguments: &[(&str, &DataType)],
) -> Result<Vec<StateValue>, SoapError> {
    let envelope = parse_soap_envelope(xml)?;
    let response = envelope.body_content().ok_or(SoapParseError::NoAction)?;

    let expected = format!("{}Response", action_name);
    if response.name != expected {
        return Err(SoapParseError::UnexpectedElement(response.name.clone()).into());
    }

    out_arguments
        .iter()
        .map(|(name, data_type)| {
            let elem = response
                .get_child(*name)
                .ok_or_else(|| SoapError::MissingArgument(name.to_string()))?;
            data_type
                .soap_deserialize_value(elem, is_simple_value(elem))
                .map_err(|source| SoapError::Value {
                    name: name.to_string(),
                    source,
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        soap::{build_soap_response, parse_soap_action},
        variable_types::StateVarType,
    };

    const URN: &str = "urn:schemas-upnp-org:service:RenderingControl:1";

    #[test]
    fn test_encode_action_call() {
        let ui4 = DataType::Standard(StateVarType::UI4);
        let string = DataType::Standard(StateVarType::String);
        let xml = encode_action_call(
            "SetVolume",
            URN,
            &[
                ("InstanceID", &ui4, &StateValue::UI4(0)),
                ("Channel", &string, &StateValue::from("Master")),
            ],
            false,
        )
        .unwrap();

        let action = parse_soap_action(xml.as_bytes()).unwrap();
        assert_eq!(action.name, "SetVolume");
        assert_eq!(action.namespace.as_deref(), Some(URN));
        assert_eq!(action.arg_text("Channel").as_deref(), Some("Master"));
    }

    #[test]
    fn test_encode_rejects_mistyped_value() {
        let ui4 = DataType::Standard(StateVarType::UI4);
        assert!(matches!(
            encode_action_call("X", URN, &[("A", &ui4, &StateValue::from("x"))], false),
            Err(SoapError::Value { .. })
        ));
    }

    #[test]
    fn test_parse_action_result() {
        let mut volume = Element::new("CurrentVolume");
        volume
            .children
            .push(xmltree::XMLNode::Text("42".to_string()));
        let xml = build_soap_response(URN, "GetVolume", vec![volume]).unwrap();

        let ui2 = DataType::Standard(StateVarType::UI2);
        let values =
            parse_action_result(xml.as_bytes(), "GetVolume", &[("CurrentVolume", &ui2)]).unwrap();
        assert_eq!(values, vec![StateValue::UI2(42)]);

        assert!(matches!(
            parse_action_result(xml.as_bytes(), "GetVolume", &[("Missing", &ui2)]),
            Err(SoapError::MissingArgument(_))
        ));
        assert!(matches!(
            parse_action_result(xml.as_bytes(), "GetMute", &[]),
            Err(SoapError::Parse(SoapParseError::UnexpectedElement(_)))
        ));
    }
}

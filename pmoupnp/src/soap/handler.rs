//! Dispatch d'un appel SOAP entrant sur un service local.

use tracing::{debug, warn};
use xmltree::Element;

use crate::{
    UpnpError, UpnpTyped,
    actions::CallContext,
    error_codes,
    services::Service,
    soap::{build_soap_fault, build_soap_response, client::is_simple_value, parse_soap_action},
    state_variables::StateVariableError,
    variable_types::StateValue,
};

/// Réponse HTTP d'un appel de contrôle.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlResponse {
    pub status: u16,
    pub body: String,
}

impl ControlResponse {
    fn fault(error: &UpnpError) -> Self {
        let body = build_soap_fault("s:Client", "UPnPError", Some(error)).unwrap_or_else(|e| {
            warn!("❌ Cannot serialize SOAP fault: {}", e);
            String::new()
        });
        Self { status: 500, body }
    }
}

fn constraint_error(err: &StateVariableError) -> UpnpError {
    match err {
        StateVariableError::OutOfRange(name) => UpnpError::new(
            error_codes::ARGUMENT_VALUE_OUT_OF_RANGE,
            format!("Argument Value Out of Range: {}", name),
        ),
        other => UpnpError::new(
            error_codes::ARGUMENT_VALUE_INVALID,
            format!("Argument Value Invalid: {}", other),
        ),
    }
}

/// Traite le corps d'un POST sur l'URL de contrôle de `service`.
///
/// Retourne 200 et l'enveloppe de réponse en cas de succès, 500 et un
/// SOAP Fault portant le code UPnP sinon.
pub fn handle_control_request(service: &Service, body: &[u8], ctx: &CallContext) -> ControlResponse {
    match dispatch(service, body, ctx) {
        Ok(body) => ControlResponse { status: 200, body },
        Err(error) => {
            debug!(
                "SOAP call on {} failed: {}",
                service.service_id(),
                error
            );
            ControlResponse::fault(&error)
        }
    }
}

fn dispatch(service: &Service, body: &[u8], ctx: &CallContext) -> Result<String, UpnpError> {
    let call = parse_soap_action(body).map_err(|e| {
        warn!("❌ Invalid SOAP envelope: {}", e);
        UpnpError::invalid_action()
    })?;

    let action = service
        .get_action(&call.name)
        .ok_or_else(UpnpError::invalid_action)?;

    let mut params = Vec::new();
    for argument in action.in_arguments() {
        let elem = call
            .argument(argument.get_name())
            .ok_or_else(UpnpError::invalid_args)?;
        let variable = argument.get_related_state_variable();
        let value = variable
            .data_type()
            .soap_deserialize_value(elem, is_simple_value(elem))
            .map_err(|e| {
                debug!("Argument {} rejected: {}", argument.get_name(), e);
                UpnpError::invalid_args()
            })?;
        variable
            .validate(Some(&value))
            .map_err(|e| constraint_error(&e))?;
        params.push(value);
    }

    let results: Vec<StateValue> = action.invoke_action(&params, false, ctx)?;

    let mut out_elements = Vec::with_capacity(results.len());
    for (argument, value) in action.out_arguments().iter().zip(&results) {
        let mut elem = Element::new(argument.get_name());
        argument
            .get_related_state_variable()
            .data_type()
            .soap_serialize_value(value, false, &mut elem)
            .map_err(|e| {
                warn!(
                    "❌ Cannot serialize out argument {} of {}: {}",
                    argument.get_name(),
                    action.get_name(),
                    e
                );
                UpnpError::action_failed("Action Failed")
            })?;
        out_elements.push(elem);
    }

    build_soap_response(
        &service.service_type_version_urn(),
        action.get_name(),
        out_elements,
    )
    .map_err(|e| UpnpError::action_failed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        action_handler,
        actions::{Action, Argument},
        soap::{build_soap_request, parse_soap_fault},
        state_variables::StateVariable,
        value_ranges::ValueRange,
        variable_types::StateVarType,
    };

    fn rendering_control() -> Arc<Service> {
        let service = Arc::new(
            Service::new(
                "schemas-upnp-org:service:RenderingControl",
                1,
                "urn:upnp-org:serviceId:RenderingControl",
            )
            .unwrap(),
        );
        let mut volume = StateVariable::new("Volume", StateVarType::UI2);
        volume
            .set_range(ValueRange::new(&StateValue::UI2(0), &StateValue::UI2(100)).unwrap())
            .unwrap();
        volume.set_default_value(StateValue::UI2(10)).unwrap();
        let volume = Arc::new(volume);
        service.add_state_variable(volume.clone()).unwrap();

        let set = Arc::new(Action::new("SetVolume"));
        set.add_argument(Arc::new(Argument::new_in("DesiredVolume", volume.clone())))
            .unwrap();
        set.set_handler(action_handler!(|action, params, _ctx| {
            let service = action.get_service().ok_or_else(UpnpError::invalid_action)?;
            let var = service.get_state_variable("Volume").ok_or_else(UpnpError::invalid_action)?;
            var.set_value(Some(params[0].clone()))
                .map_err(|e| UpnpError::action_failed(e.to_string()))?;
            Ok(Vec::new())
        }));
        service.add_action(set).unwrap();

        let get = Arc::new(Action::new("GetVolume"));
        get.add_argument(Arc::new(
            Argument::new_out("CurrentVolume", volume).as_return_value(),
        ))
        .unwrap();
        get.set_handler(action_handler!(|action, _params, _ctx| {
            let service = action.get_service().ok_or_else(UpnpError::invalid_action)?;
            let var = service.get_state_variable("Volume").ok_or_else(UpnpError::invalid_action)?;
            Ok(vec![var.get_value().unwrap_or(StateValue::UI2(0))])
        }));
        service.add_action(get).unwrap();

        service.add_action(Arc::new(Action::new("Mute"))).unwrap();
        service
    }

    fn request(action: &str, args: Vec<(&str, &str)>) -> Vec<u8> {
        let elements = args
            .into_iter()
            .map(|(name, value)| {
                let mut e = Element::new(name);
                e.children.push(xmltree::XMLNode::Text(value.to_string()));
                e
            })
            .collect();
        build_soap_request(
            "urn:schemas-upnp-org:service:RenderingControl:1",
            action,
            elements,
        )
        .unwrap()
        .into_bytes()
    }

    fn fault_code(response: &ControlResponse) -> u32 {
        assert_eq!(response.status, 500);
        parse_soap_fault(response.body.as_bytes())
            .unwrap()
            .into_upnp_error()
            .code
    }

    #[test]
    fn test_successful_call() {
        let service = rendering_control();
        let ctx = CallContext::default();

        let response =
            handle_control_request(&service, &request("SetVolume", vec![("DesiredVolume", "42")]), &ctx);
        assert_eq!(response.status, 200);
        assert!(response.body.contains("SetVolumeResponse"));

        let response = handle_control_request(&service, &request("GetVolume", vec![]), &ctx);
        assert_eq!(response.status, 200);
        assert!(response.body.contains("<CurrentVolume>42</CurrentVolume>"));
    }

    #[test]
    fn test_fault_codes() {
        let service = rendering_control();
        let ctx = CallContext::default();

        assert_eq!(
            fault_code(&handle_control_request(&service, b"not xml", &ctx)),
            error_codes::INVALID_ACTION
        );
        assert_eq!(
            fault_code(&handle_control_request(&service, &request("Stop", vec![]), &ctx)),
            error_codes::INVALID_ACTION
        );
        assert_eq!(
            fault_code(&handle_control_request(&service, &request("SetVolume", vec![]), &ctx)),
            error_codes::INVALID_ARGS
        );
        assert_eq!(
            fault_code(&handle_control_request(
                &service,
                &request("SetVolume", vec![("DesiredVolume", "loud")]),
                &ctx
            )),
            error_codes::INVALID_ARGS
        );
        assert_eq!(
            fault_code(&handle_control_request(
                &service,
                &request("SetVolume", vec![("DesiredVolume", "200")]),
                &ctx
            )),
            error_codes::ARGUMENT_VALUE_OUT_OF_RANGE
        );
        assert_eq!(
            fault_code(&handle_control_request(&service, &request("Mute", vec![]), &ctx)),
            error_codes::OPTIONAL_ACTION_NOT_IMPLEMENTED
        );
        assert_eq!(
            service.get_state_variable("Volume").unwrap().get_value(),
            Some(StateValue::UI2(10))
        );
        assert_eq!(service.get_action("Mute").unwrap().get_name(), "Mute");
    }
}

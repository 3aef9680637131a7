//! Callback d'invocation d'une action.
//!
//! L'invocation est synchrone : le callback reçoit l'action, les valeurs
//! d'entrée dans l'ordre des arguments `in`, et le contexte de l'appel ;
//! il retourne les valeurs de sortie dans l'ordre des arguments `out`.

use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use crate::{UpnpError, actions::Action, variable_types::StateValue};

/// Contexte d'un appel entrant.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    /// Adresse locale sur laquelle la requête a été reçue
    pub endpoint_ip: Option<IpAddr>,
    /// Adresse du control point appelant
    pub remote_addr: Option<SocketAddr>,
    /// Langue demandée (`ACCEPT-LANGUAGE`)
    pub locale: Option<String>,
}

/// Handler d'action UPnP.
pub type ActionHandler = Arc<
    dyn Fn(&Action, &[StateValue], &CallContext) -> Result<Vec<StateValue>, UpnpError>
        + Send
        + Sync,
>;

/// Crée un [`ActionHandler`] à partir d'une closure.
///
/// ```ignore
/// let handler = action_handler!(|_action, params, _ctx| {
///     Ok(vec![params[0].clone()])
/// });
/// ```
#[macro_export]
macro_rules! action_handler {
    (|$action:pat_param, $params:pat_param, $ctx:pat_param| $body:expr) => {{
        let handler: $crate::actions::ActionHandler = ::std::sync::Arc::new(
            move |$action: &$crate::actions::Action,
                  $params: &[$crate::variable_types::StateValue],
                  $ctx: &$crate::actions::CallContext|
                  -> ::std::result::Result<
                ::std::vec::Vec<$crate::variable_types::StateValue>,
                $crate::UpnpError,
            > { $body },
        );
        handler
    }};
}

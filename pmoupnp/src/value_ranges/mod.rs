mod methods;

use crate::variable_types::StateValue;

/// Plage de valeurs autorisées d'une variable numérique (`<allowedValueRange>`).
#[derive(Debug, Clone, PartialEq)]
pub struct ValueRange {
    min: StateValue,
    max: StateValue,
    step: Option<StateValue>,
}

use xmltree::{Element, XMLNode};

use crate::{
    value_ranges::ValueRange,
    variable_types::{StateValue, StateValueError, StateVarType},
};

// Écart toléré entre (v - min) / step et l'entier le plus proche
const STEP_TOLERANCE: f64 = 0.001;

impl ValueRange {
    pub fn new(min: &StateValue, max: &StateValue) -> Result<Self, StateValueError> {
        if !min.is_numeric() || !max.is_numeric() {
            return Err(StateValueError::TypeError(
                "A value range requires numeric bounds".to_string(),
            ));
        }
        if min.var_type().map(|t| t.storage_type()) != max.var_type().map(|t| t.storage_type()) {
            return Err(StateValueError::TypeError(
                "min and max do not belong to the same type".to_string(),
            ));
        }

        if f64::try_from(min)? > f64::try_from(max)? {
            return Err(StateValueError::RangeError(
                "Minimum cannot be greater than maximum".to_string(),
            ));
        }

        Ok(Self {
            min: min.clone(),
            max: max.clone(),
            step: None,
        })
    }

    pub fn with_step(mut self, step: &StateValue) -> Result<Self, StateValueError> {
        let s = f64::try_from(step)?;
        if s <= 0.0 {
            return Err(StateValueError::RangeError(
                "Step must be strictly positive".to_string(),
            ));
        }
        self.step = Some(step.clone());
        Ok(self)
    }

    pub fn get_minimum(&self) -> &StateValue {
        &self.min
    }

    pub fn get_maximum(&self) -> &StateValue {
        &self.max
    }

    pub fn get_step(&self) -> Option<&StateValue> {
        self.step.as_ref()
    }

    pub fn var_type(&self) -> Option<StateVarType> {
        self.min.var_type()
    }

    /// Vrai si `min ≤ value ≤ max` et, si un pas est défini, si
    /// `(value - min) / step` est entier à 0,001 près.
    pub fn is_value_in_range(&self, value: &StateValue) -> bool {
        let (Ok(v), Ok(min), Ok(max)) = (
            f64::try_from(value),
            f64::try_from(&self.min),
            f64::try_from(&self.max),
        ) else {
            return false;
        };

        if v < min || v > max {
            return false;
        }

        match self.step.as_ref().map(f64::try_from) {
            None => true,
            Some(Ok(step)) => {
                let steps = (v - min) / step;
                (steps - steps.round()).abs() <= STEP_TOLERANCE
            }
            Some(Err(_)) => false,
        }
    }

    /// Élément `<allowedValueRange>` d'un SCPD.
    pub fn to_xml_element(&self) -> Element {
        let mut range_elem = Element::new("allowedValueRange");

        let mut push = |name: &str, value: &StateValue| {
            let mut e = Element::new(name);
            e.children.push(XMLNode::Text(value.to_string()));
            range_elem.children.push(XMLNode::Element(e));
        };

        push("minimum", &self.min);
        push("maximum", &self.max);
        if let Some(step) = &self.step {
            push("step", step);
        }

        range_elem
    }
}

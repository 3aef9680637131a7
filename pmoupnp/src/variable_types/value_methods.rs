use std::cmp::Ordering;

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use url::Url;
use uuid::Uuid;

use crate::variable_types::{StateValue, StateValueError, StateVarType, UpnpVarType};

impl StateValue {
    /// Type standard de la valeur, `None` pour une valeur structurée
    /// (`StateValue::Xml`).
    pub fn var_type(&self) -> Option<StateVarType> {
        let t = match self {
            StateValue::UI1(_) => StateVarType::UI1,
            StateValue::UI2(_) => StateVarType::UI2,
            StateValue::UI4(_) => StateVarType::UI4,
            StateValue::I1(_) => StateVarType::I1,
            StateValue::I2(_) => StateVarType::I2,
            StateValue::I4(_) => StateVarType::I4,
            StateValue::Int(_) => StateVarType::Int,
            StateValue::R4(_) => StateVarType::R4,
            StateValue::R8(_) => StateVarType::R8,
            StateValue::Number(_) => StateVarType::Number,
            StateValue::Fixed14_4(_) => StateVarType::Fixed14_4,
            StateValue::Char(_) => StateVarType::Char,
            StateValue::String(_) => StateVarType::String,
            StateValue::BinBase64(_) => StateVarType::BinBase64,
            StateValue::BinHex(_) => StateVarType::BinHex,
            StateValue::URI(_) => StateVarType::URI,
            StateValue::UUID(_) => StateVarType::UUID,
            StateValue::Date(_) => StateVarType::Date,
            StateValue::DateTime(_) => StateVarType::DateTime,
            StateValue::DateTimeTZ(_) => StateVarType::DateTimeTZ,
            StateValue::Time(_) => StateVarType::Time,
            StateValue::TimeTZ(_) => StateVarType::TimeTZ,
            StateValue::Boolean(_) => StateVarType::Boolean,
            StateValue::Xml(_) => return None,
        };
        Some(t)
    }

    fn has_type(&self, pred: impl Fn(&StateVarType) -> bool) -> bool {
        self.var_type().is_some_and(|t| pred(&t))
    }

    pub fn is_integer(&self) -> bool {
        self.has_type(StateVarType::is_integer)
    }

    pub fn is_float(&self) -> bool {
        self.has_type(StateVarType::is_float)
    }

    pub fn is_numeric(&self) -> bool {
        self.has_type(StateVarType::is_numeric)
    }

    pub fn is_string(&self) -> bool {
        self.has_type(StateVarType::is_string)
    }

    /// Parse une chaîne de caractères en StateValue selon le type spécifié.
    ///
    /// C'est l'inverse exact de l'implémentation de `Display`.
    ///
    /// # Arguments
    ///
    /// * `s` - La chaîne à parser
    /// * `var_type` - Le type de variable attendu
    ///
    /// # Returns
    ///
    /// `Ok(StateValue)` si le parsing réussit, `Err(StateValueError::ParseError)` sinon.
    ///
    /// # Examples
    ///
    /// ```
    /// use pmoupnp::variable_types::{StateValue, StateVarType};
    ///
    /// let value = StateValue::from_string("42", &StateVarType::UI4).unwrap();
    /// assert_eq!(value, StateValue::UI4(42));
    ///
    /// let value = StateValue::from_string("1", &StateVarType::Boolean).unwrap();
    /// assert_eq!(value, StateValue::Boolean(true));
    /// ```
    pub fn from_string(s: &str, var_type: &StateVarType) -> Result<Self, StateValueError> {
        let parse_err =
            |e: &dyn std::fmt::Display| StateValueError::ParseError(format!("Failed to parse {} from '{}': {}", var_type, s, e));
        let t = s.trim();

        match var_type {
            StateVarType::UI1 => t.parse::<u8>().map(StateValue::UI1).map_err(|e| parse_err(&e)),
            StateVarType::UI2 => t.parse::<u16>().map(StateValue::UI2).map_err(|e| parse_err(&e)),
            StateVarType::UI4 => t.parse::<u32>().map(StateValue::UI4).map_err(|e| parse_err(&e)),
            StateVarType::I1 => t.parse::<i8>().map(StateValue::I1).map_err(|e| parse_err(&e)),
            StateVarType::I2 => t.parse::<i16>().map(StateValue::I2).map_err(|e| parse_err(&e)),
            StateVarType::I4 => t.parse::<i32>().map(StateValue::I4).map_err(|e| parse_err(&e)),
            StateVarType::Int => t.parse::<i32>().map(StateValue::Int).map_err(|e| parse_err(&e)),
            StateVarType::R4 => t.parse::<f32>().map(StateValue::R4).map_err(|e| parse_err(&e)),
            StateVarType::R8 => t.parse::<f64>().map(StateValue::R8).map_err(|e| parse_err(&e)),
            StateVarType::Number => t.parse::<f64>().map(StateValue::Number).map_err(|e| parse_err(&e)),
            StateVarType::Fixed14_4 => {
                let v = t.parse::<f64>().map_err(|e| parse_err(&e))?;
                if v.abs() >= 1e14 {
                    return Err(parse_err(&"more than 14 integer digits"));
                }
                Ok(StateValue::Fixed14_4(v))
            }
            // Pas de trim : les espaces sont significatifs
            StateVarType::Char => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(StateValue::Char(c)),
                    _ => Err(parse_err(&"expected exactly one character")),
                }
            }
            StateVarType::String => Ok(StateValue::String(s.to_string())),
            StateVarType::Boolean => match t.to_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(StateValue::Boolean(true)),
                "false" | "0" | "no" => Ok(StateValue::Boolean(false)),
                _ => Err(parse_err(&"not a boolean")),
            },
            StateVarType::BinBase64 => STANDARD
                .decode(t)
                .map(|_| StateValue::BinBase64(t.to_string()))
                .map_err(|e| parse_err(&e)),
            StateVarType::BinHex => hex::decode(t)
                .map(|_| StateValue::BinHex(t.to_string()))
                .map_err(|e| parse_err(&e)),
            StateVarType::Date => NaiveDate::parse_from_str(t, "%Y-%m-%d")
                .map(StateValue::Date)
                .map_err(|e| parse_err(&e)),
            StateVarType::DateTime => NaiveDateTime::parse_from_str(t, "%Y-%m-%dT%H:%M:%S")
                .or_else(|_| NaiveDateTime::parse_from_str(t, "%Y-%m-%dT%H:%M:%S%.f"))
                .map(StateValue::DateTime)
                .map_err(|e| parse_err(&e)),
            StateVarType::DateTimeTZ => DateTime::parse_from_rfc3339(t)
                .map(StateValue::DateTimeTZ)
                .map_err(|e| parse_err(&e)),
            StateVarType::Time => NaiveTime::parse_from_str(t, "%H:%M:%S")
                .map(StateValue::Time)
                .map_err(|e| parse_err(&e)),
            StateVarType::TimeTZ => DateTime::parse_from_rfc3339(&format!("1970-01-01T{}", t))
                .map(StateValue::TimeTZ)
                .map_err(|e| parse_err(&e)),
            StateVarType::UUID => Uuid::parse_str(t)
                .map(StateValue::UUID)
                .map_err(|e| parse_err(&e)),
            StateVarType::URI => Url::parse(t)
                .map(StateValue::URI)
                .map_err(|e| parse_err(&e)),
        }
    }
}

impl PartialEq for StateValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (StateValue::Xml(a), StateValue::Xml(b)) => a == b,
            (StateValue::Xml(_), _) | (_, StateValue::Xml(_)) => false,
            (a, b) if a.is_integer() && b.is_integer() => {
                matches!((i64::try_from(a), i64::try_from(b)), (Ok(ia), Ok(ib)) if ia == ib)
            }
            (a, b) if a.is_float() && b.is_float() => {
                // NaN respecte la sémantique IEEE (NaN != NaN)
                matches!((f64::try_from(a), f64::try_from(b)), (Ok(fa), Ok(fb)) if fa == fb)
            }
            (a, b) if a.is_string() && b.is_string() => a.to_string() == b.to_string(),
            (StateValue::Boolean(a), StateValue::Boolean(b)) => a == b,
            (StateValue::UUID(a), StateValue::UUID(b)) => a == b,
            (StateValue::URI(a), StateValue::URI(b)) => a == b,
            (StateValue::Date(a), StateValue::Date(b)) => a == b,
            (StateValue::Time(a), StateValue::Time(b)) => a == b,
            (StateValue::DateTime(a), StateValue::DateTime(b)) => a == b,
            (StateValue::DateTimeTZ(a), StateValue::DateTimeTZ(b)) => a == b,
            (StateValue::TimeTZ(a), StateValue::TimeTZ(b)) => a == b,
            (_, _) => false,
        }
    }
}

impl PartialOrd for StateValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (a, b) if a.is_integer() && b.is_integer() => {
                let (ia, ib) = (i64::try_from(a).ok()?, i64::try_from(b).ok()?);
                Some(ia.cmp(&ib))
            }
            (a, b) if a.is_numeric() && b.is_numeric() => {
                let (fa, fb) = (f64::try_from(a).ok()?, f64::try_from(b).ok()?);
                fa.partial_cmp(&fb)
            }
            (a, b) if a.is_string() && b.is_string() => Some(a.to_string().cmp(&b.to_string())),
            (StateValue::Date(a), StateValue::Date(b)) => Some(a.cmp(b)),
            (StateValue::Time(a), StateValue::Time(b)) => Some(a.cmp(b)),
            (StateValue::DateTime(a), StateValue::DateTime(b)) => Some(a.cmp(b)),
            (StateValue::DateTimeTZ(a), StateValue::DateTimeTZ(b)) => Some(a.cmp(b)),
            (StateValue::TimeTZ(a), StateValue::TimeTZ(b)) => Some(a.cmp(b)),
            (_, _) => None,
        }
    }
}

use std::convert::TryFrom;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use url::Url;
use uuid::Uuid;

use crate::variable_types::{StateValue, StateValueError};

impl TryFrom<&StateValue> for i64 {
    type Error = StateValueError;

    fn try_from(value: &StateValue) -> Result<Self, Self::Error> {
        match value {
            // signés
            StateValue::I1(v) => Ok(*v as i64),
            StateValue::I2(v) => Ok(*v as i64),
            StateValue::I4(v) | StateValue::Int(v) => Ok(*v as i64),

            // non signés
            StateValue::UI1(v) => Ok(*v as i64),
            StateValue::UI2(v) => Ok(*v as i64),
            StateValue::UI4(v) => Ok(*v as i64),

            StateValue::Boolean(v) => Ok(*v as i64),

            _ => Err(StateValueError::TypeError(format!(
                "Cannot cast {:?} to i64",
                value.var_type()
            ))),
        }
    }
}

impl TryFrom<&StateValue> for f64 {
    type Error = StateValueError;

    fn try_from(value: &StateValue) -> Result<Self, Self::Error> {
        match value {
            StateValue::R4(v) => Ok(*v as f64),
            StateValue::R8(v) | StateValue::Number(v) | StateValue::Fixed14_4(v) => Ok(*v),
            other if other.is_integer() => i64::try_from(other).map(|v| v as f64),
            _ => Err(StateValueError::TypeError(format!(
                "Cannot cast {:?} to f64",
                value.var_type()
            ))),
        }
    }
}

impl TryFrom<StateValue> for f64 {
    type Error = StateValueError;

    fn try_from(value: StateValue) -> Result<Self, Self::Error> {
        f64::try_from(&value)
    }
}

impl TryFrom<StateValue> for i64 {
    type Error = StateValueError;

    fn try_from(value: StateValue) -> Result<Self, Self::Error> {
        i64::try_from(&value)
    }
}

macro_rules! impl_from_native {
    ($native:ty, $variant:ident) => {
        impl From<$native> for StateValue {
            fn from(value: $native) -> Self {
                StateValue::$variant(value)
            }
        }
    };
}

impl_from_native!(u8, UI1);
impl_from_native!(u16, UI2);
impl_from_native!(u32, UI4);
impl_from_native!(i8, I1);
impl_from_native!(i16, I2);
impl_from_native!(i32, I4);
impl_from_native!(f32, R4);
impl_from_native!(f64, R8);
impl_from_native!(bool, Boolean);
impl_from_native!(char, Char);
impl_from_native!(String, String);
impl_from_native!(NaiveDate, Date);
impl_from_native!(NaiveDateTime, DateTime);
impl_from_native!(NaiveTime, Time);
impl_from_native!(Uuid, UUID);
impl_from_native!(Url, URI);

impl From<&str> for StateValue {
    fn from(value: &str) -> Self {
        StateValue::String(value.to_string())
    }
}

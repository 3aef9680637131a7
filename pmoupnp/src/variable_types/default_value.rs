use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use url::Url;
use uuid::Uuid;

use crate::variable_types::{StateValue, StateVarType};

impl StateVarType {
    /// Valeur neutre du type, utilisée quand une variable n'a pas de
    /// valeur par défaut explicite.
    pub fn default_value(&self) -> StateValue {
        let epoch = NaiveDateTime::default();
        let epoch_tz = DateTime::<FixedOffset>::default();

        match self {
            StateVarType::UI1 => StateValue::UI1(0),
            StateVarType::UI2 => StateValue::UI2(0),
            StateVarType::UI4 => StateValue::UI4(0),
            StateVarType::I1 => StateValue::I1(0),
            StateVarType::I2 => StateValue::I2(0),
            StateVarType::I4 => StateValue::I4(0),
            StateVarType::Int => StateValue::Int(0),
            StateVarType::R4 => StateValue::R4(0.0),
            StateVarType::R8 => StateValue::R8(0.0),
            StateVarType::Number => StateValue::Number(0.0),
            StateVarType::Fixed14_4 => StateValue::Fixed14_4(0.0),
            StateVarType::Char => StateValue::Char(' '),
            StateVarType::String => StateValue::String(String::new()),
            StateVarType::Boolean => StateValue::Boolean(false),
            StateVarType::BinBase64 => StateValue::BinBase64(String::new()),
            StateVarType::BinHex => StateValue::BinHex(String::new()),
            StateVarType::Date => StateValue::Date(NaiveDate::default()),
            StateVarType::DateTime => StateValue::DateTime(epoch),
            StateVarType::DateTimeTZ => StateValue::DateTimeTZ(epoch_tz),
            StateVarType::Time => StateValue::Time(NaiveTime::default()),
            StateVarType::TimeTZ => StateValue::TimeTZ(epoch_tz),
            StateVarType::UUID => StateValue::UUID(Uuid::nil()),
            StateVarType::URI => {
                StateValue::URI(Url::parse("http://localhost/").expect("static URL is valid"))
            }
        }
    }
}

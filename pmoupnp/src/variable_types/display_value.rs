use std::fmt;

use xmltree::EmitterConfig;

use crate::variable_types::StateValue;

/// Forme texte « filaire » d'une valeur, inverse exact de
/// [`StateValue::from_string`].
impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Numériques
            StateValue::UI1(v) => write!(f, "{}", v),
            StateValue::UI2(v) => write!(f, "{}", v),
            StateValue::UI4(v) => write!(f, "{}", v),
            StateValue::I1(v) => write!(f, "{}", v),
            StateValue::I2(v) => write!(f, "{}", v),
            StateValue::I4(v) => write!(f, "{}", v),
            StateValue::Int(v) => write!(f, "{}", v),
            StateValue::R4(v) => write!(f, "{}", v),
            StateValue::R8(v) => write!(f, "{}", v),
            StateValue::Number(v) => write!(f, "{}", v),
            // 14 chiffres avant la virgule, 4 après au plus
            StateValue::Fixed14_4(v) => {
                let s = format!("{:.4}", v);
                let s = s.trim_end_matches('0').trim_end_matches('.');
                f.write_str(if s.is_empty() || s == "-" { "0" } else { s })
            }

            StateValue::Char(v) => write!(f, "{}", v),
            StateValue::String(v) => f.write_str(v),
            StateValue::UUID(v) => write!(f, "{}", v),
            StateValue::URI(v) => f.write_str(v.as_str()),

            // Booléen : 1 ou 0
            StateValue::Boolean(v) => f.write_str(if *v { "1" } else { "0" }),

            // Les binaires sont conservés sous forme encodée
            StateValue::BinBase64(v) => f.write_str(v),
            StateValue::BinHex(v) => f.write_str(v),

            // Dates et temps (ISO 8601)
            StateValue::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
            StateValue::DateTime(v) => write!(f, "{}", v.format("%Y-%m-%dT%H:%M:%S")),
            StateValue::DateTimeTZ(v) => write!(f, "{}", v.format("%Y-%m-%dT%H:%M:%S%:z")),
            StateValue::Time(v) => write!(f, "{}", v.format("%H:%M:%S")),
            StateValue::TimeTZ(v) => write!(f, "{}", v.format("%H:%M:%S%:z")),

            StateValue::Xml(elem) => {
                let mut buf = Vec::new();
                let config = EmitterConfig::new().write_document_declaration(false);
                elem.write_with_config(&mut buf, config)
                    .map_err(|_| fmt::Error)?;
                f.write_str(&String::from_utf8_lossy(&buf))
            }
        }
    }
}

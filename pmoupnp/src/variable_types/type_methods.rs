use crate::variable_types::{StateVarType, type_trait::UpnpVarType};

const ALL_TYPES: [StateVarType; 23] = [
    StateVarType::UI1,
    StateVarType::UI2,
    StateVarType::UI4,
    StateVarType::I1,
    StateVarType::I2,
    StateVarType::I4,
    StateVarType::Int,
    StateVarType::R4,
    StateVarType::R8,
    StateVarType::Number,
    StateVarType::Fixed14_4,
    StateVarType::Char,
    StateVarType::String,
    StateVarType::Boolean,
    StateVarType::BinBase64,
    StateVarType::BinHex,
    StateVarType::Date,
    StateVarType::DateTime,
    StateVarType::DateTimeTZ,
    StateVarType::Time,
    StateVarType::TimeTZ,
    StateVarType::UUID,
    StateVarType::URI,
];

impl StateVarType {
    /// Liste de tous les types standards UPnP.
    pub fn all() -> &'static [StateVarType] {
        &ALL_TYPES
    }

    /// Type canonique partageant la même représentation mémoire.
    ///
    /// `int` est un alias de `i4`, `number` et `fixed.14.4` partagent la
    /// représentation de `r8`.
    pub fn storage_type(&self) -> StateVarType {
        match self {
            StateVarType::Int => StateVarType::I4,
            StateVarType::Number | StateVarType::Fixed14_4 => StateVarType::R8,
            other => *other,
        }
    }
}

impl UpnpVarType for StateVarType {
    fn as_state_var_type(&self) -> StateVarType {
        *self
    }

    fn bit_size(&self) -> Option<usize> {
        match self {
            StateVarType::UI1 | StateVarType::I1 => Some(8),
            StateVarType::UI2 | StateVarType::I2 => Some(16),
            StateVarType::UI4 | StateVarType::I4 | StateVarType::Int | StateVarType::R4 => Some(32),
            StateVarType::R8 | StateVarType::Number | StateVarType::Fixed14_4 => Some(64),
            _ => None,
        }
    }

    fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_float()
    }

    fn is_integer(&self) -> bool {
        self.is_signed_int() || self.is_unsigned_int()
    }

    fn is_signed_int(&self) -> bool {
        matches!(
            self,
            StateVarType::I1 | StateVarType::I2 | StateVarType::I4 | StateVarType::Int
        )
    }

    fn is_unsigned_int(&self) -> bool {
        matches!(
            self,
            StateVarType::UI1 | StateVarType::UI2 | StateVarType::UI4
        )
    }

    fn is_float(&self) -> bool {
        matches!(
            self,
            StateVarType::R4 | StateVarType::R8 | StateVarType::Number | StateVarType::Fixed14_4
        )
    }

    fn is_bool(&self) -> bool {
        matches!(self, StateVarType::Boolean)
    }

    fn is_string(&self) -> bool {
        matches!(
            self,
            StateVarType::String
                | StateVarType::Char
                | StateVarType::BinHex
                | StateVarType::BinBase64
        )
    }

    fn is_time(&self) -> bool {
        matches!(
            self,
            StateVarType::Date
                | StateVarType::DateTime
                | StateVarType::DateTimeTZ
                | StateVarType::Time
                | StateVarType::TimeTZ
        )
    }

    fn is_uuid(&self) -> bool {
        matches!(self, StateVarType::UUID)
    }

    fn is_uri(&self) -> bool {
        matches!(self, StateVarType::URI)
    }

    fn is_binary(&self) -> bool {
        matches!(self, StateVarType::BinBase64 | StateVarType::BinHex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(StateVarType::UI2.is_unsigned_int());
        assert!(StateVarType::Int.is_signed_int());
        assert!(StateVarType::Fixed14_4.is_float());
        assert!(StateVarType::Fixed14_4.is_numeric());
        assert!(!StateVarType::String.is_numeric());
        assert!(StateVarType::BinHex.is_binary());
        assert_eq!(StateVarType::UI4.bit_size(), Some(32));
        assert_eq!(StateVarType::URI.bit_size(), None);
    }

    #[test]
    fn test_storage_aliases() {
        assert_eq!(StateVarType::Int.storage_type(), StateVarType::I4);
        assert_eq!(StateVarType::Number.storage_type(), StateVarType::R8);
        assert_eq!(StateVarType::UI4.storage_type(), StateVarType::UI4);
    }
}

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateValueError {
    #[error("Conversion error: {0}")]
    ConversionError(String),

    #[error("Range error: {0}")]
    RangeError(String),

    #[error("Type error: {0}")]
    TypeError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Unknown data type: {0}")]
    UnknownType(String),
}

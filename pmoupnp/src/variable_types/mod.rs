//! # Module des types de données UPnP
//!
//! Ce module définit les types standards de la UPnP Device Architecture
//! ([`StateVarType`]), les valeurs typées correspondantes ([`StateValue`]) et
//! l'abstraction [`DataType`] qui unifie types standards et types étendus
//! (définis par un schéma XML tiers).
//!
//! Toutes les conversions texte ↔ valeur sont faillibles et retournent une
//! [`StateValueError`] plutôt que de paniquer : les appelants transforment
//! ces erreurs en fautes UPnP (402 "Invalid Args" ou 501 "Action Failed").

mod conversions;
mod data_type;
mod default_value;
mod display_type;
mod display_value;
mod errors;
mod fromstr;
mod type_methods;
mod type_trait;
mod value_methods;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use url::Url;
use uuid::Uuid;
use xmltree::Element;

pub use data_type::{DataType, ExtendedDataType, XmlDocumentDataType};
pub use data_type::element_text;
pub use errors::StateValueError;
pub use type_trait::UpnpVarType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateVarType {
    UI1,        // Unsigned 8-bit integer
    UI2,        // Unsigned 16-bit integer
    UI4,        // Unsigned 32-bit integer
    I1,         // Signed 8-bit integer
    I2,         // Signed 16-bit integer
    I4,         // Signed 32-bit integer
    Int,        // Synonymous with i4
    R4,         // 32-bit floating point
    R8,         // 64-bit floating point
    Number,     // Synonymous with r8
    Fixed14_4,  // Fixed-point decimal
    Char,       // Single Unicode character
    String,     // Character string
    Boolean,    // Boolean value
    BinBase64,  // Base64-encoded binary
    BinHex,     // Hex-encoded binary
    Date,       // Date (YYYY-MM-DD)
    DateTime,   // DateTime without timezone
    DateTimeTZ, // DateTime with timezone
    Time,       // Time without timezone
    TimeTZ,     // Time with timezone
    UUID,       // Universally unique identifier
    URI,        // Uniform Resource Identifier
}

/// Valeur d'une variable d'état ou d'un argument d'action.
///
/// Les binaires (`BinBase64`, `BinHex`) conservent leur forme encodée,
/// validée au parsing. `Xml` porte la valeur structurée d'un type étendu.
#[derive(Clone, Debug)]
pub enum StateValue {
    UI1(u8),
    UI2(u16),
    UI4(u32),
    I1(i8),
    I2(i16),
    I4(i32),
    Int(i32),
    R4(f32),
    R8(f64),
    Number(f64),
    Fixed14_4(f64),
    Char(char),
    String(String),
    Boolean(bool),
    BinBase64(String),
    BinHex(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    DateTimeTZ(DateTime<FixedOffset>),
    Time(NaiveTime),
    TimeTZ(DateTime<FixedOffset>),
    UUID(Uuid),
    URI(Url),
    Xml(Element),
}

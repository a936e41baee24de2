//! Structural conversion between JSON and XML.
//!
//! Both formats are read into a [`StructuredValue`] and written back out of
//! it, so the mapping policy lives in one place per direction:
//!
//! * an object becomes an element with one child element per key;
//! * an array under key `k` becomes repeated `<k>` siblings, and repeated
//!   siblings read back as an array;
//! * scalars become element text and `null` an empty element. Element text
//!   is always read back as a string, no type inference is attempted;
//! * attributes live under `-name` keys and the text of an element that
//!   also has attributes or children under `#text`.
//!
//! The round trip is not lossless: XML text always comes back as a string
//! and comments, processing instructions and namespace semantics are dropped.

pub mod json;
pub mod xml;

use crate::error::ConversionError;
use crate::format::Format;
use crate::value::StructuredValue;

pub fn to_structured(body: &[u8], format: Format) -> Result<StructuredValue, ConversionError> {
    match format {
        Format::Json => json::read(body),
        Format::Xml => xml::read(body),
    }
}

pub fn from_structured(value: &StructuredValue, target: Format) -> Result<Vec<u8>, ConversionError> {
    match target {
        Format::Json => json::write(value),
        Format::Xml => xml::write(value),
    }
}

/// Convert `body`, known to be `from`, into the opposite format.
pub fn convert(body: &[u8], from: Format) -> Result<Vec<u8>, ConversionError> {
    let value = to_structured(body, from)?;
    from_structured(&value, from.opposite())
}

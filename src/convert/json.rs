//! JSON reader and writer for the structural converter.

use serde::de::IgnoredAny;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;

use crate::error::ConversionError;
use crate::value::StructuredValue;

/// Strict validity check: the whole input must be one JSON value, with
/// nothing but whitespace after it.
pub fn is_valid(input: &[u8]) -> bool {
    serde_json::from_slice::<IgnoredAny>(input).is_ok()
}

pub fn read(input: &[u8]) -> Result<StructuredValue, ConversionError> {
    serde_json::from_slice(input).map_err(|e| ConversionError::Parse(e.to_string()))
}

/// Pretty-print with tab indentation.
pub fn write(value: &StructuredValue) -> Result<Vec<u8>, ConversionError> {
    let mut buf = Vec::new();
    let mut ser =
        serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"\t"));
    value
        .serialize(&mut ser)
        .map_err(|e| ConversionError::Serialize(e.to_string()))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validity_rejects_trailing_garbage() {
        assert!(is_valid(br#"{"a":1}"#));
        assert!(is_valid(b"  [1, 2]\n"));
        assert!(is_valid(b"\"str\""));
        assert!(!is_valid(br#"{"a":1} x"#));
        assert!(!is_valid(br#"{"a":1}{"b":2}"#));
        assert!(!is_valid(br#"{"a":"#));
        assert!(!is_valid(b""));
    }

    #[test]
    fn writes_tab_indented() {
        let value = read(br#"{"a":"1","b":[true,null]}"#).unwrap();
        let out = String::from_utf8(write(&value).unwrap()).unwrap();
        assert_eq!(
            out,
            "{\n\t\"a\": \"1\",\n\t\"b\": [\n\t\ttrue,\n\t\tnull\n\t]\n}"
        );
    }
}

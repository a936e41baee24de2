//! Error types shared by the detector, the converter and the filters.

use thiserror::Error;

/// Failure while moving a body through the structural intermediate.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// The input could not be read into a `StructuredValue`.
    #[error("parse failure: {0}")]
    Parse(String),
    /// The `StructuredValue` could not be written in the target format.
    #[error("serialize failure: {0}")]
    Serialize(String),
}

/// Errors surfaced by the body-phase logic. Both map to a 400 response.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("unknown format: body is neither JSON nor well-formed XML")]
    UnknownFormat,
    #[error("convert data format failed: {0}")]
    Conversion(#[from] ConversionError),
}

impl From<quick_xml::Error> for ConversionError {
    fn from(err: quick_xml::Error) -> Self {
        ConversionError::Parse(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for ConversionError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        ConversionError::Parse(err.to_string())
    }
}


//! Body format detection.

use std::fmt;

use crate::convert::{json, xml};
use crate::error::FilterError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Xml,
}

impl Format {
    pub fn opposite(self) -> Self {
        match self {
            Format::Json => Format::Xml,
            Format::Xml => Format::Json,
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Format::Json => "application/json",
            Format::Xml => "application/xml",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Xml => "xml",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a body. JSON is tried first so that partial or malformed JSON is
/// never taken for XML by the more permissive token walk.
pub fn detect(body: &[u8]) -> Result<Format, FilterError> {
    if json::is_valid(body) {
        return Ok(Format::Json);
    }
    if xml::walk(body, &mut ()).is_ok() {
        return Ok(Format::Xml);
    }
    Err(FilterError::UnknownFormat)
}

//! The phase contract between the proxy transport and a filter.
//!
//! The transport hands a filter one [`Phase`] at a time, in lifecycle order,
//! and gets exactly one [`Outcome`] back.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Raw header map as delivered by the proxy. Lookups are case-exact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(BTreeMap<String, String>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_raw(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseKind {
    RequestHeaders,
    RequestBody,
    RequestTrailers,
    ResponseHeaders,
    ResponseBody,
    ResponseTrailers,
}

impl PhaseKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PhaseKind::RequestHeaders => "request_headers",
            PhaseKind::RequestBody => "request_body",
            PhaseKind::RequestTrailers => "request_trailers",
            PhaseKind::ResponseHeaders => "response_headers",
            PhaseKind::ResponseBody => "response_body",
            PhaseKind::ResponseTrailers => "response_trailers",
        }
    }
}

/// One lifecycle callback with the data the proxy delivered for it. Bodies
/// are assumed fully assembled.
#[derive(Debug, Clone, Copy)]
pub enum Phase<'a> {
    RequestHeaders(&'a Headers),
    RequestBody(&'a [u8]),
    RequestTrailers(&'a Headers),
    ResponseHeaders(&'a Headers),
    ResponseBody(&'a [u8]),
    ResponseTrailers(&'a Headers),
}

impl Phase<'_> {
    pub fn kind(&self) -> PhaseKind {
        match self {
            Phase::RequestHeaders(_) => PhaseKind::RequestHeaders,
            Phase::RequestBody(_) => PhaseKind::RequestBody,
            Phase::RequestTrailers(_) => PhaseKind::RequestTrailers,
            Phase::ResponseHeaders(_) => PhaseKind::ResponseHeaders,
            Phase::ResponseBody(_) => PhaseKind::ResponseBody,
            Phase::ResponseTrailers(_) => PhaseKind::ResponseTrailers,
        }
    }
}

/// Synthetic response that short-circuits the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImmediateResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: String,
}

impl ImmediateResponse {
    /// Response whose body is the canonical reason phrase for `status`.
    pub fn with_reason(status: u16) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: reason_phrase(status).to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Forward the phase's payload unmodified.
    Continue,
    Terminate(ImmediateResponse),
}

impl Outcome {
    pub fn is_terminate(&self) -> bool {
        matches!(self, Outcome::Terminate(_))
    }
}

pub fn reason_phrase(status: u16) -> &'static str {
    axum::http::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown")
}

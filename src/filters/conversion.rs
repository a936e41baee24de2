use super::ProcessingOptions;
use crate::convert;
use crate::error::{ConversionError, FilterError};
use crate::format::{detect, Format};
use crate::phase::{Headers, ImmediateResponse, Outcome, Phase};

pub const NAME: &str = "xml-json-conv";

const BAD_REQUEST: u16 = 400;

/// Rewrites a request body from JSON to XML or back and answers the body
/// phase with the converted document. Every other phase continues.
#[derive(Debug, Clone)]
pub struct ConversionFilter {
    opts: ProcessingOptions,
}

impl ConversionFilter {
    /// Takes no startup arguments.
    pub fn init(opts: ProcessingOptions) -> Self {
        Self { opts }
    }

    pub fn options(&self) -> &ProcessingOptions {
        &self.opts
    }

    pub fn process(&self, phase: Phase<'_>) -> Outcome {
        match phase {
            Phase::RequestBody(body) => Self::request_body(body),
            _ => Outcome::Continue,
        }
    }

    fn request_body(body: &[u8]) -> Outcome {
        match transform(body) {
            Ok((target, converted)) => {
                tracing::debug!(
                    filter = NAME,
                    from = %target.opposite(),
                    to = %target,
                    bytes = converted.len(),
                    "converted request body"
                );
                let mut headers = Headers::new();
                headers.insert("content-type", target.content_type());
                Outcome::Terminate(ImmediateResponse {
                    status: 200,
                    headers,
                    body: converted,
                })
            }
            Err(err) => {
                tracing::warn!(filter = NAME, error = %err, "rejecting request body");
                Outcome::Terminate(ImmediateResponse::with_reason(BAD_REQUEST))
            }
        }
    }
}

/// Detect the body's format and convert it to the other one. Returns the
/// target format with the converted text.
pub fn transform(body: &[u8]) -> Result<(Format, String), FilterError> {
    let from = detect(body)?;
    let converted = convert::convert(body, from)?;
    let text = String::from_utf8(converted).map_err(|e| ConversionError::Serialize(e.to_string()))?;
    Ok((from.opposite(), text))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> ConversionFilter {
        ConversionFilter::init(ProcessingOptions::default())
    }

    fn terminate(outcome: Outcome) -> ImmediateResponse {
        match outcome {
            Outcome::Terminate(resp) => resp,
            Outcome::Continue => panic!("expected the body phase to terminate"),
        }
    }

    #[test]
    fn json_body_is_answered_with_xml() {
        let resp = terminate(filter().process(Phase::RequestBody(br#"{"a":"1"}"#)));
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, "<a>1</a>");
        assert_eq!(resp.headers.get_raw("content-type"), Some("application/xml"));
    }

    #[test]
    fn xml_body_is_answered_with_json() {
        let resp = terminate(filter().process(Phase::RequestBody(b"<a>1</a>")));
        assert_eq!(resp.status, 200);
        let v: serde_json::Value = serde_json::from_str(&resp.body).unwrap();
        assert_eq!(v, serde_json::json!({"a": "1"}));
    }

    #[test]
    fn unknown_format_is_bad_request() {
        let resp = terminate(filter().process(Phase::RequestBody(b"not json and not xml")));
        assert_eq!(resp.status, 400);
        assert_eq!(resp.body, "Bad Request");
    }

    #[test]
    fn unconvertible_json_is_bad_request() {
        let resp = terminate(filter().process(Phase::RequestBody(b"[1,2]")));
        assert_eq!(resp.status, 400);
        assert!(matches!(
            transform(b"[1,2]"),
            Err(FilterError::Conversion(ConversionError::Serialize(_)))
        ));
    }

    #[test]
    fn deeply_nested_xml_is_bad_request() {
        let depth = 5000;
        let body = format!("{}{}", "<a>".repeat(depth), "</a>".repeat(depth));
        let resp = terminate(filter().process(Phase::RequestBody(body.as_bytes())));
        assert_eq!(resp.status, 400);
        // detection shares the depth cap, so the body is not recognised as XML
        assert!(matches!(
            transform(body.as_bytes()),
            Err(FilterError::UnknownFormat)
        ));
    }

    #[test]
    fn other_phases_continue() {
        let f = filter();
        let headers = Headers::from_iter([("content-length", "9")]);
        for phase in [
            Phase::RequestHeaders(&headers),
            Phase::RequestTrailers(&headers),
            Phase::ResponseHeaders(&headers),
            Phase::ResponseBody(b"<a>1</a>"),
            Phase::ResponseTrailers(&headers),
        ] {
            assert_eq!(f.process(phase), Outcome::Continue);
        }
    }
}

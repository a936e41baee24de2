//! Size-based admission control.
//!
//! The decision is made from the declared `content-length` at the request
//! header phase, so an oversized body is rejected before any of it is
//! buffered.

use crate::phase::Headers;

/// Ceiling used when no usable `payload-limit` argument is supplied.
pub const DEFAULT_PAYLOAD_LIMIT: u64 = 16;
/// Startup argument naming the ceiling; the value follows as the next arg.
pub const PAYLOAD_LIMIT_ARG: &str = "payload-limit";
/// Header carrying the declared size. Matched case-exactly.
pub const CONTENT_LENGTH: &str = "content-length";

pub const PAYLOAD_TOO_LARGE: u16 = 413;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionDecision {
    Forward,
    Reject { status: u16, reason: String },
}

/// Fail-closed: an absent size is rejected the same way as an oversized one.
pub fn check(declared: Option<u64>, limit: u64) -> AdmissionDecision {
    match declared {
        None => AdmissionDecision::Reject {
            status: PAYLOAD_TOO_LARGE,
            reason: "missing content-length".into(),
        },
        Some(size) if size > limit => AdmissionDecision::Reject {
            status: PAYLOAD_TOO_LARGE,
            reason: format!("body size {} exceeds the limit of {} bytes", size, limit),
        },
        Some(_) => AdmissionDecision::Forward,
    }
}

/// Declared body size from raw request headers. `None` only when the
/// header is absent; a value that is not a non-negative integer counts as
/// a size of zero.
pub fn declared_content_length(headers: &Headers) -> Option<u64> {
    let raw = headers.get_raw(CONTENT_LENGTH)?;
    match raw.trim().parse::<u64>() {
        Ok(size) => Some(size),
        Err(e) => {
            tracing::debug!(value = %raw, error = %e, "unparseable content-length, assuming 0");
            Some(0)
        }
    }
}

/// Read the ceiling from startup arguments (`payload-limit <n>`). Never
/// fails: a missing, malformed or non-positive value keeps the default.
pub fn parse_payload_limit<S: AsRef<str>>(args: &[S]) -> u64 {
    let value = args
        .windows(2)
        .find(|pair| pair[0].as_ref() == PAYLOAD_LIMIT_ARG)
        .map(|pair| pair[1].as_ref());

    let Some(value) = value else {
        tracing::info!(
            default = DEFAULT_PAYLOAD_LIMIT,
            "argument 'payload-limit' is missing, using the default"
        );
        return DEFAULT_PAYLOAD_LIMIT;
    };

    match value.trim().parse::<i64>() {
        Ok(limit) if limit > 0 => {
            tracing::info!(limit, "payload limit configured");
            limit as u64
        }
        Ok(limit) => {
            tracing::warn!(
                limit,
                default = DEFAULT_PAYLOAD_LIMIT,
                "payload-limit must be positive, using the default"
            );
            DEFAULT_PAYLOAD_LIMIT
        }
        Err(e) => {
            tracing::warn!(
                value = %value,
                error = %e,
                default = DEFAULT_PAYLOAD_LIMIT,
                "failed to parse payload-limit, using the default"
            );
            DEFAULT_PAYLOAD_LIMIT
        }
    }
}

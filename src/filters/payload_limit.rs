use super::ProcessingOptions;
use crate::admission::{self, AdmissionDecision};
use crate::phase::{ImmediateResponse, Outcome, Phase};

pub const NAME: &str = "payload-limit";

/// Immutable after init.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadLimitConfig {
    /// Maximum accepted declared body size in bytes.
    pub limit: u64,
}

/// Rejects requests at the header phase when the declared body size is
/// missing or larger than the configured ceiling.
#[derive(Debug, Clone)]
pub struct PayloadLimitFilter {
    opts: ProcessingOptions,
    config: PayloadLimitConfig,
}

impl PayloadLimitFilter {
    pub fn init<S: AsRef<str>>(opts: ProcessingOptions, args: &[S]) -> Self {
        let limit = admission::parse_payload_limit(args);
        Self::with_config(opts, PayloadLimitConfig { limit })
    }

    pub fn with_config(opts: ProcessingOptions, config: PayloadLimitConfig) -> Self {
        Self { opts, config }
    }

    pub fn options(&self) -> &ProcessingOptions {
        &self.opts
    }

    pub fn config(&self) -> PayloadLimitConfig {
        self.config
    }

    pub fn process(&self, phase: Phase<'_>) -> Outcome {
        let Phase::RequestHeaders(headers) = phase else {
            return Outcome::Continue;
        };
        let declared = admission::declared_content_length(headers);
        match admission::check(declared, self.config.limit) {
            AdmissionDecision::Forward => Outcome::Continue,
            AdmissionDecision::Reject { status, reason } => {
                tracing::info!(
                    filter = NAME,
                    declared = ?declared,
                    limit = self.config.limit,
                    %reason,
                    "rejecting request"
                );
                Outcome::Terminate(ImmediateResponse::with_reason(status))
            }
        }
    }
}

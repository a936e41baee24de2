//! Filter infrastructure.
//!
//! Each filter is one fixed strategy over the phase contract, so dispatch is
//! a plain `match` over [`Filter`]. The [`FilterSet`] holds the instances
//! enabled for this process; it is built once at startup and shared
//! read-only between requests.

use std::sync::Arc;

use crate::phase::{Outcome, Phase};

pub mod conversion;
pub mod payload_limit;

use self::conversion::ConversionFilter;
use self::payload_limit::PayloadLimitFilter;

/// Processing flags shared by every filter, fixed at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessingOptions {
    /// Log each phase callback with the filter name at debug level.
    pub log_phases: bool,
    /// Add `x-extproc-names` naming the filter to every outcome.
    pub update_extproc_header: bool,
    /// Add `x-extproc-duration-ns` with the processing time to every outcome.
    pub update_duration_header: bool,
}

#[derive(Debug, Clone)]
pub enum Filter {
    Conversion(ConversionFilter),
    PayloadLimit(PayloadLimitFilter),
}

impl Filter {
    /// Initialise the filter registered under `name`. Returns `None` for an
    /// unknown name.
    pub fn init<S: AsRef<str>>(
        name: &str,
        opts: ProcessingOptions,
        args: &[S],
    ) -> Option<Self> {
        match name {
            conversion::NAME => Some(Filter::Conversion(ConversionFilter::init(opts))),
            payload_limit::NAME => {
                Some(Filter::PayloadLimit(PayloadLimitFilter::init(opts, args)))
            }
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Filter::Conversion(_) => conversion::NAME,
            Filter::PayloadLimit(_) => payload_limit::NAME,
        }
    }

    pub fn options(&self) -> &ProcessingOptions {
        match self {
            Filter::Conversion(f) => f.options(),
            Filter::PayloadLimit(f) => f.options(),
        }
    }

    pub fn process(&self, phase: Phase<'_>) -> Outcome {
        if self.options().log_phases {
            tracing::debug!(
                filter = self.name(),
                phase = phase.kind().as_str(),
                "processing phase"
            );
        }
        match self {
            Filter::Conversion(f) => f.process(phase),
            Filter::PayloadLimit(f) => f.process(phase),
        }
    }

    /// Teardown hook. Neither filter holds resources.
    pub fn finish(&self) {
        tracing::debug!(filter = self.name(), "filter finished");
    }
}

/// The filters enabled for this process, in configured order.
#[derive(Clone, Debug)]
pub struct FilterSet {
    filters: Arc<Vec<Filter>>,
}

impl FilterSet {
    pub fn new<S: AsRef<str>>(order: &[String], opts: &ProcessingOptions, args: &[S]) -> Self {
        // Unknown and repeated names are skipped with a warning.
        let mut filters: Vec<Filter> = Vec::new();
        for name in order {
            if filters.iter().any(|f| f.name() == name) {
                tracing::warn!(filter = %name, "filter listed twice, skipping");
                continue;
            }
            match Filter::init(name, opts.clone(), args) {
                Some(filter) => {
                    tracing::info!(filter = %name, "filter initialised");
                    filters.push(filter);
                }
                None => tracing::warn!(filter = %name, "unknown filter name, skipping"),
            }
        }
        Self {
            filters: Arc::new(filters),
        }
    }

    /// Filter registered under `name` together with its index in the set.
    pub fn lookup(&self, name: &str) -> Option<(usize, &Filter)> {
        self.filters.iter().enumerate().find(|(_, f)| f.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Filter> {
        self.filters.iter()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.filters.iter().map(Filter::name).collect()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn payload_limit(&self) -> Option<u64> {
        self.filters.iter().find_map(|f| match f {
            Filter::PayloadLimit(p) => Some(p.config().limit),
            _ => None,
        })
    }

    pub fn finish(&self) {
        for filter in self.filters.iter() {
            filter.finish();
        }
    }
}

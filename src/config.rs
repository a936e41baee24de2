use std::env;

use anyhow::{anyhow, Result};

use crate::filters::{conversion, payload_limit, ProcessingOptions};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub filter_order: Vec<String>,
    pub options: ProcessingOptions,
    /// Maximum accepted raw body size on the processing endpoint.
    pub max_request_bytes: Option<usize>,
    /// Non-flag startup arguments handed to each filter's init.
    pub startup_args: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let filter_order = parse_filter_order();
        let options = ProcessingOptions {
            log_phases: parse_bool_env("EXTPROC_LOG_PHASES")?.unwrap_or(false),
            update_extproc_header: parse_bool_env("EXTPROC_UPDATE_EXTPROC_HEADER")?
                .unwrap_or(false),
            update_duration_header: parse_bool_env("EXTPROC_UPDATE_DURATION_HEADER")?
                .unwrap_or(false),
        };
        let max_request_bytes =
            parse_optional_u64("EXTPROC_MAX_REQUEST_BYTES")?.map(|v| v as usize);

        Ok(Self {
            filter_order,
            options,
            max_request_bytes,
            startup_args: Vec::new(),
        })
    }

    pub fn with_startup_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.startup_args = args.into_iter().map(Into::into).collect();
        self
    }
}

/// Comma separated `EXTPROC_FILTERS`, trimmed and lower-cased. Both filters
/// are enabled when unset.
pub fn parse_filter_order() -> Vec<String> {
    if let Ok(var) = env::var("EXTPROC_FILTERS") {
        var.split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect()
    } else {
        vec![conversion::NAME.into(), payload_limit::NAME.into()]
    }
}

fn parse_optional_u64(var: &str) -> Result<Option<u64>> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| anyhow!("{} must be a positive integer", var)),
        Ok(_) => Ok(None),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn parse_bool_env(var: &str) -> Result<Option<bool>> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => parse_bool(&value)
            .map(Some)
            .ok_or_else(|| anyhow!("{} must be a boolean (true/false/1/0)", var)),
        Ok(_) => Ok(None),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

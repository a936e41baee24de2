//! Core library for the external processing filters. This module wires the
//! filter set into an HTTP processing surface: a phase-tagged JSON message
//! is posted to `/process/{filter}` and the filter's outcome comes back as
//! JSON. The filters themselves are pure and live in [`filters`].

pub mod admission;
mod config;
pub mod convert;
pub mod error;
pub mod filters;
pub mod format;
pub mod phase;
pub mod value;

pub use config::AppConfig;
pub use error::{ConversionError, FilterError};
pub use filters::{Filter, FilterSet, ProcessingOptions};
pub use format::{detect, Format};
pub use phase::{Headers, ImmediateResponse, Outcome, Phase, PhaseKind};
pub use value::{Mapping, StructuredValue};

use axum::extract::{
    rejection::{BytesRejection, FailedToBufferBody, JsonRejection},
    DefaultBodyLimit, Path, State,
};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Instant;
use tower_http::trace::TraceLayer;

pub const EXTPROC_NAMES_HEADER: &str = "x-extproc-names";
pub const EXTPROC_DURATION_HEADER: &str = "x-extproc-duration-ns";

#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct HeadersMessage {
    #[serde(default)]
    pub headers: Headers,
}

#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct BodyMessage {
    #[serde(default)]
    pub body: String,
}

/// One processing message from the proxy, tagged by phase.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub enum ProcessingRequest {
    RequestHeaders(HeadersMessage),
    RequestBody(BodyMessage),
    RequestTrailers(HeadersMessage),
    ResponseHeaders(HeadersMessage),
    ResponseBody(BodyMessage),
    ResponseTrailers(HeadersMessage),
}

impl ProcessingRequest {
    pub fn phase(&self) -> Phase<'_> {
        match self {
            ProcessingRequest::RequestHeaders(m) => Phase::RequestHeaders(&m.headers),
            ProcessingRequest::RequestBody(m) => Phase::RequestBody(m.body.as_bytes()),
            ProcessingRequest::RequestTrailers(m) => Phase::RequestTrailers(&m.headers),
            ProcessingRequest::ResponseHeaders(m) => Phase::ResponseHeaders(&m.headers),
            ProcessingRequest::ResponseBody(m) => Phase::ResponseBody(m.body.as_bytes()),
            ProcessingRequest::ResponseTrailers(m) => Phase::ResponseTrailers(&m.headers),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ProcessingResponse {
    Continue {
        #[serde(
            rename = "headerMutations",
            default,
            skip_serializing_if = "Headers::is_empty"
        )]
        header_mutations: Headers,
    },
    ImmediateResponse {
        status: u16,
        headers: Headers,
        body: String,
    },
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error_code: i32,
    pub message: String,
    pub http_status: u16,
}

/// Per-filter counters, index aligned with the filter set.
#[derive(Default)]
pub struct FilterMetrics {
    pub phases_total: AtomicU64,
    pub immediate_total: AtomicU64,
    pub processing_ns_sum: AtomicU64,
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub filters: FilterSet,
    /// Maximum accepted raw request body size in bytes (None => unlimited)
    /// The axum default limit is disabled when this is `None`.
    pub max_request_bytes: Option<usize>,
    pub metric_requests_total: Arc<AtomicU64>,
    pub filter_metrics: Arc<Vec<FilterMetrics>>,
    pub process_start_instant: Instant,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let AppConfig {
            filter_order,
            options,
            max_request_bytes,
            startup_args,
        } = config;

        let filters = FilterSet::new(&filter_order, &options, &startup_args);
        if filters.is_empty() {
            tracing::warn!("no filters enabled; every processing request will return 404");
        }
        let filter_metrics: Vec<FilterMetrics> =
            filters.iter().map(|_| FilterMetrics::default()).collect();

        Self {
            filters,
            max_request_bytes,
            metric_requests_total: Arc::new(AtomicU64::new(0)),
            filter_metrics: Arc::new(filter_metrics),
            process_start_instant: Instant::now(),
        }
    }
}

/// Build state from environment variables and the given startup arguments.
///
/// * `EXTPROC_FILTERS` (optional) – comma separated list of filter names.
/// * `EXTPROC_MAX_REQUEST_BYTES` (optional) – body ceiling for `/process`.
/// * `EXTPROC_LOG_PHASES`, `EXTPROC_UPDATE_EXTPROC_HEADER`,
///   `EXTPROC_UPDATE_DURATION_HEADER` (optional) – processing options.
pub fn build_state_from_env<I, S>(startup_args: I) -> anyhow::Result<AppState>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let config = AppConfig::from_env()?.with_startup_args(startup_args);
    Ok(AppState::new(config))
}

/// Build the Axum router and attach handlers.
pub fn app(state: AppState) -> Router {
    let max_request_bytes = state.max_request_bytes;

    let router = Router::new()
        .route("/process/:filter", post(process_handler))
        .route("/healthz", get(healthz_handler))
        .route("/metrics", get(metrics_handler));

    let router = match max_request_bytes {
        Some(limit) => router.layer(DefaultBodyLimit::max(limit)),
        None => router.layer(DefaultBodyLimit::disable()),
    };

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

fn respond_with_error(err: ErrorResponse) -> axum::response::Response {
    let status = StatusCode::from_u16(err.http_status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(err)).into_response()
}

/// Run one phase through `filter` and decorate the outcome according to
/// the filter's processing options.
pub fn process_phase(filter: &Filter, request: &ProcessingRequest) -> ProcessingResponse {
    let start = Instant::now();
    let outcome = filter.process(request.phase());
    let elapsed_ns = start.elapsed().as_nanos();

    let opts = filter.options();
    let mut extra = Headers::new();
    if opts.update_extproc_header {
        extra.insert(EXTPROC_NAMES_HEADER, filter.name());
    }
    if opts.update_duration_header {
        extra.insert(EXTPROC_DURATION_HEADER, elapsed_ns.to_string());
    }

    match outcome {
        Outcome::Continue => ProcessingResponse::Continue {
            header_mutations: extra,
        },
        Outcome::Terminate(resp) => {
            let mut headers = resp.headers;
            for (name, value) in extra.iter() {
                headers.insert(name, value);
            }
            ProcessingResponse::ImmediateResponse {
                status: resp.status,
                headers,
                body: resp.body,
            }
        }
    }
}

/// Handler for `/process/{filter}`. Looks the filter up by name, runs the
/// phase carried by the message and returns the outcome.
async fn process_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    payload: Result<Json<ProcessingRequest>, JsonRejection>,
) -> axum::response::Response {
    state.metric_requests_total.fetch_add(1, Ordering::Relaxed);

    let Some((idx, filter)) = state.filters.lookup(&name) else {
        return respond_with_error(ErrorResponse {
            error_code: 4040,
            message: format!("Unknown filter '{}'", name),
            http_status: 404,
        });
    };

    let request = match payload {
        Ok(Json(inner)) => inner,
        Err(rejection) => return handle_json_rejection(&state, rejection),
    };

    let start = Instant::now();
    let response = process_phase(filter, &request);
    let elapsed_ns = start.elapsed().as_nanos() as u64;

    if let Some(m) = state.filter_metrics.get(idx) {
        m.phases_total.fetch_add(1, Ordering::Relaxed);
        m.processing_ns_sum.fetch_add(elapsed_ns, Ordering::Relaxed);
        if matches!(response, ProcessingResponse::ImmediateResponse { .. }) {
            m.immediate_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    (StatusCode::OK, Json(response)).into_response()
}

fn handle_json_rejection(state: &AppState, rejection: JsonRejection) -> axum::response::Response {
    match rejection {
        JsonRejection::BytesRejection(BytesRejection::FailedToBufferBody(
            FailedToBufferBody::LengthLimitError(_),
        )) => {
            let message = match state.max_request_bytes {
                Some(limit) => {
                    tracing::warn!(limit, "processing message exceeded configured limit");
                    format!("Request too large (body exceeded limit {} bytes)", limit)
                }
                None => "Request too large".to_string(),
            };
            respond_with_error(ErrorResponse {
                error_code: 4001,
                message,
                http_status: 413,
            })
        }
        other => {
            tracing::debug!(error = %other, "malformed processing message");
            respond_with_error(ErrorResponse {
                error_code: 4000,
                message: format!("Malformed processing message: {}", other.body_text()),
                http_status: 400,
            })
        }
    }
}

/// Health endpoint for container readiness / liveness checks.
async fn healthz_handler(State(state): State<AppState>) -> axum::response::Response {
    let json = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "filters": state.filters.names(),
        "payloadLimit": state.filters.payload_limit(),
    });
    (StatusCode::OK, Json(json)).into_response()
}

/// Prometheus-style metrics exposition. Text format with simple counters.
async fn metrics_handler(State(state): State<AppState>) -> axum::response::Response {
    use std::fmt::Write as _;
    let mut buf = String::new();
    let requests = state.metric_requests_total.load(Ordering::Relaxed);
    let uptime_secs = state.process_start_instant.elapsed().as_secs_f64();

    writeln!(
        &mut buf,
        "# HELP extproc_requests_total Processing messages received\n# TYPE extproc_requests_total counter"
    )
    .ok();
    writeln!(&mut buf, "extproc_requests_total {}", requests).ok();
    writeln!(
        &mut buf,
        "# HELP extproc_filter_phases_total Phases processed per filter\n# TYPE extproc_filter_phases_total counter"
    )
    .ok();
    writeln!(
        &mut buf,
        "# HELP extproc_filter_immediate_responses_total Phases answered with an immediate response per filter\n# TYPE extproc_filter_immediate_responses_total counter"
    )
    .ok();
    writeln!(
        &mut buf,
        "# HELP extproc_filter_processing_ns_sum Cumulative processing time (ns) per filter\n# TYPE extproc_filter_processing_ns_sum counter"
    )
    .ok();
    for (filter, m) in state.filters.iter().zip(state.filter_metrics.iter()) {
        let name = filter.name();
        writeln!(
            &mut buf,
            "extproc_filter_phases_total{{filter=\"{}\"}} {}",
            name,
            m.phases_total.load(Ordering::Relaxed)
        )
        .ok();
        writeln!(
            &mut buf,
            "extproc_filter_immediate_responses_total{{filter=\"{}\"}} {}",
            name,
            m.immediate_total.load(Ordering::Relaxed)
        )
        .ok();
        writeln!(
            &mut buf,
            "extproc_filter_processing_ns_sum{{filter=\"{}\"}} {}",
            name,
            m.processing_ns_sum.load(Ordering::Relaxed)
        )
        .ok();
    }
    writeln!(
        &mut buf,
        "# HELP extproc_build_info Build information\n# TYPE extproc_build_info gauge"
    )
    .ok();
    writeln!(
        &mut buf,
        "extproc_build_info{{version=\"{}\"}} 1",
        env!("CARGO_PKG_VERSION")
    )
    .ok();
    writeln!(
        &mut buf,
        "# HELP extproc_process_uptime_seconds Process uptime seconds\n# TYPE extproc_process_uptime_seconds gauge"
    )
    .ok();
    writeln!(&mut buf, "extproc_process_uptime_seconds {}", uptime_secs).ok();
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4",
        )],
        buf,
    )
        .into_response()
}

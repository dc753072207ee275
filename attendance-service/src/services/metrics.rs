//! Prometheus metrics for attendance-service.
//!
//! HTTP request metrics plus analysis outcomes, provider latency and token
//! usage. The registry is process-wide and created on first use.

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use once_cell::sync::OnceCell;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::time::Instant;

pub struct Metrics {
    registry: Registry,
    pub http_requests_total: IntCounterVec,
    pub http_request_duration_seconds: HistogramVec,
    pub analyze_requests_total: IntCounterVec,
    pub provider_latency_seconds: HistogramVec,
    pub tokens_total: IntCounterVec,
}

static METRICS: OnceCell<Metrics> = OnceCell::new();

impl Metrics {
    fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let http_requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests"),
            &["method", "path", "status"],
        )?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request duration in seconds",
            ),
            &["method", "path", "status"],
        )?;

        // outcome: success, not_configured, bad_request, decode_error, upstream_error, invalid_response
        let analyze_requests_total = IntCounterVec::new(
            Opts::new("analyze_requests_total", "Screenshot analysis requests by outcome"),
            &["outcome"],
        )?;

        let provider_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "analyze_provider_latency_seconds",
                "Latency of the vision model call in seconds",
            )
            .buckets(vec![0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0, 120.0]),
            &["model"],
        )?;

        let tokens_total = IntCounterVec::new(
            Opts::new("genai_tokens_total", "Total tokens processed"),
            &["model", "type"], // type: input, output
        )?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;
        registry.register(Box::new(analyze_requests_total.clone()))?;
        registry.register(Box::new(provider_latency_seconds.clone()))?;
        registry.register(Box::new(tokens_total.clone()))?;

        Ok(Self {
            registry,
            http_requests_total,
            http_request_duration_seconds,
            analyze_requests_total,
            provider_latency_seconds,
            tokens_total,
        })
    }
}

/// Create the registry. Safe to call more than once.
pub fn init_metrics() -> Result<&'static Metrics, prometheus::Error> {
    METRICS.get_or_try_init(Metrics::new)
}

/// The registry, if [`init_metrics`] has succeeded.
pub fn metrics() -> Option<&'static Metrics> {
    METRICS.get()
}

pub fn record_analyze_outcome(outcome: &str) {
    if let Some(m) = metrics() {
        m.analyze_requests_total.with_label_values(&[outcome]).inc();
    }
}

pub fn record_provider_call(model: &str, seconds: f64, input_tokens: i32, output_tokens: i32) {
    if let Some(m) = metrics() {
        m.provider_latency_seconds
            .with_label_values(&[model])
            .observe(seconds);
        m.tokens_total
            .with_label_values(&[model, "input"])
            .inc_by(input_tokens.max(0) as u64);
        m.tokens_total
            .with_label_values(&[model, "output"])
            .inc_by(output_tokens.max(0) as u64);
    }
}

/// Metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let Some(m) = metrics() else {
        return "# Metrics registry not initialized\n".to_string();
    };

    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&m.registry.gather(), &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Records `http_requests_total` and `http_request_duration_seconds`.
///
/// Paths are labelled by their route template to keep cardinality bounded.
pub async fn http_metrics_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(req).await;

    if let Some(m) = metrics() {
        let status = response.status().as_u16().to_string();
        let labels = [method.as_str(), path.as_str(), status.as_str()];
        m.http_requests_total.with_label_values(&labels).inc();
        m.http_request_duration_seconds
            .with_label_values(&labels)
            .observe(start.elapsed().as_secs_f64());
    }

    response
}

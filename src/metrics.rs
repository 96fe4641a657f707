//! Prometheus metrics for the graph builder and CLI.
//!
//! Exposes:
//! - `biomed_graph_command_duration_seconds` (histogram)
//! - `biomed_graph_command_total` (counter with status)
//! - `biomed_graph_command_inflight` (gauge)
//! - `biomed_graph_documents_ingested_total` (counter)
//! - `biomed_graph_extraction_total` (counter with status)
//! - `biomed_graph_extraction_duration_seconds` (histogram)
//! - `biomed_graph_build_duration_seconds` (histogram)
//! - `biomed_graph_size` (gauge, nodes / edges of the last build)
//! - process metrics via `process` collector

use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use once_cell::sync::Lazy;
use prometheus::process_collector::ProcessCollector;
use prometheus::{
    default_registry, register_histogram, register_histogram_vec, register_int_counter,
    register_int_counter_vec, register_int_gauge_vec, Encoder, Histogram, HistogramVec,
    IntCounter, IntCounterVec, IntGaugeVec, TextEncoder,
};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

static PROCESS_COLLECTOR: Lazy<()> = Lazy::new(|| {
    if let Err(err) = default_registry().register(Box::new(ProcessCollector::for_self())) {
        warn!("Failed to register process collector: {}", err);
    }
});

static COMMAND_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    // Exponential buckets from 50ms up to ~3 minutes.
    let buckets =
        prometheus::exponential_buckets(0.05, 2.0, 14).expect("failed to create histogram buckets");
    register_histogram_vec!(
        "biomed_graph_command_duration_seconds",
        "CLI command duration in seconds",
        &["command"],
        buckets
    )
    .expect("failed to register command duration histogram")
});

static COMMAND_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "biomed_graph_command_total",
        "Total command executions by status",
        &["command", "status"]
    )
    .expect("failed to register command counter")
});

static COMMAND_INFLIGHT: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "biomed_graph_command_inflight",
        "Number of in-flight commands",
        &["command"]
    )
    .expect("failed to register inflight gauge")
});

static DOCUMENTS_INGESTED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "biomed_graph_documents_ingested_total",
        "Documents added to a graph builder"
    )
    .expect("failed to register documents counter")
});

static EXTRACTION_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "biomed_graph_extraction_total",
        "Semantic relation extraction outcomes per document",
        &["status"]
    )
    .expect("failed to register extraction counter")
});

static EXTRACTION_DURATION: Lazy<Histogram> = Lazy::new(|| {
    // 100ms .. ~7 minutes, model calls can be slow on local hardware
    let buckets =
        prometheus::exponential_buckets(0.1, 2.0, 13).expect("failed to create histogram buckets");
    register_histogram!(
        "biomed_graph_extraction_duration_seconds",
        "Model latency of one semantic extraction call",
        buckets
    )
    .expect("failed to register extraction histogram")
});

static BUILD_DURATION: Lazy<Histogram> = Lazy::new(|| {
    let buckets = prometheus::exponential_buckets(0.001, 4.0, 10)
        .expect("failed to create histogram buckets");
    register_histogram!(
        "biomed_graph_build_duration_seconds",
        "Duration of the graph finalization pipeline",
        buckets
    )
    .expect("failed to register build histogram")
});

static GRAPH_SIZE: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "biomed_graph_size",
        "Nodes and edges of the most recently built graph",
        &["kind"]
    )
    .expect("failed to register graph size gauge")
});

/// Outcome label of one document's semantic extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStatus {
    Ok,
    Cached,
    Skipped,
    Error,
}

impl ExtractionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionStatus::Ok => "ok",
            ExtractionStatus::Cached => "cached",
            ExtractionStatus::Skipped => "skipped",
            ExtractionStatus::Error => "error",
        }
    }
}

/// Ensure collectors are registered.
fn init_collectors() {
    Lazy::force(&PROCESS_COLLECTOR);
    Lazy::force(&COMMAND_DURATION);
    Lazy::force(&COMMAND_TOTAL);
    Lazy::force(&COMMAND_INFLIGHT);
    Lazy::force(&DOCUMENTS_INGESTED);
    Lazy::force(&EXTRACTION_TOTAL);
    Lazy::force(&EXTRACTION_DURATION);
    Lazy::force(&BUILD_DURATION);
    Lazy::force(&GRAPH_SIZE);
}

/// Increment inflight gauge for a command.
pub fn record_command_start(command: &'static str) {
    init_collectors();
    COMMAND_INFLIGHT.with_label_values(&[command]).inc();
}

/// Record command completion with duration and status.
pub fn record_command_result(command: &'static str, duration: Duration, success: bool) {
    init_collectors();
    COMMAND_INFLIGHT.with_label_values(&[command]).dec();
    COMMAND_DURATION
        .with_label_values(&[command])
        .observe(duration.as_secs_f64());
    COMMAND_TOTAL
        .with_label_values(&[command, if success { "ok" } else { "error" }])
        .inc();
}

pub fn record_document_ingested() {
    DOCUMENTS_INGESTED.inc();
}

/// Count one extraction outcome; `latency` is the model call time when one was made.
pub fn record_extraction(status: ExtractionStatus, latency: Option<Duration>) {
    EXTRACTION_TOTAL.with_label_values(&[status.as_str()]).inc();
    if let Some(latency) = latency {
        EXTRACTION_DURATION.observe(latency.as_secs_f64());
    }
}

pub fn record_build(duration: Duration, nodes: usize, edges: usize) {
    BUILD_DURATION.observe(duration.as_secs_f64());
    GRAPH_SIZE.with_label_values(&["nodes"]).set(nodes as i64);
    GRAPH_SIZE.with_label_values(&["edges"]).set(edges as i64);
}

async fn metrics_response() -> Result<Response<Full<Bytes>>, Infallible> {
    init_collectors();
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", err);
        return Ok(plain_response(StatusCode::INTERNAL_SERVER_ERROR, "encode error"));
    }

    let mut response = Response::new(Full::from(buffer));
    if let Ok(value) = hyper::header::HeaderValue::from_str(encoder.format_type()) {
        response
            .headers_mut()
            .insert(hyper::header::CONTENT_TYPE, value);
    }
    Ok(response)
}

fn plain_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::from(body));
    *response.status_mut() = status;
    response
}

async fn handle_request(req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    match req.uri().path() {
        "/metrics" => metrics_response().await,
        _ => Ok(plain_response(StatusCode::NOT_FOUND, "")),
    }
}

async fn serve(addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Prometheus metrics endpoint started");

    loop {
        let (stream, peer) = listener.accept().await?;
        let service = service_fn(handle_request);
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                warn!(?peer, "Metrics connection error: {}", err);
            }
        });
    }
}

/// Spawn the metrics HTTP endpoint on the given address.
pub fn spawn_metrics_server(addr: SocketAddr) {
    init_collectors();
    tokio::spawn(async move {
        if let Err(err) = serve(addr).await {
            error!(%addr, "Metrics server failed: {}", err);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn scrape() -> String {
        let response = metrics_response().await.expect("metrics response");
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("collect metrics body")
            .to_bytes();
        String::from_utf8(body_bytes.to_vec()).expect("utf-8 metrics body")
    }

    #[test]
    fn records_successful_command_metrics() {
        let cmd = "test_command_metrics_success";

        record_command_start(cmd);
        assert_eq!(COMMAND_INFLIGHT.with_label_values(&[cmd]).get(), 1);

        record_command_result(cmd, Duration::from_millis(120), true);

        assert_eq!(COMMAND_INFLIGHT.with_label_values(&[cmd]).get(), 0);
        assert_eq!(COMMAND_TOTAL.with_label_values(&[cmd, "ok"]).get(), 1);
        assert_eq!(
            COMMAND_DURATION
                .with_label_values(&[cmd])
                .get_sample_count(),
            1
        );
    }

    #[test]
    fn records_failed_command_metrics() {
        let cmd = "test_command_metrics_error";

        record_command_start(cmd);
        record_command_result(cmd, Duration::from_secs(2), false);

        assert_eq!(COMMAND_TOTAL.with_label_values(&[cmd, "error"]).get(), 1);
    }

    #[test]
    fn extraction_outcomes_are_counted_by_status() {
        init_collectors();
        let before = EXTRACTION_TOTAL.with_label_values(&["cached"]).get();
        let samples = EXTRACTION_DURATION.get_sample_count();

        record_extraction(ExtractionStatus::Cached, None);
        record_extraction(ExtractionStatus::Ok, Some(Duration::from_millis(300)));

        assert!(EXTRACTION_TOTAL.with_label_values(&["cached"]).get() >= before + 1);
        assert!(EXTRACTION_DURATION.get_sample_count() >= samples + 1);
    }

    #[test]
    fn extraction_status_labels() {
        assert_eq!(ExtractionStatus::Ok.as_str(), "ok");
        assert_eq!(ExtractionStatus::Cached.as_str(), "cached");
        assert_eq!(ExtractionStatus::Skipped.as_str(), "skipped");
        assert_eq!(ExtractionStatus::Error.as_str(), "error");
    }

    #[test]
    fn init_collectors_can_be_called_multiple_times() {
        init_collectors();
        init_collectors();
    }

    #[tokio::test]
    async fn metrics_response_contains_registered_metrics() {
        let cmd = "test_metrics_response";
        record_command_start(cmd);
        record_command_result(cmd, Duration::from_millis(10), true);
        record_build(Duration::from_millis(5), 12, 30);

        let text = scrape().await;
        assert!(text.contains("biomed_graph_command_total"));
        assert!(text.contains("biomed_graph_command_duration_seconds"));
        assert!(text.contains("biomed_graph_build_duration_seconds"));
        assert!(text.contains("biomed_graph_size"));
        assert!(text.contains(cmd));
    }

    #[tokio::test]
    async fn metrics_response_has_text_content_type() {
        let response = metrics_response().await.expect("metrics response");
        let content_type = response
            .headers()
            .get(hyper::header::CONTENT_TYPE)
            .expect("content type");
        assert!(content_type.to_str().unwrap().starts_with("text/"));
    }
}

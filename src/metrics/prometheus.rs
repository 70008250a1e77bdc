//! Prometheus metrics definitions and HTTP server

use std::net::SocketAddr;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};
use tokio::net::TcpListener;
use tracing::{error, info};

lazy_static::lazy_static! {
    /// Total number of reconciliations
    pub static ref RECONCILIATIONS: CounterVec = register_counter_vec!(
        "child_resource_operator_reconciliations_total",
        "Total number of reconciliations",
        &["kind"]
    ).unwrap();

    /// Total number of reconciliation errors
    pub static ref RECONCILIATION_ERRORS: CounterVec = register_counter_vec!(
        "child_resource_operator_reconciliation_errors_total",
        "Total number of reconciliation errors",
        &["kind"]
    ).unwrap();

    /// Reconciliation duration histogram
    pub static ref RECONCILE_DURATION: HistogramVec = register_histogram_vec!(
        "child_resource_operator_reconcile_duration_seconds",
        "Duration of reconciliations in seconds",
        &["kind"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    ).unwrap();

    /// Child resource passes by strategy and outcome
    pub static ref CHILD_PASSES: CounterVec = register_counter_vec!(
        "child_resource_operator_child_passes_total",
        "Child reconciliation passes by strategy and outcome",
        &["strategy", "outcome"]
    ).unwrap();

    /// Writes issued to the store by strategy and operation
    pub static ref STORE_WRITES: CounterVec = register_counter_vec!(
        "child_resource_operator_store_writes_total",
        "Writes issued to the resource store",
        &["strategy", "op"]
    ).unwrap();

    /// Passes that found nothing to write
    pub static ref CONVERGENCE_SKIPPED: CounterVec = register_counter_vec!(
        "child_resource_operator_convergence_skipped_total",
        "Passes where the child already matched the desired state",
        &["strategy"]
    ).unwrap();

    /// Child resources created by the bootstrap step
    pub static ref BOOTSTRAPS: CounterVec = register_counter_vec!(
        "child_resource_operator_bootstraps_total",
        "Child resources created by the bootstrap step",
        &["namespace"]
    ).unwrap();

    /// Operator health (1 = healthy, 0 = unhealthy)
    pub static ref OPERATOR_HEALTH: prometheus::Gauge = prometheus::register_gauge!(
        "child_resource_operator_health",
        "Operator health status (1 = healthy, 0 = unhealthy)"
    ).unwrap();
}

/// Serve `/metrics`, `/healthz` and `/readyz` on `port`
pub async fn serve(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    OPERATOR_HEALTH.set(1.0);

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service_fn(handle_request))
                .await
            {
                error!("Error serving connection: {}", e);
            }
        });
    }
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let (status, content_type, body) = route(req.uri().path());

    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    if let Ok(value) = HeaderValue::from_str(&content_type) {
        response.headers_mut().insert(CONTENT_TYPE, value);
    }
    Ok(response)
}

fn route(path: &str) -> (StatusCode, String, Bytes) {
    const PLAIN: &str = "text/plain; charset=utf-8";

    match path {
        "/metrics" => {
            let encoder = TextEncoder::new();
            let mut buffer = Vec::new();
            match encoder.encode(&prometheus::gather(), &mut buffer) {
                Ok(()) => (StatusCode::OK, encoder.format_type().to_string(), Bytes::from(buffer)),
                Err(e) => {
                    error!("Failed to encode metrics: {}", e);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        PLAIN.to_string(),
                        Bytes::from_static(b"Failed to encode metrics"),
                    )
                }
            }
        }
        "/healthz" | "/health" => (StatusCode::OK, PLAIN.to_string(), Bytes::from_static(b"ok")),
        "/readyz" | "/ready" if OPERATOR_HEALTH.get() >= 1.0 => {
            (StatusCode::OK, PLAIN.to_string(), Bytes::from_static(b"ok"))
        }
        "/readyz" | "/ready" => (
            StatusCode::SERVICE_UNAVAILABLE,
            PLAIN.to_string(),
            Bytes::from_static(b"not ready"),
        ),
        _ => (StatusCode::NOT_FOUND, PLAIN.to_string(), Bytes::from_static(b"Not Found")),
    }
}

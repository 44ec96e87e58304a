//! Logging, health, and metrics bootstrap shared by both binaries.
//!
//! Grounded on the teacher's own `main.rs` ambient stack: an `EnvFilter`
//! driven by a `--log-level` flag with a plain or JSON `fmt` layer, plus
//! two bare `hyper` servers for `/healthz`+`/readyz`+`/livez` and
//! `/metrics`.

use crate::error::{Error, Result};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init_logging(log_level: &str, log_json: bool) {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("hyper=warn".parse().unwrap())
        .add_directive("kube=info".parse().unwrap())
        .add_directive("tower=warn".parse().unwrap())
        .add_directive("tonic=info".parse().unwrap());

    if log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

/// Shared readiness flag: a component flips this once it has completed
/// its first successful sync (ASR watch established, registration with
/// the kubelet acknowledged) so `/readyz` reflects more than "the process
/// is up".
#[derive(Clone, Default)]
pub struct Readiness(Arc<AtomicBool>);

impl Readiness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_ready(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub async fn run_health_server(addr: &str, readiness: Readiness) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Response, Server, StatusCode};

    let make_svc = make_service_fn(move |_conn| {
        let readiness = readiness.clone();
        async move {
            Ok::<_, std::convert::Infallible>(service_fn(move |req: Request<Body>| {
                let readiness = readiness.clone();
                async move {
                    let response = match req.uri().path() {
                        "/healthz" | "/livez" => Response::builder()
                            .status(StatusCode::OK)
                            .body(Body::from("ok"))
                            .unwrap(),
                        "/readyz" => {
                            if readiness.is_ready() {
                                Response::builder()
                                    .status(StatusCode::OK)
                                    .body(Body::from("ok"))
                                    .unwrap()
                            } else {
                                Response::builder()
                                    .status(StatusCode::SERVICE_UNAVAILABLE)
                                    .body(Body::from("not ready"))
                                    .unwrap()
                            }
                        }
                        _ => Response::builder()
                            .status(StatusCode::NOT_FOUND)
                            .body(Body::from("not found"))
                            .unwrap(),
                    };
                    Ok::<_, std::convert::Infallible>(response)
                }
            }))
        }
    });

    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Configuration(format!("invalid health server address: {e}")))?;

    info!("health server listening on {addr}");
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("health server error: {e}")))?;

    Ok(())
}

pub async fn run_metrics_server(addr: &str) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Response, Server, StatusCode};
    use prometheus::{Encoder, TextEncoder};

    let make_svc = make_service_fn(|_conn| async {
        Ok::<_, std::convert::Infallible>(service_fn(|req: Request<Body>| async move {
            let response = match req.uri().path() {
                "/metrics" => {
                    let encoder = TextEncoder::new();
                    let metric_families = prometheus::gather();
                    let mut buffer = Vec::new();
                    encoder.encode(&metric_families, &mut buffer).unwrap();
                    Response::builder()
                        .status(StatusCode::OK)
                        .header("Content-Type", encoder.format_type())
                        .body(Body::from(buffer))
                        .unwrap()
                }
                _ => Response::builder()
                    .status(StatusCode::NOT_FOUND)
                    .body(Body::from("not found"))
                    .unwrap(),
            };
            Ok::<_, std::convert::Infallible>(response)
        }))
    });

    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Configuration(format!("invalid metrics server address: {e}")))?;

    info!("metrics server listening on {addr}");
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("metrics server error: {e}")))?;

    Ok(())
}

/// Driver-specific Prometheus metrics, registered once at process start.
pub struct Metrics {
    pub claims_allocated_total: prometheus::CounterVec,
    pub claims_denied_total: prometheus::CounterVec,
    pub reconcile_duration_seconds: prometheus::Histogram,
    pub devices_tainted: prometheus::Gauge,
    pub vf_carve_total: prometheus::Counter,
}

impl Metrics {
    pub fn register() -> Result<Self> {
        let claims_allocated_total = prometheus::register_counter_vec!(
            "accel_fabric_claims_allocated_total",
            "Total claims successfully allocated",
            &["kind"]
        )
        .map_err(|e| Error::Internal(e.to_string()))?;

        let claims_denied_total = prometheus::register_counter_vec!(
            "accel_fabric_claims_denied_total",
            "Total claims denied, by reason",
            &["reason"]
        )
        .map_err(|e| Error::Internal(e.to_string()))?;

        let reconcile_duration_seconds = prometheus::register_histogram!(
            "accel_fabric_reconcile_duration_seconds",
            "Duration of a single controller reconcile"
        )
        .map_err(|e| Error::Internal(e.to_string()))?;

        let devices_tainted = prometheus::register_gauge!(
            "accel_fabric_devices_tainted",
            "Number of currently tainted devices across all known nodes"
        )
        .map_err(|e| Error::Internal(e.to_string()))?;

        let vf_carve_total = prometheus::register_counter!(
            "accel_fabric_vf_carve_total",
            "Total SR-IOV VF carve operations attempted"
        )
        .map_err(|e| Error::Internal(e.to_string()))?;

        Ok(Self {
            claims_allocated_total,
            claims_denied_total,
            reconcile_duration_seconds,
            devices_tainted,
            vf_carve_total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readiness_starts_false_and_flips() {
        let readiness = Readiness::new();
        assert!(!readiness.is_ready());
        readiness.mark_ready();
        assert!(readiness.is_ready());
    }
}

// 📡 Observability - request metrics and log subscriber setup
// Metrics live in a registry owned by `ServiceMetrics`; nothing is registered
// globally, so each server (and each test) gets its own counters.

use crate::config::LogFormat;
use prometheus::{Encoder, HistogramOpts, HistogramTimer, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use tracing_subscriber::EnvFilter;

pub const REQUEST_COUNT: &str = "app_request_count";
pub const REQUEST_LATENCY: &str = "app_request_latency_seconds";

// ============================================================================
// SERVICE METRICS
// ============================================================================

pub struct ServiceMetrics {
    registry: Registry,
    requests: IntCounterVec,
    latency: HistogramVec,
}

impl ServiceMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new(REQUEST_COUNT, "total number of requests to the app"),
            &["method", "endpoint"],
        )?;
        let latency = HistogramVec::new(
            HistogramOpts::new(REQUEST_LATENCY, "Latency of requests in seconds"),
            &["endpoint"],
        )?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(latency.clone()))?;

        Ok(ServiceMetrics {
            registry,
            requests,
            latency,
        })
    }

    /// Count the request now and observe its latency when the returned
    /// timer is dropped, whichever way the handler exits.
    pub fn track(&self, method: &str, endpoint: &str) -> HistogramTimer {
        self.requests.with_label_values(&[method, endpoint]).inc();
        self.latency.with_label_values(&[endpoint]).start_timer()
    }

    pub fn request_count(&self, method: &str, endpoint: &str) -> u64 {
        self.requests.with_label_values(&[method, endpoint]).get()
    }

    pub fn latency_samples(&self, endpoint: &str) -> u64 {
        self.latency.with_label_values(&[endpoint]).get_sample_count()
    }

    /// Prometheus text exposition of everything in the registry
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

// ============================================================================
// LOGGING
// ============================================================================

/// Install the process-wide tracing subscriber. Binaries call this once at
/// startup; `RUST_LOG` takes precedence over `level`.
pub fn init_logging(level: &str, format: LogFormat) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("forward_clv={},clv={},clv_server={},tower_http=info,warn", level, level, level)))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    let installed = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("Failed to install log subscriber: {}", e))
}

// ============================================================================
// TESTS
// ============================================================================

//! Prometheus text-format metrics for `GET /metrics`.
//!
//! Mirrors the counters and histograms spec.md §6 names: query volume and
//! latency, ingestion volume and latency, and a per-service circuit-state
//! gauge (0 = closed, 1 = half-open, 2 = open) driven from
//! [`ess_core::circuit::CircuitBreakerRegistry::snapshot`] at scrape time.

use ess_core::circuit::State as CircuitState;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntGaugeVec, Opts, Registry, TextEncoder,
};

pub struct Metrics {
    registry: Registry,
    pub query_count: IntCounter,
    pub errors: IntCounter,
    pub ingestion_files: IntCounter,
    pub query_duration_seconds: Histogram,
    pub ingestion_duration_seconds: Histogram,
    pub circuit_state: IntGaugeVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let query_count = IntCounter::with_opts(Opts::new("query_count_total", "Total queries received"))
            .expect("static metric opts are valid");
        let errors = IntCounter::with_opts(Opts::new("errors_total", "Total errors across all handlers"))
            .expect("static metric opts are valid");
        let ingestion_files =
            IntCounter::with_opts(Opts::new("ingestion_files_total", "Total files ingested"))
                .expect("static metric opts are valid");
        let query_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "query_duration_seconds",
            "Query handler latency in seconds",
        ))
        .expect("static metric opts are valid");
        let ingestion_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "ingestion_duration_seconds",
            "Ingestion latency in seconds",
        ))
        .expect("static metric opts are valid");
        let circuit_state = IntGaugeVec::new(
            Opts::new("circuit_state", "Circuit breaker state per backend (0=closed, 1=half_open, 2=open)"),
            &["service"],
        )
        .expect("static metric opts are valid");

        registry
            .register(Box::new(query_count.clone()))
            .expect("metric name is unique within this registry");
        registry
            .register(Box::new(errors.clone()))
            .expect("metric name is unique within this registry");
        registry
            .register(Box::new(ingestion_files.clone()))
            .expect("metric name is unique within this registry");
        registry
            .register(Box::new(query_duration_seconds.clone()))
            .expect("metric name is unique within this registry");
        registry
            .register(Box::new(ingestion_duration_seconds.clone()))
            .expect("metric name is unique within this registry");
        registry
            .register(Box::new(circuit_state.clone()))
            .expect("metric name is unique within this registry");

        Self {
            registry,
            query_count,
            errors,
            ingestion_files,
            query_duration_seconds,
            ingestion_duration_seconds,
            circuit_state,
        }
    }

    /// Record a circuit snapshot for one backend just before a scrape reads it.
    pub fn set_circuit_state(&self, service: &str, state: CircuitState) {
        let value = match state {
            CircuitState::Closed => 0,
            CircuitState::HalfOpen => 1,
            CircuitState::Open => 2,
        };
        self.circuit_state.with_label_values(&[service]).set(value);
    }

    pub fn render(&self) -> Result<Vec<u8>, prometheus::Error> {
        let families = self.registry.gather();
        let mut buf = Vec::new();
        TextEncoder::new().encode(&families, &mut buf)?;
        Ok(buf)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

//! Prometheus metrics for pipeline runs and the HTTP API.

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry, TextEncoder,
};

pub struct Metrics {
    registry: Registry,
    pub runs_total: IntCounter,
    pub instruments_processed_total: IntCounter,
    pub instruments_failed_total: IntCounter,
    pub rows_written_total: IntCounter,
    pub fetch_retries_total: IntCounter,
    pub write_retries_total: IntCounter,
    pub run_duration_seconds: Histogram,
    pub instrument_duration_seconds: Histogram,
    pub database_connected: IntGauge,
    pub http_requests_total: IntCounter,
    pub http_requests_in_flight: IntGauge,
    pub http_request_duration_seconds: Histogram,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("tickerlens".to_string()), None)?;

        let counter = |name: &str, help: &str| -> Result<IntCounter, prometheus::Error> {
            let c = IntCounter::with_opts(Opts::new(name, help))?;
            registry.register(Box::new(c.clone()))?;
            Ok(c)
        };
        let histogram = |name: &str, help: &str, buckets: Vec<f64>| {
            let h = Histogram::with_opts(HistogramOpts::new(name, help).buckets(buckets))?;
            registry.register(Box::new(h.clone()))?;
            Ok::<_, prometheus::Error>(h)
        };
        let gauge = |name: &str, help: &str| {
            let g = IntGauge::with_opts(Opts::new(name, help))?;
            registry.register(Box::new(g.clone()))?;
            Ok::<_, prometheus::Error>(g)
        };

        Ok(Self {
            runs_total: counter("runs_total", "Pipeline runs started")?,
            instruments_processed_total: counter(
                "instruments_processed_total",
                "Instruments that reached DONE",
            )?,
            instruments_failed_total: counter(
                "instruments_failed_total",
                "Instruments that ended in FAILED",
            )?,
            rows_written_total: counter("rows_written_total", "Indicator rows upserted")?,
            fetch_retries_total: counter("fetch_retries_total", "Retried bar fetches")?,
            write_retries_total: counter("write_retries_total", "Retried store writes")?,
            run_duration_seconds: histogram(
                "run_duration_seconds",
                "Wall time of a full pipeline run",
                vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0],
            )?,
            instrument_duration_seconds: histogram(
                "instrument_duration_seconds",
                "Wall time of one instrument unit",
                vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0],
            )?,
            database_connected: gauge("database_connected", "1 when the store is reachable")?,
            http_requests_total: counter("http_requests_total", "HTTP requests served")?,
            http_requests_in_flight: gauge("http_requests_in_flight", "HTTP requests in flight")?,
            http_request_duration_seconds: histogram(
                "http_request_duration_seconds",
                "HTTP request latency",
                prometheus::DEFAULT_BUCKETS.to_vec(),
            )?,
            registry,
        })
    }

    /// Text exposition format for the `/metrics` endpoint.
    pub fn export(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buf = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

//! Prometheus metrics for the ingress controller
//!
//! Exposed at `/metrics` by the health server:
//! - `isvc_ingress_reconciliations_total{strategy,result}`
//! - `isvc_ingress_reconcile_duration_seconds{strategy}`

use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

pub type SharedMetrics = Arc<ControllerMetrics>;

pub struct ControllerMetrics {
    registry: Registry,
    reconciliations: IntCounterVec,
    duration: HistogramVec,
}

impl ControllerMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let reconciliations = IntCounterVec::new(
            Opts::new(
                "isvc_ingress_reconciliations_total",
                "InferenceService ingress reconciliations by strategy and result",
            ),
            &["strategy", "result"],
        )?;
        let duration = HistogramVec::new(
            HistogramOpts::new(
                "isvc_ingress_reconcile_duration_seconds",
                "Time spent reconciling InferenceService ingress",
            )
            .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["strategy"],
        )?;

        registry.register(Box::new(reconciliations.clone()))?;
        registry.register(Box::new(duration.clone()))?;

        Ok(Self {
            registry,
            reconciliations,
            duration,
        })
    }

    pub fn record_reconciliation_success(&self, strategy: &str, duration_secs: f64) {
        self.record(strategy, "success", duration_secs);
    }

    /// Errors from `error_policy` have no duration; pass 0.0 to skip the histogram
    pub fn record_reconciliation_error(&self, strategy: &str, duration_secs: f64) {
        self.record(strategy, "error", duration_secs);
    }

    fn record(&self, strategy: &str, result: &str, duration_secs: f64) {
        self.reconciliations
            .with_label_values(&[strategy, result])
            .inc();
        if duration_secs > 0.0 {
            self.duration
                .with_label_values(&[strategy])
                .observe(duration_secs);
        }
    }

    pub fn reconciliation_count(&self, strategy: &str, result: &str) -> u64 {
        self.reconciliations
            .with_label_values(&[strategy, result])
            .get()
    }

    /// Text exposition format
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

pub fn create_metrics() -> Result<SharedMetrics, prometheus::Error> {
    Ok(Arc::new(ControllerMetrics::new()?))
}

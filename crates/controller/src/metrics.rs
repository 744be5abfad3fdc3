//! Prometheus metrics for the control loops and both HTTP servers.

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry};
use std::sync::Arc;

/// Stable metric names exported on `/metrics`.
pub struct ControllerMetrics {
    registry: Registry,
    reconcile_duration: HistogramVec,
    reconcile_condition: IntGaugeVec,
    suspend_status: IntGaugeVec,
    http_requests: IntCounterVec,
    /// Emit the request path as a label only when explicitly enabled; the
    /// gateway's hook paths are high-cardinality.
    path_labels: bool,
}

impl ControllerMetrics {
    pub fn new(path_labels: bool) -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new();

        let reconcile_duration = HistogramVec::new(
            HistogramOpts::new(
                "beacon_reconcile_duration_seconds",
                "Duration of reconcile runs per object",
            )
            .buckets(vec![0.005, 0.025, 0.1, 0.5, 1.0, 2.5, 10.0]),
            &["kind", "name", "namespace"],
        )?;
        registry.register(Box::new(reconcile_duration.clone()))?;

        let reconcile_condition = IntGaugeVec::new(
            Opts::new(
                "beacon_reconcile_condition",
                "Current condition status per object, 1 for the active status",
            ),
            &["kind", "name", "namespace", "type", "status"],
        )?;
        registry.register(Box::new(reconcile_condition.clone()))?;

        let suspend_status = IntGaugeVec::new(
            Opts::new("beacon_suspend_status", "Suspended state per object"),
            &["kind", "name", "namespace"],
        )?;
        registry.register(Box::new(suspend_status.clone()))?;

        let http_requests = IntCounterVec::new(
            Opts::new("beacon_http_requests_total", "HTTP requests per server"),
            &["server", "status", "path"],
        )?;
        registry.register(Box::new(http_requests.clone()))?;

        Ok(Arc::new(Self {
            registry,
            reconcile_duration,
            reconcile_condition,
            suspend_status,
            http_requests,
            path_labels,
        }))
    }

    /// Registry backing the `/metrics` endpoint.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn observe_reconcile(&self, kind: &str, name: &str, namespace: &str, seconds: f64) {
        self.reconcile_duration
            .with_label_values(&[kind, name, namespace])
            .observe(seconds);
    }

    /// Record a condition, zeroing the sibling status so each (object,
    /// type) carries exactly one active series.
    pub fn record_condition(
        &self,
        kind: &str,
        name: &str,
        namespace: &str,
        type_: &str,
        status: bool,
    ) {
        for (label, value) in [("True", status), ("False", !status)] {
            let gauge = self
                .reconcile_condition
                .with_label_values(&[kind, name, namespace, type_, label]);
            gauge.set(i64::from(value));
        }
    }

    pub fn record_suspend(&self, kind: &str, name: &str, namespace: &str, suspended: bool) {
        self.suspend_status
            .with_label_values(&[kind, name, namespace])
            .set(i64::from(suspended));
    }

    /// Drop all series for a deleted object.
    pub fn forget(&self, kind: &str, name: &str, namespace: &str) {
        let _ = self
            .reconcile_duration
            .remove_label_values(&[kind, name, namespace]);
        let _ = self
            .suspend_status
            .remove_label_values(&[kind, name, namespace]);
        for type_ in ["Ready", "Reconciling", "Stalled"] {
            for status in ["True", "False"] {
                let _ = self
                    .reconcile_condition
                    .remove_label_values(&[kind, name, namespace, type_, status]);
            }
        }
    }

    pub fn count_http_request(&self, server: &str, status: u16, path: &str) {
        let path = if self.path_labels { path } else { "" };
        self.http_requests
            .with_label_values(&[server, &status.to_string(), path])
            .inc();
    }
}

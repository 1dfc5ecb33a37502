//! Prometheus Exporter
//!
//! Receives evicted sample buckets and pull gauges, and renders them in
//! Prometheus text exposition format.

use crate::domain::ports::{GaugeFn, GaugeRegistry, SampleObserver};
use crate::domain::value_objects::MetricPath;
use dashmap::DashMap;
use std::fmt::Write;

/// Totals and last bucket seen for one path.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PathMetrics {
    /// Sum of every evicted bucket
    pub total_sum: f64,
    /// Observation count across every evicted bucket
    pub total_count: u64,
    /// Value of the most recently evicted bucket
    pub last_value: f64,
    /// Observation count of the most recently evicted bucket
    pub last_count: u64,
}

impl PathMetrics {
    /// Mean of the most recent bucket.
    pub fn last_mean(&self) -> f64 {
        if self.last_count == 0 {
            0.0
        } else {
            self.last_value / self.last_count as f64
        }
    }
}

/// Prometheus-compatible sink for samples and gauges.
pub struct PrometheusExporter {
    namespace: String,
    paths: DashMap<MetricPath, PathMetrics>,
    gauges: DashMap<MetricPath, GaugeFn>,
}

impl PrometheusExporter {
    /// `namespace` prefixes every metric name, e.g. `rpc_broker`.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            paths: DashMap::new(),
            gauges: DashMap::new(),
        }
    }

    pub fn path_metrics(&self, path: &MetricPath) -> Option<PathMetrics> {
        self.paths.get(path).map(|m| *m)
    }

    /// Current value of a registered gauge.
    pub fn gauge(&self, path: &MetricPath) -> Option<f64> {
        let gauge = self.gauges.get(path).map(|g| g.clone())?;
        Some(gauge())
    }

    pub fn gauge_paths(&self) -> Vec<MetricPath> {
        let mut paths: Vec<MetricPath> = self.gauges.iter().map(|e| e.key().clone()).collect();
        paths.sort();
        paths
    }

    /// Export everything in Prometheus text format.
    pub fn export_prometheus(&self) -> String {
        let mut output = String::new();
        let ns = &self.namespace;

        let mut samples: Vec<(MetricPath, PathMetrics)> = self
            .paths
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        samples.sort_by(|a, b| a.0.cmp(&b.0));

        if !samples.is_empty() {
            let _ = writeln!(output, "# HELP {ns}_sample_sum Sum of observations in evicted windows");
            let _ = writeln!(output, "# TYPE {ns}_sample_sum counter");
            for (path, m) in &samples {
                let _ = writeln!(output, "{ns}_sample_sum{{path=\"{}\"}} {}", escape(path), m.total_sum);
            }

            let _ = writeln!(output, "# HELP {ns}_sample_count Observations in evicted windows");
            let _ = writeln!(output, "# TYPE {ns}_sample_count counter");
            for (path, m) in &samples {
                let _ = writeln!(output, "{ns}_sample_count{{path=\"{}\"}} {}", escape(path), m.total_count);
            }

            let _ = writeln!(output, "# HELP {ns}_sample_last_mean Mean of the most recently evicted bucket");
            let _ = writeln!(output, "# TYPE {ns}_sample_last_mean gauge");
            for (path, m) in &samples {
                let _ = writeln!(output, "{ns}_sample_last_mean{{path=\"{}\"}} {}", escape(path), m.last_mean());
            }
        }

        // Read gauges outside the map's shard locks
        let mut gauges: Vec<(MetricPath, GaugeFn)> = self
            .gauges
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        gauges.sort_by(|a, b| a.0.cmp(&b.0));

        if !gauges.is_empty() {
            let _ = writeln!(output, "# HELP {ns}_gauge Registered gauges");
            let _ = writeln!(output, "# TYPE {ns}_gauge gauge");
            for (path, gauge) in &gauges {
                let _ = writeln!(output, "{ns}_gauge{{path=\"{}\"}} {}", escape(path), gauge());
            }
        }

        output
    }
}

impl Default for PrometheusExporter {
    fn default() -> Self {
        Self::new("rpc_broker")
    }
}

impl SampleObserver for PrometheusExporter {
    fn observe(&self, path: &MetricPath, value: f64, count: u64) {
        let mut entry = self.paths.entry(path.clone()).or_default();
        entry.total_sum += value;
        entry.total_count += count;
        entry.last_value = value;
        entry.last_count = count;
    }
}

impl GaugeRegistry for PrometheusExporter {
    fn register_gauge(&self, path: MetricPath, gauge: GaugeFn) {
        self.gauges.insert(path, gauge);
    }
}

fn escape(path: &MetricPath) -> String {
    path.to_string().replace('\\', "\\\\").replace('"', "\\\"")
}

//! Base abstraction shared by the per-service exporters.

use std::sync::Arc;

use async_trait::async_trait;
use openstack_exporter_common::{
    Descriptor, Error, MetricKind, MetricSink, Result, Sample, build_fq_name,
};
use tracing::error;

/// Outcome of one collection cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeStatus {
    /// Authentication succeeded and the service was queried. Individual
    /// queries may still have failed.
    Collected,
    /// Authentication failed; nothing was emitted.
    Aborted,
}

/// A per-service exporter driven by the registry on every scrape.
#[async_trait]
pub trait Exporter: Send + Sync {
    /// Service name, used as the metric subsystem (e.g. `neutron`).
    fn name(&self) -> &str;

    /// Write every registered descriptor into `sink`. Performs no I/O.
    fn describe(&self, sink: &mut dyn MetricSink<Arc<Descriptor>>);

    /// Query the service and write samples into `sink`.
    async fn collect(&mut self, sink: &mut (dyn MetricSink<Sample> + Send)) -> ScrapeStatus;
}

/// Descriptor bookkeeping common to all exporters.
#[derive(Debug, Clone)]
pub struct BaseExporter {
    name: String,
    prefix: String,
    cloud: String,
    metrics: Vec<Arc<Descriptor>>,
}

impl BaseExporter {
    pub fn new(name: impl Into<String>, prefix: impl Into<String>, cloud: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prefix: prefix.into(),
            cloud: cloud.into(),
            metrics: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the cloud this exporter talks to.
    pub fn cloud(&self) -> &str {
        &self.cloud
    }

    /// Register a metric under `{prefix}_{name}_{metric}`.
    ///
    /// The HELP text defaults to the short metric name.
    pub fn add_metric(
        &mut self,
        metric: &str,
        labels: &[&str],
        kind: MetricKind,
        help: Option<&str>,
    ) -> Result<()> {
        if self.metrics.iter().any(|d| d.name == metric) {
            return Err(Error::DuplicateMetric(metric.to_string()));
        }

        let fq_name = build_fq_name(&self.prefix, &self.name, metric);
        let descriptor = Descriptor::new(metric, fq_name, help.unwrap_or(metric), kind, labels)?;
        self.metrics.push(Arc::new(descriptor));
        Ok(())
    }

    /// Look up a registered descriptor by short name.
    pub fn descriptor(&self, metric: &str) -> Option<&Arc<Descriptor>> {
        self.metrics.iter().find(|d| d.name == metric)
    }

    /// Write every descriptor, in registration order.
    pub fn describe(&self, sink: &mut dyn MetricSink<Arc<Descriptor>>) {
        for descriptor in &self.metrics {
            sink.emit(Arc::clone(descriptor));
        }
    }

    /// Build a sample for a registered metric and write it into `sink`.
    /// The sample takes its type from the registered descriptor.
    ///
    /// Unknown metrics and label count mismatches are logged and dropped.
    pub fn emit(
        &self,
        sink: &mut (dyn MetricSink<Sample> + Send),
        metric: &str,
        value: f64,
        label_values: Vec<String>,
    ) {
        let Some(descriptor) = self.descriptor(metric) else {
            error!(exporter = %self.name, metric, "Emitting unregistered metric");
            return;
        };

        match Sample::new(descriptor, value, label_values) {
            Ok(sample) => sink.emit(sample),
            Err(e) => error!(exporter = %self.name, error = %e, "Dropping invalid sample"),
        }
    }
}

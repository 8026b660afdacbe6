//! Metric descriptors and samples produced by exporters on each scrape.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::naming::{is_valid_label_name, is_valid_metric_name};

/// Prometheus value type of a metric family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Counter,
    Gauge,
}

impl MetricKind {
    /// Get the TYPE comment string for Prometheus exposition format.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static metadata describing a metric family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    /// Short name, unique within one exporter (e.g. `floating_ips`).
    pub name: String,
    /// Fully-qualified name as exposed to Prometheus.
    pub fq_name: String,
    /// HELP text.
    pub help: String,
    /// Declared value type.
    pub kind: MetricKind,
    /// Ordered label names.
    pub labels: Vec<String>,
}

impl Descriptor {
    /// Create a descriptor, validating the metric and label names.
    pub fn new(
        name: impl Into<String>,
        fq_name: impl Into<String>,
        help: impl Into<String>,
        kind: MetricKind,
        labels: &[&str],
    ) -> Result<Self> {
        let name = name.into();
        let fq_name = fq_name.into();

        if !is_valid_metric_name(&fq_name) {
            return Err(Error::InvalidMetricName(fq_name));
        }

        for label in labels {
            if !is_valid_label_name(label) {
                return Err(Error::InvalidLabelName {
                    metric: fq_name,
                    label: label.to_string(),
                });
            }
        }

        Ok(Self {
            name,
            fq_name,
            help: help.into(),
            kind,
            labels: labels.iter().map(|l| l.to_string()).collect(),
        })
    }
}

/// A single metric value bound to its descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub descriptor: Arc<Descriptor>,
    pub value: f64,
    /// Label values, in the descriptor's label order.
    pub label_values: Vec<String>,
}

impl Sample {
    /// Create a sample, checking the label values against the descriptor.
    pub fn new(descriptor: &Arc<Descriptor>, value: f64, label_values: Vec<String>) -> Result<Self> {
        if label_values.len() != descriptor.labels.len() {
            return Err(Error::LabelMismatch {
                metric: descriptor.fq_name.clone(),
                expected: descriptor.labels.len(),
                got: label_values.len(),
            });
        }

        Ok(Self {
            descriptor: Arc::clone(descriptor),
            value,
            label_values,
        })
    }

    /// Value type, as declared by the descriptor.
    pub fn kind(&self) -> MetricKind {
        self.descriptor.kind
    }

    /// Label name/value pairs in descriptor order.
    pub fn labels(&self) -> impl Iterator<Item = (&str, &str)> {
        self.descriptor
            .labels
            .iter()
            .map(String::as_str)
            .zip(self.label_values.iter().map(String::as_str))
    }
}

/// Destination for descriptors and samples emitted during a scrape.
pub trait MetricSink<T> {
    fn emit(&mut self, item: T);
}

impl<T> MetricSink<T> for Vec<T> {
    fn emit(&mut self, item: T) {
        self.push(item);
    }
}

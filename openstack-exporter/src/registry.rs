//! Registry driving the exporters on each scrape and rendering the
//! Prometheus text exposition format.

use std::fmt::Write;
use std::sync::Arc;
use std::time::Instant;

use openstack_exporter_common::{Descriptor, Sample, build_fq_name};
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::exporter::{Exporter, ScrapeStatus};

/// Outcome of the most recent scrape of one exporter.
#[derive(Debug, Clone, PartialEq)]
pub struct ExporterScrape {
    pub name: String,
    pub status: ScrapeStatus,
    pub samples: usize,
    pub duration_secs: f64,
}

/// Registry statistics.
#[derive(Debug, Clone, Default)]
pub struct RegistryStats {
    /// Total scrapes served.
    pub scrapes_total: u64,
    /// Per-exporter result of the last scrape, in registration order.
    pub last: Vec<ExporterScrape>,
}

impl RegistryStats {
    /// Exporters whose last scrape was aborted.
    pub fn aborted(&self) -> impl Iterator<Item = &str> {
        self.last
            .iter()
            .filter(|s| s.status == ScrapeStatus::Aborted)
            .map(|s| s.name.as_str())
    }
}

/// Holds the registered exporters.
///
/// Each exporter sits behind its own async mutex, so concurrent scrapes
/// against the same exporter are serialised.
pub struct Registry {
    prefix: String,
    exporters: Vec<Mutex<Box<dyn Exporter>>>,
    stats: RwLock<RegistryStats>,
}

impl Registry {
    /// Create an empty registry. `prefix` names the self-metrics.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            exporters: Vec::new(),
            stats: RwLock::new(RegistryStats::default()),
        }
    }

    /// Register an exporter.
    pub fn register(&mut self, exporter: Box<dyn Exporter>) {
        debug!(exporter = exporter.name(), "Registered exporter");
        self.exporters.push(Mutex::new(exporter));
    }

    pub fn exporter_count(&self) -> usize {
        self.exporters.len()
    }

    /// Get registry statistics.
    pub fn stats(&self) -> RegistryStats {
        self.stats.read().clone()
    }

    /// Scrape every exporter in turn and render the result.
    pub async fn render(&self) -> String {
        let mut output = String::with_capacity(4096);
        let mut scrapes = Vec::with_capacity(self.exporters.len());

        for exporter in &self.exporters {
            let mut exporter = exporter.lock().await;

            let mut descriptors: Vec<Arc<Descriptor>> = Vec::new();
            exporter.describe(&mut descriptors);

            let started = Instant::now();
            let mut samples: Vec<Sample> = Vec::new();
            let status = exporter.collect(&mut samples).await;
            let duration_secs = started.elapsed().as_secs_f64();

            debug!(
                exporter = exporter.name(),
                ?status,
                samples = samples.len(),
                duration_secs,
                "Scrape finished"
            );

            encode(&mut output, &descriptors, &samples);

            scrapes.push(ExporterScrape {
                name: exporter.name().to_string(),
                status,
                samples: samples.len(),
                duration_secs,
            });
        }

        let stats = {
            let mut stats = self.stats.write();
            stats.scrapes_total += 1;
            stats.last = scrapes;
            stats.clone()
        };

        self.encode_self_metrics(&mut output, &stats);
        output
    }

    /// Add registry statistics as metrics.
    fn encode_self_metrics(&self, output: &mut String, stats: &RegistryStats) {
        let up = build_fq_name(&self.prefix, "exporter", "up");
        let duration = build_fq_name(&self.prefix, "exporter", "scrape_duration_seconds");
        let scrapes = build_fq_name(&self.prefix, "exporter", "scrapes_total");

        writeln!(output, "# HELP {} Whether the last scrape authenticated successfully.", up).ok();
        writeln!(output, "# TYPE {} gauge", up).ok();
        for scrape in &stats.last {
            let value = match scrape.status {
                ScrapeStatus::Collected => 1,
                ScrapeStatus::Aborted => 0,
            };
            writeln!(
                output,
                "{}{{exporter=\"{}\"}} {}",
                up,
                escape_label_value(&scrape.name),
                value
            )
            .ok();
        }

        writeln!(output, "# HELP {} Duration of the last scrape.", duration).ok();
        writeln!(output, "# TYPE {} gauge", duration).ok();
        for scrape in &stats.last {
            writeln!(
                output,
                "{}{{exporter=\"{}\"}} {}",
                duration,
                escape_label_value(&scrape.name),
                format_value(scrape.duration_secs)
            )
            .ok();
        }

        writeln!(output, "# HELP {} Total scrapes served.", scrapes).ok();
        writeln!(output, "# TYPE {} counter", scrapes).ok();
        writeln!(output, "{} {}", scrapes, stats.scrapes_total).ok();
    }
}

/// Create a shareable registry handle.
pub type SharedRegistry = Arc<Registry>;

/// Write one exporter's metric families.
///
/// Families appear in descriptor order with their samples in emission
/// order. Samples whose descriptor was not described are dropped.
pub fn encode(output: &mut String, descriptors: &[Arc<Descriptor>], samples: &[Sample]) {
    for sample in samples {
        if !descriptors
            .iter()
            .any(|d| d.fq_name == sample.descriptor.fq_name)
        {
            warn!(
                metric = %sample.descriptor.fq_name,
                "Dropping sample for undescribed metric"
            );
        }
    }

    for descriptor in descriptors {
        writeln!(
            output,
            "# HELP {} {}",
            descriptor.fq_name,
            escape_help(&descriptor.help)
        )
        .ok();
        writeln!(
            output,
            "# TYPE {} {}",
            descriptor.fq_name,
            descriptor.kind.as_str()
        )
        .ok();

        for sample in samples
            .iter()
            .filter(|s| s.descriptor.fq_name == descriptor.fq_name)
        {
            writeln!(
                output,
                "{}{} {}",
                descriptor.fq_name,
                format_labels(sample),
                format_value(sample.value)
            )
            .ok();
        }
    }
}

/// Escape special characters in label values.
fn escape_label_value(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            '\n' => result.push_str("\\n"),
            _ => result.push(c),
        }
    }
    result
}

/// Escape HELP text (backslash and newline only).
fn escape_help(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}

/// Format a floating point value for Prometheus.
fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value.is_sign_positive() {
            "+Inf".to_string()
        } else {
            "-Inf".to_string()
        }
    } else if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{}", value)
    }
}

/// Format a sample's labels for Prometheus exposition format.
fn format_labels(sample: &Sample) -> String {
    if sample.label_values.is_empty() {
        return String::new();
    }

    let parts: Vec<String> = sample
        .labels()
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label_value(v)))
        .collect();

    format!("{{{}}}", parts.join(","))
}

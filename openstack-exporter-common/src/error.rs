use thiserror::Error;

/// Common error type for the OpenStack exporters.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid metric name: '{0}'")]
    InvalidMetricName(String),

    #[error("Invalid label name '{label}' on metric '{metric}'")]
    InvalidLabelName { metric: String, label: String },

    #[error("Metric '{0}' is already registered")]
    DuplicateMetric(String),

    #[error("Metric '{metric}' expects {expected} label values, got {got}")]
    LabelMismatch {
        metric: String,
        expected: usize,
        got: usize,
    },
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

//! Prometheus metric and label naming rules.

/// Check whether `name` is a valid Prometheus metric name.
///
/// Metric names must match `[a-zA-Z_:][a-zA-Z0-9_:]*`.
pub fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

/// Check whether `name` is a valid Prometheus label name.
///
/// Label names must match `[a-zA-Z_][a-zA-Z0-9_]*` and must not start with
/// `__`, which is reserved for internal use.
pub fn is_valid_label_name(name: &str) -> bool {
    if name.starts_with("__") {
        return false;
    }
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Build a fully-qualified metric name from its components.
///
/// Format: `{namespace}_{subsystem}_{name}`. Empty components are skipped.
pub fn build_fq_name(namespace: &str, subsystem: &str, name: &str) -> String {
    [namespace, subsystem, name]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("_")
}

//! Errors that cross the core boundary. Everything else (malformed records,
//! individual model fit failures, stale cache misses) is absorbed locally
//! with counters or log lines.
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum CoreError {
    #[error(
        "insufficient history for '{tag}': {available} points available, {required} required"
    )]
    InsufficientHistory {
        tag: String,
        required: usize,
        available: usize,
    },

    #[error("all forecasting models failed for '{tag}': {}", format_failures(.failures))]
    AllModelsFailed {
        tag: String,
        failures: Vec<(String, String)>,
    },

    #[error("forecast computation for '{tag}' timed out after {timeout_secs}s; retry later")]
    Timeout { tag: String, timeout_secs: u64 },

    #[error("unknown tag: '{0}'")]
    UnknownTag(String),
}

fn format_failures(failures: &[(String, String)]) -> String {
    failures
        .iter()
        .map(|(model, reason)| format!("{model}: {reason}"))
        .collect::<Vec<_>>()
        .join("; ")
}

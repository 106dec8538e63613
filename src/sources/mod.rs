//! Source normalizers: convert pre-fetched, source-specific payloads into
//! canonical [`Observation`] records. Malformed rows are counted and
//! skipped, never fatal — public APIs routinely return partial garbage.
pub mod github;
pub mod reddit;
pub mod stackoverflow;
pub mod trends;

use crate::core::series::{Observation, SourceId};
use chrono::NaiveDate;

/// Output of a normalization pass over one raw payload.
#[derive(Debug, Default)]
pub struct NormalizedBatch {
    pub observations: Vec<Observation>,
    pub rejected: usize,
}

/// Normalizes a raw payload for the given source. Dispatch is by source id
/// only; payload shapes are never probed.
pub fn normalize(source: SourceId, records: &[serde_json::Value]) -> NormalizedBatch {
    match source {
        SourceId::StackOverflow => stackoverflow::normalize(records),
        SourceId::GitHub => github::normalize(records),
        SourceId::Trends => trends::normalize(records),
        SourceId::Reddit => reddit::normalize(records),
    }
}

pub(crate) fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

/// A usable count is finite and non-negative; anything else is malformed.
pub(crate) fn valid_count(count: f64) -> bool {
    count.is_finite() && count >= 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dispatch_by_source_id() {
        // The same record shape is valid for stackoverflow but malformed
        // for github; selection must follow the source id, not the shape.
        let records = vec![json!({"tag": "python", "date": "2024-01-08", "count": 5})];

        let so = normalize(SourceId::StackOverflow, &records);
        assert_eq!(so.observations.len(), 1);
        assert_eq!(so.rejected, 0);

        let gh = normalize(SourceId::GitHub, &records);
        assert!(gh.observations.is_empty());
        assert_eq!(gh.rejected, 1);
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date(" 2024-01-08 "),
            NaiveDate::from_ymd_opt(2024, 1, 8)
        );
        assert!(parse_date("08/01/2024").is_none());
        assert!(parse_date("").is_none());
    }
}

//! Stack Exchange tag-activity payloads: per-tag question counts bucketed
//! by date, as produced by the external collector.
use crate::core::series::{Observation, SourceId, normalize_tag};
use crate::sources::{NormalizedBatch, parse_date, valid_count};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct TagActivityRecord {
    tag: Option<String>,
    date: Option<String>,
    count: Option<f64>,
}

pub(super) fn normalize(records: &[serde_json::Value]) -> NormalizedBatch {
    let mut batch = NormalizedBatch::default();

    for raw in records {
        let record: TagActivityRecord = match serde_json::from_value(raw.clone()) {
            Ok(record) => record,
            Err(e) => {
                debug!("Rejecting stackoverflow record: {}", e);
                batch.rejected += 1;
                continue;
            }
        };

        let Some(tag) = record.tag.filter(|t| !t.trim().is_empty()) else {
            debug!("Rejecting stackoverflow record without tag");
            batch.rejected += 1;
            continue;
        };
        let Some(date) = record.date.as_deref().and_then(parse_date) else {
            debug!("Rejecting stackoverflow record for '{tag}' without date");
            batch.rejected += 1;
            continue;
        };
        let Some(count) = record.count.filter(|c| valid_count(*c)) else {
            debug!("Rejecting stackoverflow record for '{tag}' without count");
            batch.rejected += 1;
            continue;
        };

        batch.observations.push(Observation {
            tag: normalize_tag(&tag),
            source: SourceId::StackOverflow,
            date,
            count,
        });
    }

    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_valid_records() {
        let records = vec![
            json!({"tag": "Python", "date": "2024-01-08", "count": 42}),
            json!({"tag": "rust", "date": "2024-01-15", "count": 17.0}),
        ];

        let batch = normalize(&records);
        assert_eq!(batch.rejected, 0);
        assert_eq!(batch.observations.len(), 2);
        assert_eq!(batch.observations[0].tag, "python");
        assert_eq!(batch.observations[0].source, SourceId::StackOverflow);
        assert_eq!(batch.observations[0].count, 42.0);
    }

    #[test]
    fn test_malformed_rows_counted_not_fatal() {
        let records = vec![
            json!({"date": "2024-01-08", "count": 42}),
            json!({"tag": "python", "count": 42}),
            json!({"tag": "python", "date": "not-a-date", "count": 42}),
            json!({"tag": "python", "date": "2024-01-08"}),
            json!({"tag": "python", "date": "2024-01-08", "count": -3}),
            json!({"tag": "python", "date": "2024-01-08", "count": 42}),
        ];

        let batch = normalize(&records);
        assert_eq!(batch.rejected, 5);
        assert_eq!(batch.observations.len(), 1);
    }
}

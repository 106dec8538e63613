//! GitHub language-activity payloads: repository counts per language per
//! week, as produced by the external collector.
use crate::core::series::{Observation, SourceId, normalize_tag};
use crate::sources::{NormalizedBatch, parse_date, valid_count};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct LanguageActivityRecord {
    language: Option<String>,
    week: Option<String>,
    repo_count: Option<f64>,
}

pub(super) fn normalize(records: &[serde_json::Value]) -> NormalizedBatch {
    let mut batch = NormalizedBatch::default();

    for raw in records {
        let record: LanguageActivityRecord = match serde_json::from_value(raw.clone()) {
            Ok(record) => record,
            Err(e) => {
                debug!("Rejecting github record: {}", e);
                batch.rejected += 1;
                continue;
            }
        };

        let Some(language) = record.language.filter(|l| !l.trim().is_empty()) else {
            debug!("Rejecting github record without language");
            batch.rejected += 1;
            continue;
        };
        let Some(week) = record.week.as_deref().and_then(parse_date) else {
            debug!("Rejecting github record for '{language}' without week");
            batch.rejected += 1;
            continue;
        };
        let Some(repo_count) = record.repo_count.filter(|c| valid_count(*c)) else {
            debug!("Rejecting github record for '{language}' without repo count");
            batch.rejected += 1;
            continue;
        };

        batch.observations.push(Observation {
            tag: normalize_tag(&language),
            source: SourceId::GitHub,
            date: week,
            count: repo_count,
        });
    }

    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_language_records() {
        let records = vec![
            json!({"language": "TypeScript", "week": "2024-02-05", "repo_count": 120}),
            json!({"language": "go", "week": "2024-02-05"}),
        ];

        let batch = normalize(&records);
        assert_eq!(batch.observations.len(), 1);
        assert_eq!(batch.rejected, 1);
        assert_eq!(batch.observations[0].tag, "typescript");
        assert_eq!(batch.observations[0].source, SourceId::GitHub);
        assert_eq!(batch.observations[0].count, 120.0);
    }
}

//! Search-interest payloads: keyword interest (0-100 scale) over time, as
//! produced by the external trends collector.
use crate::core::series::{Observation, SourceId, normalize_tag};
use crate::sources::{NormalizedBatch, parse_date, valid_count};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct InterestRecord {
    keyword: Option<String>,
    date: Option<String>,
    interest: Option<f64>,
}

pub(super) fn normalize(records: &[serde_json::Value]) -> NormalizedBatch {
    let mut batch = NormalizedBatch::default();

    for raw in records {
        let record: InterestRecord = match serde_json::from_value(raw.clone()) {
            Ok(record) => record,
            Err(e) => {
                debug!("Rejecting trends record: {}", e);
                batch.rejected += 1;
                continue;
            }
        };

        let Some(keyword) = record.keyword.filter(|k| !k.trim().is_empty()) else {
            debug!("Rejecting trends record without keyword");
            batch.rejected += 1;
            continue;
        };
        let Some(date) = record.date.as_deref().and_then(parse_date) else {
            debug!("Rejecting trends record for '{keyword}' without date");
            batch.rejected += 1;
            continue;
        };
        let Some(interest) = record.interest.filter(|i| valid_count(*i)) else {
            debug!("Rejecting trends record for '{keyword}' without interest");
            batch.rejected += 1;
            continue;
        };

        batch.observations.push(Observation {
            tag: normalize_tag(&keyword),
            source: SourceId::Trends,
            date,
            count: interest,
        });
    }

    batch
}

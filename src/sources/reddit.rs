//! Subreddit mention payloads: per-tag daily mention counts, as produced
//! by the external collector.
use crate::core::series::{Observation, SourceId, normalize_tag};
use crate::sources::{NormalizedBatch, parse_date, valid_count};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct MentionRecord {
    tag: Option<String>,
    day: Option<String>,
    mentions: Option<f64>,
}

pub(super) fn normalize(records: &[serde_json::Value]) -> NormalizedBatch {
    let mut batch = NormalizedBatch::default();

    for raw in records {
        let record: MentionRecord = match serde_json::from_value(raw.clone()) {
            Ok(record) => record,
            Err(e) => {
                debug!("Rejecting reddit record: {}", e);
                batch.rejected += 1;
                continue;
            }
        };

        let Some(tag) = record.tag.filter(|t| !t.trim().is_empty()) else {
            debug!("Rejecting reddit record without tag");
            batch.rejected += 1;
            continue;
        };
        let Some(day) = record.day.as_deref().and_then(parse_date) else {
            debug!("Rejecting reddit record for '{tag}' without day");
            batch.rejected += 1;
            continue;
        };
        let Some(mentions) = record.mentions.filter(|m| valid_count(*m)) else {
            debug!("Rejecting reddit record for '{tag}' without mentions");
            batch.rejected += 1;
            continue;
        };

        batch.observations.push(Observation {
            tag: normalize_tag(&tag),
            source: SourceId::Reddit,
            date: day,
            count: mentions,
        });
    }

    batch
}

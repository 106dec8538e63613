//! Query Façade: the single entry point the external API layer talks to.
//! Thin by contract — it normalizes, delegates to the owning components and
//! shapes results; no merge/forecast/cache logic lives here.
use crate::core::cache::ResultCache;
use crate::core::config::AppConfig;
use crate::core::error::CoreError;
use crate::core::forecast::{ForecastEngine, ForecastRun};
use crate::core::merge::SeriesMerger;
use crate::core::models::default_models;
use crate::core::series::{SourceId, TagSummary, normalize_tag};
use crate::core::topic::TopicSentimentScore;
use crate::sources;
use crate::store::KeyValueStore;
use chrono::{NaiveDate, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Completion signal for one ingestion submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub accepted: usize,
    pub rejected: usize,
    pub tags_touched: Vec<String>,
}

/// Completion signal for one topic/sentiment feed submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicReport {
    pub accepted: usize,
    pub rejected: usize,
}

/// One canonical point shaped for reporting, with any matching
/// topic/sentiment annotation attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub period: NaiveDate,
    pub value: Option<f64>,
    pub sentiment: Option<TopicSentimentScore>,
}

pub struct DemandCore {
    merger: Arc<SeriesMerger>,
    engine: Arc<ForecastEngine>,
    cache: ResultCache,
    topics: Mutex<HashMap<String, BTreeMap<NaiveDate, TopicSentimentScore>>>,
    inactive_after: usize,
}

impl DemandCore {
    /// Wires the core together over a store, per configuration.
    pub async fn open(store: &KeyValueStore, config: &AppConfig) -> Self {
        let merger = Arc::new(
            SeriesMerger::open(store, config.granularity, config.sources.clone()).await,
        );
        let engine = Arc::new(ForecastEngine::new(
            Arc::clone(&merger),
            default_models(config.forecast.season_length),
            config.forecast.clone(),
        ));
        let cache = ResultCache::new(
            Arc::clone(&merger),
            Arc::clone(&engine),
            store.collection("forecast_cache", true),
            Duration::from_secs(config.cache.ttl_secs),
            Duration::from_secs(config.forecast.timeout_secs),
        );

        Self {
            merger,
            engine,
            cache,
            topics: Mutex::new(HashMap::new()),
            inactive_after: config.tags.inactive_after,
        }
    }

    /// Ingests one pre-fetched raw payload for a source. Merges run
    /// concurrently across tags; the report is the completion signal.
    pub async fn ingest(&self, source: SourceId, records: &[serde_json::Value]) -> IngestReport {
        let batch = sources::normalize(source, records);

        let mut by_tag: BTreeMap<String, Vec<_>> = BTreeMap::new();
        for observation in batch.observations {
            by_tag
                .entry(observation.tag.clone())
                .or_default()
                .push(observation);
        }

        let accepted = by_tag.values().map(Vec::len).sum();
        let merges = by_tag.iter().map(|(tag, observations)| {
            let merger = Arc::clone(&self.merger);
            async move { merger.merge(tag, observations).await }
        });
        join_all(merges).await;

        let report = IngestReport {
            accepted,
            rejected: batch.rejected,
            tags_touched: by_tag.into_keys().collect(),
        };
        info!(
            "Ingested {} payload: {} accepted, {} rejected, {} tags",
            source,
            report.accepted,
            report.rejected,
            report.tags_touched.len()
        );
        report
    }

    /// Records a batch of topic/sentiment annotations from the external
    /// NLP feed. Later scores for the same `(tag, period)` replace earlier
    /// ones.
    pub async fn record_topic_scores(&self, scores: Vec<TopicSentimentScore>) -> TopicReport {
        let granularity = self.merger.granularity();
        let mut report = TopicReport {
            accepted: 0,
            rejected: 0,
        };

        let mut topics = self.topics.lock().await;
        for score in scores {
            match score.validated() {
                Some(mut score) => {
                    score.as_of_period = granularity.bucket(score.as_of_period);
                    topics
                        .entry(score.tag.clone())
                        .or_default()
                        .insert(score.as_of_period, score);
                    report.accepted += 1;
                }
                None => {
                    debug!("Rejecting topic score with out-of-range sentiment");
                    report.rejected += 1;
                }
            }
        }
        report
    }

    /// All known tags with lifecycle roll-ups. Tags are never deleted;
    /// quiet ones are reported inactive.
    pub async fn list_tags(&self) -> Vec<TagSummary> {
        self.merger
            .summaries(Utc::now().date_naive(), self.inactive_after)
            .await
    }

    /// The canonical series for a tag, optionally range-limited, with
    /// topic/sentiment annotations attached for reporting.
    pub async fn get_series(
        &self,
        tag: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<SeriesPoint>, CoreError> {
        let tag = normalize_tag(tag);
        let series = self
            .merger
            .series(&tag)
            .await
            .ok_or_else(|| CoreError::UnknownTag(tag.clone()))?;

        let topics = self.topics.lock().await;
        let annotations = topics.get(&tag);

        Ok(series
            .into_iter()
            .filter(|point| start.is_none_or(|s| point.period >= s))
            .filter(|point| end.is_none_or(|e| point.period <= e))
            .map(|point| SeriesPoint {
                sentiment: annotations.and_then(|a| a.get(&point.period).cloned()),
                period: point.period,
                value: point.value,
            })
            .collect())
    }

    /// The current forecast for a tag, served from cache when valid.
    pub async fn get_forecast(&self, tag: &str, horizon: usize) -> Result<ForecastRun, CoreError> {
        let tag = normalize_tag(tag);
        self.cache.get_or_compute(&tag, horizon).await
    }

    /// Retained forecast runs for a tag, oldest first.
    pub async fn forecast_history(&self, tag: &str) -> Vec<ForecastRun> {
        self.engine.run_history(&normalize_tag(tag)).await
    }

    /// Number of ensemble computations started so far. Cached serves do
    /// not move this counter.
    pub fn forecast_invocations(&self) -> usize {
        self.engine.invocation_count()
    }
}

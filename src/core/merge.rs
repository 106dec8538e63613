//! Series Merger: builds one canonical, gap-tolerant time series per tag
//! out of normalized per-source observations.
//!
//! Dedupe is last-write-wins per `(source, period)`; cross-source combine is
//! a configurable weighted sum. A period with no observations in the middle
//! of a tag's range is stored as an explicit missing marker. Every real
//! change to the canonical sequence bumps the tag's `data_version`, which is
//! the sole staleness signal consumed by the result cache.
use crate::core::config::SourcesConfig;
use crate::core::series::{CanonicalPoint, Granularity, Observation, SourceId, TagSummary};
use crate::store::{KeyValueCollection, KeyValueStore, decode_key, encode_key};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::debug;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Default)]
struct TagState {
    /// Latest count per source per period (last-write-wins log view).
    observations: BTreeMap<NaiveDate, HashMap<SourceId, f64>>,
    /// Merged series; `None` values are explicit missing markers.
    canonical: BTreeMap<NaiveDate, Option<f64>>,
    data_version: u64,
}

impl TagState {
    fn combined(&self, period: NaiveDate, weights: &SourcesConfig) -> Option<f64> {
        let sources = self.observations.get(&period)?;
        if sources.is_empty() {
            return None;
        }
        Some(
            sources
                .iter()
                .map(|(source, count)| weights.weight(*source) * count)
                .sum(),
        )
    }
}

/// Result of one merge call; `version_changed` is the cache-invalidation
/// signal — re-ingesting identical data must leave it false.
#[derive(Debug)]
pub struct MergeOutcome {
    pub version_changed: bool,
    pub data_version: u64,
    pub affected_periods: Vec<NaiveDate>,
}

pub struct SeriesMerger {
    granularity: Granularity,
    weights: SourcesConfig,
    observation_log: Arc<dyn KeyValueCollection>,
    canonical_table: Arc<dyn KeyValueCollection>,
    meta: Arc<dyn KeyValueCollection>,
    tags: RwLock<HashMap<String, Arc<Mutex<TagState>>>>,
}

impl SeriesMerger {
    /// Opens the merger over a store, rehydrating any persisted observation
    /// log and per-tag versions.
    pub async fn open(
        store: &KeyValueStore,
        granularity: Granularity,
        weights: SourcesConfig,
    ) -> Self {
        let merger = Self {
            granularity,
            weights,
            observation_log: store.collection("observations", true),
            canonical_table: store.collection("canonical", true),
            meta: store.collection("meta", true),
            tags: RwLock::new(HashMap::new()),
        };
        merger.rehydrate().await;
        merger
    }

    async fn rehydrate(&self) {
        let entries = self.observation_log.scan_prefix(b"").await;
        if entries.is_empty() {
            return;
        }

        let mut restored: HashMap<String, TagState> = HashMap::new();
        for (key, value) in entries {
            let parts = decode_key(&key);
            if parts.len() != 3 {
                debug!("Skipping malformed observation key during rehydrate");
                continue;
            }
            let (Ok(source), Ok(period), Ok(count)) = (
                parts[1].parse::<SourceId>(),
                NaiveDate::parse_from_str(&parts[2], DATE_FORMAT),
                serde_json::from_slice::<f64>(&value),
            ) else {
                debug!("Skipping undecodable observation entry during rehydrate");
                continue;
            };
            restored
                .entry(parts[0].clone())
                .or_default()
                .observations
                .entry(period)
                .or_default()
                .insert(source, count);
        }

        let mut versions: HashMap<String, u64> = HashMap::new();
        for tag in restored.keys() {
            versions.insert(tag.clone(), self.load_version(tag).await.unwrap_or(1));
        }

        let mut tags = self.tags.write().unwrap();
        for (tag, mut state) in restored {
            let periods: Vec<NaiveDate> = state.observations.keys().copied().collect();
            recompute_periods(&mut state, &periods, &self.weights);
            fill_gaps(&mut state, self.granularity);
            state.data_version = versions.get(&tag).copied().unwrap_or(1);
            debug!(
                "Rehydrated '{}': {} periods at version {}",
                tag,
                state.canonical.len(),
                state.data_version
            );
            tags.insert(tag, Arc::new(Mutex::new(state)));
        }
    }

    async fn load_version(&self, tag: &str) -> Option<u64> {
        let raw = self.meta.get(encode_key(&[tag, "version"]).as_slice()).await?;
        serde_json::from_slice(&raw).ok()
    }

    fn tag_entry(&self, tag: &str) -> Option<Arc<Mutex<TagState>>> {
        let tags = self.tags.read().unwrap();
        tags.get(tag).map(Arc::clone)
    }

    fn tag_entry_or_create(&self, tag: &str) -> Arc<Mutex<TagState>> {
        if let Some(entry) = self.tag_entry(tag) {
            return entry;
        }
        let mut tags = self.tags.write().unwrap();
        Arc::clone(tags.entry(tag.to_string()).or_default())
    }

    /// Merges a batch of observations for one tag into its canonical series.
    /// Serialized per tag; merges for different tags proceed concurrently.
    pub async fn merge(&self, tag: &str, observations: &[Observation]) -> MergeOutcome {
        let entry = self.tag_entry_or_create(tag);
        let mut state = entry.lock().await;

        let mut affected: BTreeSet<NaiveDate> = BTreeSet::new();
        for observation in observations {
            let period = self.granularity.bucket(observation.date);
            // Last-write-wins: a later record for the same (source, period)
            // replaces the earlier value, within and across batches.
            state
                .observations
                .entry(period)
                .or_default()
                .insert(observation.source, observation.count);
            affected.insert(period);

            let key = encode_key(&[
                tag,
                observation.source.as_str(),
                &period.format(DATE_FORMAT).to_string(),
            ]);
            self.observation_log
                .put(&key, &serde_json::to_vec(&observation.count).unwrap_or_default(), None)
                .await;
        }

        let affected: Vec<NaiveDate> = affected.into_iter().collect();
        let mut changed = recompute_periods(&mut state, &affected, &self.weights);
        changed |= fill_gaps(&mut state, self.granularity);

        if changed {
            state.data_version += 1;
            self.persist_canonical(tag, &state).await;
            debug!(
                "Merged {} observations into '{}': version -> {}",
                observations.len(),
                tag,
                state.data_version
            );
        } else {
            debug!(
                "Merged {} observations into '{}': no canonical change",
                observations.len(),
                tag
            );
        }

        MergeOutcome {
            version_changed: changed,
            data_version: state.data_version,
            affected_periods: affected,
        }
    }

    async fn persist_canonical(&self, tag: &str, state: &TagState) {
        for (period, value) in &state.canonical {
            let key = encode_key(&[tag, &period.format(DATE_FORMAT).to_string()]);
            self.canonical_table
                .put(&key, &serde_json::to_vec(value).unwrap_or_default(), None)
                .await;
        }
        self.meta
            .put(
                encode_key(&[tag, "version"]).as_slice(),
                &serde_json::to_vec(&state.data_version).unwrap_or_default(),
                None,
            )
            .await;
    }

    /// Current data version for a tag, if the tag exists.
    pub async fn version(&self, tag: &str) -> Option<u64> {
        let entry = self.tag_entry(tag)?;
        let state = entry.lock().await;
        Some(state.data_version)
    }

    /// The full canonical series for a tag, missing markers included.
    pub async fn series(&self, tag: &str) -> Option<Vec<CanonicalPoint>> {
        let entry = self.tag_entry(tag)?;
        let state = entry.lock().await;
        Some(
            state
                .canonical
                .iter()
                .map(|(period, value)| CanonicalPoint {
                    period: *period,
                    value: *value,
                })
                .collect(),
        )
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// Summaries for every known tag. Tags never disappear; a tag with no
    /// observations for `inactive_after` periods is reported inactive.
    pub async fn summaries(&self, as_of: NaiveDate, inactive_after: usize) -> Vec<TagSummary> {
        let entries: Vec<(String, Arc<Mutex<TagState>>)> = {
            let tags = self.tags.read().unwrap();
            tags.iter()
                .map(|(tag, entry)| (tag.clone(), Arc::clone(entry)))
                .collect()
        };

        let cutoff = self
            .granularity
            .step(self.granularity.bucket(as_of), -(inactive_after as i64));

        let mut summaries = Vec::with_capacity(entries.len());
        for (tag, entry) in entries {
            let state = entry.lock().await;
            let (Some(first_seen), Some(last_seen)) = (
                state.canonical.keys().next().copied(),
                state.canonical.keys().next_back().copied(),
            ) else {
                continue;
            };
            summaries.push(TagSummary {
                tag,
                first_seen,
                last_seen,
                point_count: state.canonical.values().filter(|v| v.is_some()).count(),
                active: last_seen >= cutoff,
            });
        }
        summaries.sort_by(|a, b| a.tag.cmp(&b.tag));
        summaries
    }
}

fn recompute_periods(state: &mut TagState, periods: &[NaiveDate], weights: &SourcesConfig) -> bool {
    let mut changed = false;
    for period in periods {
        let value = state.combined(*period, weights);
        if state.canonical.get(period) != Some(&value) {
            changed = true;
        }
        state.canonical.insert(*period, value);
    }
    changed
}

/// Materializes explicit missing markers for interior gaps so the canonical
/// sequence covers every period between first and last. A newly created
/// marker counts as a change: the sequence changed shape.
fn fill_gaps(state: &mut TagState, granularity: Granularity) -> bool {
    let (Some(&first), Some(&last)) = (
        state.canonical.keys().next(),
        state.canonical.keys().next_back(),
    ) else {
        return false;
    };

    let mut changed = false;
    let mut period = first;
    while period < last {
        period = granularity.step(period, 1);
        if period < last && !state.canonical.contains_key(&period) {
            state.canonical.insert(period, None);
            changed = true;
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn observation(source: SourceId, date: NaiveDate, count: f64) -> Observation {
        Observation {
            tag: "python".to_string(),
            source,
            date,
            count,
        }
    }

    async fn daily_merger() -> SeriesMerger {
        let store = KeyValueStore::in_memory();
        SeriesMerger::open(&store, Granularity::Day, SourcesConfig::default()).await
    }

    #[tokio::test]
    async fn test_equal_weights_sum_across_sources() {
        let merger = daily_merger().await;
        let outcome = merger
            .merge(
                "python",
                &[
                    observation(SourceId::StackOverflow, day(1), 10.0),
                    observation(SourceId::GitHub, day(1), 20.0),
                ],
            )
            .await;

        assert!(outcome.version_changed);
        let series = merger.series("python").await.unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].value, Some(30.0));
    }

    #[tokio::test]
    async fn test_trust_weights_scale_contributions() {
        let store = KeyValueStore::in_memory();
        let weights = SourcesConfig {
            weights: [(SourceId::StackOverflow, 2.0), (SourceId::GitHub, 0.5)]
                .into_iter()
                .collect(),
        };
        let merger = SeriesMerger::open(&store, Granularity::Day, weights).await;

        merger
            .merge(
                "python",
                &[
                    observation(SourceId::StackOverflow, day(1), 10.0),
                    observation(SourceId::GitHub, day(1), 20.0),
                ],
            )
            .await;

        let series = merger.series("python").await.unwrap();
        assert_eq!(series[0].value, Some(2.0 * 10.0 + 0.5 * 20.0));
    }

    #[tokio::test]
    async fn test_same_source_duplicates_keep_latest() {
        let merger = daily_merger().await;
        merger
            .merge(
                "python",
                &[
                    observation(SourceId::StackOverflow, day(1), 10.0),
                    observation(SourceId::StackOverflow, day(1), 25.0),
                ],
            )
            .await;

        let series = merger.series("python").await.unwrap();
        assert_eq!(series[0].value, Some(25.0));
    }

    #[tokio::test]
    async fn test_interior_gaps_become_missing_markers() {
        let merger = daily_merger().await;
        merger
            .merge(
                "python",
                &[
                    observation(SourceId::StackOverflow, day(1), 10.0),
                    observation(SourceId::StackOverflow, day(4), 12.0),
                ],
            )
            .await;

        let series = merger.series("python").await.unwrap();
        let periods: Vec<NaiveDate> = series.iter().map(|p| p.period).collect();
        assert_eq!(periods, vec![day(1), day(2), day(3), day(4)]);
        // Gaps are distinguishable from zero demand.
        assert_eq!(series[1].value, None);
        assert_eq!(series[2].value, None);
        assert_ne!(series[1].value, Some(0.0));
    }

    #[tokio::test]
    async fn test_reingest_is_idempotent() {
        let merger = daily_merger().await;
        let batch = [
            observation(SourceId::StackOverflow, day(1), 10.0),
            observation(SourceId::GitHub, day(2), 20.0),
        ];

        let first = merger.merge("python", &batch).await;
        assert!(first.version_changed);
        let before = merger.series("python").await.unwrap();

        let second = merger.merge("python", &batch).await;
        assert!(!second.version_changed);
        assert_eq!(second.data_version, first.data_version);
        assert_eq!(merger.series("python").await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_backfill_recomputes_only_affected_period() {
        let merger = daily_merger().await;
        merger
            .merge(
                "python",
                &[
                    observation(SourceId::StackOverflow, day(2), 10.0),
                    observation(SourceId::StackOverflow, day(3), 11.0),
                ],
            )
            .await;
        let v1 = merger.version("python").await.unwrap();

        // A backfilled observation earlier than the latest known period.
        let outcome = merger
            .merge("python", &[observation(SourceId::GitHub, day(1), 5.0)])
            .await;

        assert!(outcome.version_changed);
        assert_eq!(outcome.affected_periods, vec![day(1)]);
        assert_eq!(merger.version("python").await.unwrap(), v1 + 1);

        let series = merger.series("python").await.unwrap();
        assert_eq!(series[0].value, Some(5.0));
        assert_eq!(series[1].value, Some(10.0));
        assert_eq!(series[2].value, Some(11.0));
    }

    #[tokio::test]
    async fn test_week_granularity_buckets_sources_together() {
        let store = KeyValueStore::in_memory();
        let merger =
            SeriesMerger::open(&store, Granularity::Week, SourcesConfig::default()).await;

        // Wednesday and Friday of the same ISO week.
        merger
            .merge(
                "python",
                &[
                    observation(SourceId::StackOverflow, day(10), 4.0),
                    observation(SourceId::GitHub, day(12), 6.0),
                ],
            )
            .await;

        let series = merger.series("python").await.unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].period, day(8));
        assert_eq!(series[0].value, Some(10.0));
    }

    #[tokio::test]
    async fn test_summaries_report_activity() {
        let merger = daily_merger().await;
        merger
            .merge("python", &[observation(SourceId::StackOverflow, day(1), 1.0)])
            .await;
        merger
            .merge(
                "rust",
                &[Observation {
                    tag: "rust".to_string(),
                    source: SourceId::GitHub,
                    date: day(20),
                    count: 2.0,
                }],
            )
            .await;

        let summaries = merger.summaries(day(22), 5).await;
        assert_eq!(summaries.len(), 2);
        let python = summaries.iter().find(|s| s.tag == "python").unwrap();
        let rust = summaries.iter().find(|s| s.tag == "rust").unwrap();
        // python's last observation is 21 periods old, rust's is 2.
        assert!(!python.active);
        assert!(rust.active);
        assert_eq!(python.point_count, 1);
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyValueStore::open(dir.path());
        {
            let merger =
                SeriesMerger::open(&store, Granularity::Day, SourcesConfig::default()).await;
            merger
                .merge(
                    "python",
                    &[
                        observation(SourceId::StackOverflow, day(1), 10.0),
                        observation(SourceId::GitHub, day(1), 20.0),
                    ],
                )
                .await;
        }

        let reopened =
            SeriesMerger::open(&store, Granularity::Day, SourcesConfig::default()).await;
        let series = reopened.series("python").await.unwrap();
        assert_eq!(series[0].value, Some(30.0));
        assert_eq!(reopened.version("python").await, Some(1));
    }
}

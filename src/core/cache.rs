//! Result cache for forecast runs, keyed by `(tag, horizon)`.
//!
//! An entry is served only while its `data_version` matches the tag's
//! current version and its `expires_at` has not passed; anything else is
//! recomputed through a per-key single-flight section so concurrent callers
//! share one computation. A computation that outlives the configured
//! timeout is abandoned and its flight slot released for retry.
use crate::core::error::CoreError;
use crate::core::forecast::{ForecastEngine, ForecastRun};
use crate::core::merge::SeriesMerger;
use crate::store::{KeyValueCollection, encode_key};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResult {
    pub payload: ForecastRun,
    pub data_version: u64,
    pub expires_at: DateTime<Utc>,
}

type CacheKey = (String, usize);

pub struct ResultCache {
    merger: Arc<SeriesMerger>,
    engine: Arc<ForecastEngine>,
    table: Arc<dyn KeyValueCollection>,
    ttl: Duration,
    timeout: Duration,
    entries: Mutex<HashMap<CacheKey, CachedResult>>,
    flights: Mutex<HashMap<CacheKey, Arc<Mutex<()>>>>,
}

impl ResultCache {
    pub fn new(
        merger: Arc<SeriesMerger>,
        engine: Arc<ForecastEngine>,
        table: Arc<dyn KeyValueCollection>,
        ttl: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            merger,
            engine,
            table,
            ttl,
            timeout,
            entries: Mutex::new(HashMap::new()),
            flights: Mutex::new(HashMap::new()),
        }
    }

    /// Serves the cached forecast for `(tag, horizon)`, computing it when
    /// missing, stale, or expired.
    pub async fn get_or_compute(&self, tag: &str, horizon: usize) -> Result<ForecastRun, CoreError> {
        let key = (tag.to_string(), horizon);

        if let Some(entry) = self.lookup(&key).await {
            return Ok(entry.payload);
        }

        let flight = {
            let mut flights = self.flights.lock().await;
            Arc::clone(flights.entry(key.clone()).or_default())
        };
        let _guard = flight.lock().await;

        // Another caller may have finished this computation while we
        // awaited the flight lock.
        if let Some(entry) = self.lookup(&key).await {
            debug!("Cache filled in flight for '{}'/{}", tag, horizon);
            return Ok(entry.payload);
        }

        debug!("Cache miss for '{}'/{}; computing forecast", tag, horizon);
        let run = match tokio::time::timeout(self.timeout, self.engine.forecast(tag, horizon)).await
        {
            Ok(result) => result?,
            Err(_) => {
                debug!("Forecast for '{}'/{} abandoned on timeout", tag, horizon);
                return Err(CoreError::Timeout {
                    tag: tag.to_string(),
                    timeout_secs: self.timeout.as_secs(),
                });
            }
        };

        let entry = CachedResult {
            data_version: run.data_version,
            expires_at: Utc::now() + chrono::Duration::milliseconds(self.ttl.as_millis() as i64),
            payload: run,
        };
        self.entries.lock().await.insert(key, entry.clone());
        self.table
            .put(
                &encode_key(&[tag, &horizon.to_string()]),
                &serde_json::to_vec(&entry).unwrap_or_default(),
                Some(self.ttl),
            )
            .await;
        Ok(entry.payload)
    }

    async fn lookup(&self, key: &CacheKey) -> Option<CachedResult> {
        let version = self.merger.version(&key.0).await?;

        {
            let entries = self.entries.lock().await;
            if let Some(entry) = entries.get(key) {
                if entry.data_version == version && entry.expires_at > Utc::now() {
                    debug!("Cache HIT for '{}'/{}", key.0, key.1);
                    return Some(entry.clone());
                }
                debug!(
                    "Cache entry for '{}'/{} is stale (version {} vs {})",
                    key.0, key.1, entry.data_version, version
                );
                return None;
            }
        }

        // Memory miss: a previous process may have left a valid entry in
        // the persistent table.
        let raw = self
            .table
            .get(&encode_key(&[&key.0, &key.1.to_string()]))
            .await?;
        let entry: CachedResult = serde_json::from_slice(&raw).ok()?;
        if entry.data_version == version && entry.expires_at > Utc::now() {
            debug!("Cache HIT (persisted) for '{}'/{}", key.0, key.1);
            self.entries.lock().await.insert(key.clone(), entry.clone());
            return Some(entry);
        }
        None
    }
}

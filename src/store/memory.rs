use crate::store::KeyValueCollection;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

struct StoredValue {
    data: Vec<u8>,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|expiry| expiry < Instant::now())
    }
}

/// Ordered in-memory collection used for tests and as the fallback when no
/// keyspace is available.
pub struct MemoryCollection {
    inner: Mutex<BTreeMap<Vec<u8>, StoredValue>>,
}

impl MemoryCollection {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BTreeMap::new()),
        }
    }
}

impl Default for MemoryCollection {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueCollection for MemoryCollection {
    async fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let mut map = self.inner.lock().await;
        if let Some(entry) = map.get(key) {
            if entry.is_expired() {
                debug!("Entry expired for key: {:?}", String::from_utf8_lossy(key));
                map.remove(key);
                return None;
            }
            return Some(entry.data.clone());
        }
        None
    }

    async fn put(&self, key: &[u8], value: &[u8], ttl: Option<Duration>) {
        let expires_at = ttl.map(|duration| Instant::now() + duration);
        let mut map = self.inner.lock().await;
        map.insert(
            key.to_vec(),
            StoredValue {
                data: value.to_vec(),
                expires_at,
            },
        );
    }

    async fn remove(&self, key: &[u8]) {
        let mut map = self.inner.lock().await;
        map.remove(key);
    }

    async fn scan_prefix(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        let map = self.inner.lock().await;
        map.range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .filter(|(_, value)| !value.is_expired())
            .map(|(key, value)| (key.clone(), value.data.clone()))
            .collect()
    }
}

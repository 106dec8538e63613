pub mod disk;
pub mod memory;

use async_trait::async_trait;
use disk::DiskCollection;
use fjall::{Keyspace, PartitionCreateOptions};
use memory::MemoryCollection;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::debug;

/// A named, key-ordered collection of byte entries with optional TTLs.
#[async_trait]
pub trait KeyValueCollection: Send + Sync {
    async fn get(&self, key: &[u8]) -> Option<Vec<u8>>;
    async fn put(&self, key: &[u8], value: &[u8], ttl: Option<Duration>);
    async fn remove(&self, key: &[u8]);
    /// Key-ordered scan of live entries whose key starts with `prefix`.
    async fn scan_prefix(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)>;
}

/// Joins key segments with a separator that sorts below printable input,
/// keeping per-tag entries contiguous in ordered scans.
pub fn encode_key(parts: &[&str]) -> Vec<u8> {
    parts.join("\u{1f}").into_bytes()
}

/// Splits a key produced by [`encode_key`] back into segments.
pub fn decode_key(key: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(key)
        .split('\u{1f}')
        .map(str::to_string)
        .collect()
}

/// A thread-safe store holding multiple named collections. Collections are
/// fjall partitions when a keyspace is available and ordered in-memory maps
/// otherwise (tests, or a failed keyspace open).
pub struct KeyValueStore {
    collections: RwLock<HashMap<String, Arc<dyn KeyValueCollection>>>,
    keyspace: Option<Arc<Keyspace>>,
}

impl KeyValueStore {
    /// Opens a persistent store rooted at `path`.
    pub fn open(path: &Path) -> Self {
        let keyspace = fjall::Config::new(path).open().ok().map(Arc::new);
        if keyspace.is_none() {
            debug!("Keyspace open failed at {}; using memory-only store", path.display());
        }
        Self {
            collections: RwLock::new(HashMap::new()),
            keyspace,
        }
    }

    /// A store with no backing keyspace; every collection lives in memory.
    pub fn in_memory() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            keyspace: None,
        }
    }

    /// Returns the named collection, creating it on first use. `persist`
    /// requests a disk-backed partition; memory is the fallback.
    pub fn collection(&self, name: &str, persist: bool) -> Arc<dyn KeyValueCollection> {
        {
            let collections = self.collections.read().unwrap();
            if let Some(existing) = collections.get(name) {
                return Arc::clone(existing);
            }
        }

        let mut collections = self.collections.write().unwrap();
        // Another caller may have created it between the read and write lock.
        if let Some(existing) = collections.get(name) {
            return Arc::clone(existing);
        }

        let collection: Arc<dyn KeyValueCollection> = if persist {
            match self.keyspace.as_ref().and_then(|ks| {
                ks.open_partition(name, PartitionCreateOptions::default())
                    .ok()
            }) {
                Some(partition) => Arc::new(DiskCollection::new(partition)),
                None => {
                    debug!("No persistent partition for '{name}'; using memory collection");
                    Arc::new(MemoryCollection::new())
                }
            }
        } else {
            Arc::new(MemoryCollection::new())
        };

        collections.insert(name.to_string(), Arc::clone(&collection));
        collection
    }
}

use crate::store::KeyValueCollection;
use anyhow::Result;
use async_trait::async_trait;
use fjall::PartitionHandle;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};
use tracing::debug;

#[derive(Serialize, Deserialize)]
struct DiskEntry {
    value: Vec<u8>,
    expires_at: Option<SystemTime>,
}

impl DiskEntry {
    fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|expiry| SystemTime::now() > expiry)
    }
}

/// fjall-partition-backed collection. Partitions iterate in key order, which
/// keeps per-tag series scans contiguous.
pub struct DiskCollection {
    partition: PartitionHandle,
}

impl DiskCollection {
    pub fn new(partition: PartitionHandle) -> Self {
        Self { partition }
    }
}

#[async_trait]
impl KeyValueCollection for DiskCollection {
    async fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let res: Result<Option<Vec<u8>>> = (|| {
            if let Some(raw) = self.partition.get(key)? {
                let entry: DiskEntry = serde_json::from_slice(&raw)?;
                if entry.is_expired() {
                    debug!("Entry expired for key: {:?}", String::from_utf8_lossy(key));
                    self.partition.remove(key)?;
                    return Ok(None);
                }
                return Ok(Some(entry.value));
            }
            Ok(None)
        })();

        match res {
            Ok(val) => val,
            Err(e) => {
                debug!("DiskCollection get error: {}", e);
                None
            }
        }
    }

    async fn put(&self, key: &[u8], value: &[u8], ttl: Option<Duration>) {
        let res: Result<()> = (|| {
            let entry = DiskEntry {
                value: value.to_vec(),
                expires_at: ttl.map(|d| SystemTime::now() + d),
            };
            self.partition.insert(key, serde_json::to_vec(&entry)?)?;
            Ok(())
        })();
        if let Err(e) = res {
            debug!("DiskCollection put error: {}", e);
        }
    }

    async fn remove(&self, key: &[u8]) {
        if let Err(e) = self.partition.remove(key) {
            debug!("DiskCollection remove error: {}", e);
        }
    }

    async fn scan_prefix(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mut entries = Vec::new();
        for item in self.partition.prefix(prefix) {
            match item {
                Ok((key, raw)) => match serde_json::from_slice::<DiskEntry>(&raw) {
                    Ok(entry) if !entry.is_expired() => {
                        entries.push((key.to_vec(), entry.value));
                    }
                    Ok(_) => {}
                    Err(e) => debug!("DiskCollection scan decode error: {}", e),
                },
                Err(e) => {
                    debug!("DiskCollection scan error: {}", e);
                    break;
                }
            }
        }
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fjall::PartitionCreateOptions;
    use tempfile::tempdir;
    use tokio::time::sleep;

    fn open_collection(path: &std::path::Path) -> DiskCollection {
        let keyspace = fjall::Config::new(path).open().unwrap();
        let partition = keyspace
            .open_partition("test", PartitionCreateOptions::default())
            .unwrap();
        DiskCollection::new(partition)
    }

    #[tokio::test]
    async fn test_get_put_remove() {
        let dir = tempdir().unwrap();
        let collection = open_collection(dir.path());

        assert!(collection.get(b"key1").await.is_none());

        collection.put(b"key1", b"value1", None).await;
        assert_eq!(collection.get(b"key1").await, Some(b"value1".to_vec()));

        collection.remove(b"key1").await;
        assert!(collection.get(b"key1").await.is_none());
    }

    #[tokio::test]
    async fn test_ttl_expiration() {
        let dir = tempdir().unwrap();
        let collection = open_collection(dir.path());

        collection
            .put(b"key1", b"value1", Some(Duration::from_millis(10)))
            .await;
        assert_eq!(collection.get(b"key1").await, Some(b"value1".to_vec()));

        sleep(Duration::from_millis(20)).await;
        assert!(collection.get(b"key1").await.is_none());
    }

    #[tokio::test]
    async fn test_scan_prefix() {
        let dir = tempdir().unwrap();
        let collection = open_collection(dir.path());

        collection.put(b"python\x1fa", b"1", None).await;
        collection.put(b"python\x1fb", b"2", None).await;
        collection.put(b"rust\x1fa", b"3", None).await;

        let entries = collection.scan_prefix(b"python\x1f").await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].1, b"1".to_vec());
        assert_eq!(entries[1].1, b"2".to_vec());
    }
}

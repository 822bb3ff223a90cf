//! In-process volatile backend.
//!
//! A mutex-guarded table of `uri -> record` plus a running byte total.
//! Expiry is enforced lazily on every read path and physically by the
//! periodic sweep; capacity pressure is relieved by LRU eviction after each
//! write. Contents do not survive the process.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::{build_multi_records, select_best, sort_newest_first, validate_multi, ResourceStore};
use crate::config::AppConfig;
use crate::record::{CacheStats, MultiWrite, MultiWriteUris, ResourceRecord, WriteMeta};
use crate::Error;

/// URI scheme literal for records produced by this backend.
pub const SCHEME: &str = "memory";

const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Default)]
struct Table {
    records: HashMap<String, ResourceRecord>,
    total_bytes: u64,
}

impl Table {
    fn remove(&mut self, uri: &str) -> Option<ResourceRecord> {
        let removed = self.records.remove(uri);
        if let Some(r) = &removed {
            self.total_bytes = self.total_bytes.saturating_sub(r.size_bytes);
        }
        removed
    }

    fn insert(&mut self, record: ResourceRecord) {
        if let Some(old) = self.records.get(&record.uri) {
            self.total_bytes = self.total_bytes.saturating_sub(old.size_bytes);
        }
        self.total_bytes += record.size_bytes;
        self.records.insert(record.uri.clone(), record);
    }

    /// Drop every record that is logically expired at `now`.
    fn purge_expired(&mut self, now: chrono::DateTime<chrono::Utc>) -> u64 {
        let expired: Vec<String> = self
            .records
            .values()
            .filter(|r| r.is_expired(now))
            .map(|r| r.uri.clone())
            .collect();
        let count = expired.len() as u64;
        for uri in expired {
            self.remove(&uri);
        }
        count
    }

    /// LRU eviction: remove oldest-accessed records until both limits hold
    /// or the table is empty. Runs after a write, never blocking it.
    fn evict(&mut self, max_items: u64, max_size_bytes: u64) -> u64 {
        let mut evicted = 0;
        while !self.records.is_empty()
            && (self.records.len() as u64 > max_items || self.total_bytes > max_size_bytes)
        {
            let victim = self
                .records
                .values()
                .min_by_key(|r| r.last_access)
                .map(|r| r.uri.clone());
            match victim {
                Some(uri) => {
                    self.remove(&uri);
                    evicted += 1;
                }
                None => break,
            }
        }
        evicted
    }
}

/// The in-process volatile backend.
pub struct MemoryStore {
    table: Arc<Mutex<Table>>,
    max_items: u64,
    max_size_bytes: u64,
    default_ttl_ms: i64,
    sweep_interval: Duration,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryStore {
    pub fn new(max_items: u64, max_size_bytes: u64, default_ttl_ms: i64, sweep_interval: Duration) -> Self {
        Self {
            table: Arc::new(Mutex::new(Table::default())),
            max_items,
            max_size_bytes,
            default_ttl_ms,
            sweep_interval,
            sweeper: Mutex::new(None),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.max_items,
            config.max_size_bytes,
            config.default_ttl_ms,
            config.cleanup_interval(),
        )
    }

    #[cfg(test)]
    async fn physical_len(&self) -> usize {
        self.table.lock().await.records.len()
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn list(&self) -> Result<Vec<ResourceRecord>, Error> {
        let mut table = self.table.lock().await;
        table.purge_expired(Utc::now());
        let mut records: Vec<ResourceRecord> = table.records.values().cloned().collect();
        sort_newest_first(&mut records);
        Ok(records)
    }

    async fn read(&self, uri: &str) -> Result<ResourceRecord, Error> {
        let mut table = self.table.lock().await;
        let now = Utc::now();
        let expired = table.records.get(uri).is_some_and(|r| r.is_expired(now));
        if expired {
            table.remove(uri);
        }
        match table.records.get_mut(uri) {
            Some(record) => {
                record.last_access = now;
                Ok(record.clone())
            }
            None => Err(Error::NotFound(uri.to_string())),
        }
    }

    async fn write(&self, url: &str, content: &str, meta: WriteMeta) -> Result<String, Error> {
        let mut record = super::build_record(SCHEME, url, content, &meta, self.default_ttl_ms)?;
        let mut table = self.table.lock().await;
        // Replacing an existing uri keeps the original creation time.
        if let Some(old) = table.records.get(&record.uri) {
            record.created_at = old.created_at;
        }
        let uri = record.uri.clone();
        table.insert(record);
        let evicted = table.evict(self.max_items, self.max_size_bytes);
        if evicted > 0 {
            tracing::debug!(evicted, "memory store evicted records over capacity");
        }
        Ok(uri)
    }

    async fn write_multi(&self, batch: MultiWrite) -> Result<MultiWriteUris, Error> {
        validate_multi(&batch)?;
        // All records are materialized before the table is touched, so a
        // rejected batch leaves nothing behind.
        let (records, uris) = build_multi_records(SCHEME, &batch, self.default_ttl_ms, Utc::now());
        let mut table = self.table.lock().await;
        for record in records {
            table.insert(record);
        }
        table.evict(self.max_items, self.max_size_bytes);
        Ok(uris)
    }

    async fn exists(&self, uri: &str) -> Result<bool, Error> {
        let mut table = self.table.lock().await;
        let now = Utc::now();
        let expired = table.records.get(uri).is_some_and(|r| r.is_expired(now));
        if expired {
            table.remove(uri);
        }
        match table.records.get_mut(uri) {
            Some(record) => {
                record.last_access = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, uri: &str) -> Result<(), Error> {
        self.table.lock().await.remove(uri);
        Ok(())
    }

    async fn find_by_url(&self, url: &str) -> Result<Vec<ResourceRecord>, Error> {
        let mut table = self.table.lock().await;
        let now = Utc::now();
        table.purge_expired(now);
        let uris: Vec<String> = table
            .records
            .values()
            .filter(|r| r.url == url)
            .map(|r| r.uri.clone())
            .collect();
        let mut hits = Vec::with_capacity(uris.len());
        for uri in uris {
            if let Some(record) = table.records.get_mut(&uri) {
                record.last_access = now;
                hits.push(record.clone());
            }
        }
        sort_newest_first(&mut hits);
        Ok(hits)
    }

    async fn find_by_url_and_extract(
        &self, url: &str, extraction_prompt: Option<&str>,
    ) -> Result<Option<ResourceRecord>, Error> {
        let mut table = self.table.lock().await;
        let now = Utc::now();
        table.purge_expired(now);
        let candidates: Vec<ResourceRecord> = table
            .records
            .values()
            .filter(|r| r.url == url)
            .cloned()
            .collect();
        match select_best(candidates, extraction_prompt) {
            Some(best) => {
                if let Some(record) = table.records.get_mut(&best.uri) {
                    record.last_access = now;
                }
                Ok(Some(best))
            }
            None => Ok(None),
        }
    }

    async fn stats(&self) -> Result<CacheStats, Error> {
        let mut table = self.table.lock().await;
        table.purge_expired(Utc::now());
        let mut records: Vec<ResourceRecord> = table.records.values().cloned().collect();
        sort_newest_first(&mut records);
        Ok(CacheStats {
            item_count: table.records.len() as u64,
            total_size_bytes: table.total_bytes,
            max_items: self.max_items,
            max_size_bytes: self.max_size_bytes,
            default_ttl_ms: self.default_ttl_ms,
            records: records.iter().map(Into::into).collect(),
        })
    }

    async fn start_cleanup(&self, interval: Option<Duration>) -> Result<(), Error> {
        let mut sweeper = self.sweeper.lock().await;
        if sweeper.is_some() {
            return Ok(());
        }
        let table = Arc::clone(&self.table);
        let period = interval.unwrap_or(if self.sweep_interval.is_zero() {
            DEFAULT_SWEEP_INTERVAL
        } else {
            self.sweep_interval
        });
        *sweeper = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let purged = table.lock().await.purge_expired(Utc::now());
                if purged > 0 {
                    tracing::debug!(purged, "memory store sweep removed expired records");
                }
            }
        }));
        Ok(())
    }

    async fn stop_cleanup(&self) -> Result<(), Error> {
        if let Some(handle) = self.sweeper.lock().await.take() {
            handle.abort();
        }
        Ok(())
    }
}

impl Drop for MemoryStore {
    fn drop(&mut self) {
        // The sweep task holds only a clone of the table Arc; abort it so
        // it does not outlive the store.
        if let Ok(sweeper) = self.sweeper.try_lock()
            && let Some(handle) = sweeper.as_ref()
        {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ResourceType;

    fn store() -> MemoryStore {
        MemoryStore::new(1_000, 50 * 1024 * 1024, 0, Duration::from_millis(50))
    }

    async fn tick() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    #[tokio::test]
    async fn test_round_trip() {
        let store = store();
        let uri = store.write("https://e.com", "hello", WriteMeta::default()).await.unwrap();
        let record = store.read(&uri).await.unwrap();
        assert_eq!(record.content, "hello");
        assert_eq!(record.url, "https://e.com");
        assert_eq!(record.resource_type, ResourceType::Raw);
        assert_eq!(record.content_type, "text/plain");
    }

    #[tokio::test]
    async fn test_read_missing() {
        let store = store();
        let err = store.read("memory://raw/nope_1").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_write_empty_url_rejected() {
        let store = store();
        let err = store.write("  ", "x", WriteMeta::default()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_ttl_expiry_across_read_paths() {
        let store = store();
        let meta = WriteMeta { ttl_ms: Some(40), ..Default::default() };
        let uri = store.write("https://e.com/ttl", "x", meta).await.unwrap();

        assert!(store.exists(&uri).await.unwrap());
        tokio::time::sleep(Duration::from_millis(120)).await;

        assert!(!store.exists(&uri).await.unwrap());
        assert!(matches!(store.read(&uri).await, Err(Error::NotFound(_))));
        assert!(store.find_by_url("https://e.com/ttl").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_zero_ttl_never_expires() {
        let store = MemoryStore::new(1_000, u64::MAX, 10, Duration::from_millis(50));
        let meta = WriteMeta { ttl_ms: Some(0), ..Default::default() };
        let uri = store.write("https://e.com/forever", "x", meta).await.unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(store.exists(&uri).await.unwrap());
        assert_eq!(store.find_by_url("https://e.com/forever").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_default_ttl_applied_when_omitted() {
        let store = MemoryStore::new(1_000, u64::MAX, 40, Duration::from_millis(50));
        let uri = store.write("https://e.com/default", "x", WriteMeta::default()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(!store.exists(&uri).await.unwrap());
    }

    #[tokio::test]
    async fn test_eviction_is_lru() {
        let store = MemoryStore::new(2, u64::MAX, 0, Duration::from_millis(50));
        let a = store.write("https://e.com/a", "a", WriteMeta::default()).await.unwrap();
        tick().await;
        let b = store.write("https://e.com/b", "b", WriteMeta::default()).await.unwrap();
        tick().await;

        // Touching a makes b the eviction victim.
        store.read(&a).await.unwrap();
        tick().await;
        let c = store.write("https://e.com/c", "c", WriteMeta::default()).await.unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(store.exists(&a).await.unwrap());
        assert!(!store.exists(&b).await.unwrap());
        assert!(store.exists(&c).await.unwrap());
    }

    #[tokio::test]
    async fn test_capacity_keeps_most_recent() {
        let store = MemoryStore::new(2, u64::MAX, 0, Duration::from_millis(50));
        store.write("https://e.com/1", "1", WriteMeta::default()).await.unwrap();
        tick().await;
        store.write("https://e.com/2", "2", WriteMeta::default()).await.unwrap();
        tick().await;
        store.write("https://e.com/3", "3", WriteMeta::default()).await.unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        let urls: Vec<&str> = listed.iter().map(|r| r.url.as_str()).collect();
        assert!(urls.contains(&"https://e.com/2"));
        assert!(urls.contains(&"https://e.com/3"));
    }

    #[tokio::test]
    async fn test_size_pressure_evicts() {
        let store = MemoryStore::new(1_000, 10, 0, Duration::from_millis(50));
        store.write("https://e.com/big1", "123456", WriteMeta::default()).await.unwrap();
        tick().await;
        store.write("https://e.com/big2", "7890123", WriteMeta::default()).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.item_count, 1);
        assert!(stats.total_size_bytes <= 10);
        assert_eq!(stats.records[0].url, "https://e.com/big2");
    }

    #[tokio::test]
    async fn test_write_multi_stores_three_records() {
        let store = store();
        let batch = MultiWrite {
            url: "https://e.com/a".into(),
            raw: "<h1/>".into(),
            cleaned: Some("# A".into()),
            extracted: Some("{}".into()),
            meta: WriteMeta { extraction_prompt: Some("x".into()), ..Default::default() },
        };
        let uris = store.write_multi(batch).await.unwrap();

        assert_eq!(store.read(&uris.raw).await.unwrap().content, "<h1/>");
        assert_eq!(store.read(uris.cleaned.as_ref().unwrap()).await.unwrap().content, "# A");
        assert_eq!(store.read(uris.extracted.as_ref().unwrap()).await.unwrap().content, "{}");
        assert_eq!(store.find_by_url("https://e.com/a").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_write_multi_rejected_batch_leaves_nothing() {
        let store = store();
        let batch = MultiWrite {
            url: "https://e.com/partial".into(),
            raw: "<h1/>".into(),
            cleaned: Some("# A".into()),
            extracted: Some("{}".into()),
            // Missing prompt fails validation before any record lands.
            meta: WriteMeta::default(),
        };
        assert!(store.write_multi(batch).await.is_err());
        assert!(store.find_by_url("https://e.com/partial").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lookup_priority() {
        let store = store();
        let batch = MultiWrite {
            url: "https://e.com/p".into(),
            raw: "<h1/>".into(),
            cleaned: Some("# P".into()),
            extracted: Some("summary".into()),
            meta: WriteMeta { extraction_prompt: Some("Summarize".into()), ..Default::default() },
        };
        store.write_multi(batch).await.unwrap();

        let no_prompt = store.find_by_url_and_extract("https://e.com/p", None).await.unwrap().unwrap();
        assert_eq!(no_prompt.resource_type, ResourceType::Cleaned);

        let matched = store
            .find_by_url_and_extract("https://e.com/p", Some("Summarize"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(matched.resource_type, ResourceType::Extracted);

        let fallback = store
            .find_by_url_and_extract("https://e.com/p", Some("Other"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fallback.resource_type, ResourceType::Cleaned);

        assert!(store.find_by_url_and_extract("https://nowhere", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_idempotent() {
        let store = store();
        let uri = store.write("https://e.com/del", "x", WriteMeta::default()).await.unwrap();
        store.delete(&uri).await.unwrap();
        store.delete(&uri).await.unwrap();
        assert!(!store.exists(&uri).await.unwrap());
    }

    #[tokio::test]
    async fn test_sweep_physically_removes() {
        let store = store();
        let meta = WriteMeta { ttl_ms: Some(30), ..Default::default() };
        store.write("https://e.com/swept", "x", meta).await.unwrap();

        store.start_cleanup(Some(Duration::from_millis(40))).await.unwrap();
        // Second start is a no-op rather than a second timer.
        store.start_cleanup(Some(Duration::from_millis(40))).await.unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(store.physical_len().await, 0);

        store.stop_cleanup().await.unwrap();
        // Stopping again when not running is safe.
        store.stop_cleanup().await.unwrap();
    }

    #[tokio::test]
    async fn test_stats_shape() {
        let store = store();
        store.write("https://e.com/s", "abc", WriteMeta::default()).await.unwrap();
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.item_count, 1);
        assert_eq!(stats.total_size_bytes, 3);
        assert_eq!(stats.max_items, 1_000);
        assert_eq!(stats.records.len(), 1);
        assert_eq!(stats.records[0].size_bytes, 3);
    }
}

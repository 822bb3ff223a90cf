//! Filesystem-backed storage.
//!
//! One JSON document per record under a configured directory. Durability
//! semantics mirror the SQLite backend: TTL expiry checked at read time plus
//! a periodic sweep, no LRU eviction. Writes go through a temp file and an
//! atomic rename so readers never observe a half-written record.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::{build_multi_records, select_best, sort_newest_first, validate_multi, ResourceStore};
use crate::config::AppConfig;
use crate::record::{CacheStats, MultiWrite, MultiWriteUris, RecordStats, ResourceRecord, WriteMeta};
use crate::Error;

/// URI scheme literal for records produced by this backend.
pub const SCHEME: &str = "file";

fn file_name_for(uri: &str) -> String {
    // URIs are alphanumerics plus the fixed `://` and `/` separators, so
    // this mapping cannot collide for distinct URIs.
    let sanitized: String = uri
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{sanitized}.json")
}

/// The filesystem backend.
pub struct FilesystemStore {
    root: PathBuf,
    max_items: u64,
    max_size_bytes: u64,
    default_ttl_ms: i64,
    sweep_interval: Duration,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl FilesystemStore {
    /// Open (creating if needed) the storage directory.
    pub async fn open(root: impl AsRef<Path>, config: &AppConfig) -> Result<Self, Error> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            max_items: config.max_items,
            max_size_bytes: config.max_size_bytes,
            default_ttl_ms: config.default_ttl_ms,
            sweep_interval: config.cleanup_interval(),
            sweeper: Mutex::new(None),
        })
    }

    fn path_for(&self, uri: &str) -> PathBuf {
        self.root.join(file_name_for(uri))
    }

    async fn load(&self, uri: &str) -> Result<Option<ResourceRecord>, Error> {
        match tokio::fs::read(self.path_for(uri)).await {
            Ok(bytes) => {
                let record = serde_json::from_slice(&bytes).map_err(|e| Error::Decode(e.to_string()))?;
                Ok(Some(record))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn persist(&self, record: &ResourceRecord) -> Result<(), Error> {
        let bytes = serde_json::to_vec(record).map_err(|e| Error::Decode(e.to_string()))?;
        write_atomic(&self.path_for(&record.uri), &bytes).await
    }

    /// Read every record file in the directory. Files that fail to decode
    /// are skipped with a warning rather than failing the whole scan.
    async fn scan(&self) -> Result<Vec<ResourceRecord>, Error> {
        let mut records = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            match serde_json::from_slice::<ResourceRecord>(&bytes) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping undecodable record file");
                }
            }
        }
        Ok(records)
    }

    /// Scan, delete expired record files, and return the survivors.
    async fn scan_fresh(&self) -> Result<Vec<ResourceRecord>, Error> {
        let now = Utc::now();
        let mut fresh = Vec::new();
        for record in self.scan().await? {
            if record.is_expired(now) {
                remove_quiet(&self.path_for(&record.uri)).await;
            } else {
                fresh.push(record);
            }
        }
        Ok(fresh)
    }

    /// Persist a batch in order, removing the already-written files when a
    /// later sub-write fails so no partial triple survives.
    async fn persist_batch(&self, records: &[ResourceRecord]) -> Result<(), Error> {
        let mut written: Vec<PathBuf> = Vec::with_capacity(records.len());
        for record in records {
            match self.persist(record).await {
                Ok(()) => written.push(self.path_for(&record.uri)),
                Err(e) => {
                    for path in &written {
                        remove_quiet(path).await;
                    }
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    async fn touch(&self, record: &mut ResourceRecord) -> Result<(), Error> {
        record.last_access = Utc::now();
        self.persist(record).await
    }

    async fn purge_expired_files(root: &Path) -> Result<u64, Error> {
        let now = Utc::now();
        let mut purged = 0;
        let mut entries = tokio::fs::read_dir(root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let Ok(bytes) = tokio::fs::read(&path).await else { continue };
            let Ok(record) = serde_json::from_slice::<ResourceRecord>(&bytes) else {
                continue;
            };
            if record.is_expired(now) {
                remove_quiet(&path).await;
                purged += 1;
            }
        }
        Ok(purged)
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), Error> {
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        remove_quiet(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

async fn remove_quiet(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove record file");
    }
}

#[async_trait]
impl ResourceStore for FilesystemStore {
    async fn list(&self) -> Result<Vec<ResourceRecord>, Error> {
        let mut records = self.scan_fresh().await?;
        sort_newest_first(&mut records);
        Ok(records)
    }

    async fn read(&self, uri: &str) -> Result<ResourceRecord, Error> {
        match self.load(uri).await? {
            Some(record) if record.is_expired(Utc::now()) => {
                remove_quiet(&self.path_for(uri)).await;
                Err(Error::NotFound(uri.to_string()))
            }
            Some(mut record) => {
                self.touch(&mut record).await?;
                Ok(record)
            }
            None => Err(Error::NotFound(uri.to_string())),
        }
    }

    async fn write(&self, url: &str, content: &str, meta: WriteMeta) -> Result<String, Error> {
        let mut record = super::build_record(SCHEME, url, content, &meta, self.default_ttl_ms)?;
        // Replacing an existing uri keeps the original creation time.
        if let Some(old) = self.load(&record.uri).await? {
            record.created_at = old.created_at;
        }
        self.persist(&record).await?;
        Ok(record.uri)
    }

    async fn write_multi(&self, batch: MultiWrite) -> Result<MultiWriteUris, Error> {
        validate_multi(&batch)?;
        let (records, uris) = build_multi_records(SCHEME, &batch, self.default_ttl_ms, Utc::now());
        self.persist_batch(&records).await?;
        Ok(uris)
    }

    async fn exists(&self, uri: &str) -> Result<bool, Error> {
        match self.load(uri).await? {
            Some(record) if record.is_expired(Utc::now()) => {
                remove_quiet(&self.path_for(uri)).await;
                Ok(false)
            }
            Some(mut record) => {
                self.touch(&mut record).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, uri: &str) -> Result<(), Error> {
        remove_quiet(&self.path_for(uri)).await;
        Ok(())
    }

    async fn find_by_url(&self, url: &str) -> Result<Vec<ResourceRecord>, Error> {
        let mut hits: Vec<ResourceRecord> = self
            .scan_fresh()
            .await?
            .into_iter()
            .filter(|r| r.url == url)
            .collect();
        for record in &mut hits {
            self.touch(record).await?;
        }
        sort_newest_first(&mut hits);
        Ok(hits)
    }

    async fn find_by_url_and_extract(
        &self, url: &str, extraction_prompt: Option<&str>,
    ) -> Result<Option<ResourceRecord>, Error> {
        let candidates: Vec<ResourceRecord> = self
            .scan_fresh()
            .await?
            .into_iter()
            .filter(|r| r.url == url)
            .collect();
        match select_best(candidates, extraction_prompt) {
            Some(mut best) => {
                self.touch(&mut best).await?;
                Ok(Some(best))
            }
            None => Ok(None),
        }
    }

    async fn stats(&self) -> Result<CacheStats, Error> {
        let mut records = self.scan_fresh().await?;
        sort_newest_first(&mut records);
        let total_size_bytes = records.iter().map(|r| r.size_bytes).sum();
        Ok(CacheStats {
            item_count: records.len() as u64,
            total_size_bytes,
            max_items: self.max_items,
            max_size_bytes: self.max_size_bytes,
            default_ttl_ms: self.default_ttl_ms,
            records: records.iter().map(RecordStats::from).collect(),
        })
    }

    async fn start_cleanup(&self, interval: Option<Duration>) -> Result<(), Error> {
        let mut sweeper = self.sweeper.lock().await;
        if sweeper.is_some() {
            return Ok(());
        }
        let root = self.root.clone();
        let period = interval.unwrap_or(self.sweep_interval);
        *sweeper = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match Self::purge_expired_files(&root).await {
                    Ok(purged) if purged > 0 => {
                        tracing::debug!(purged, "filesystem store sweep removed expired records");
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "filesystem store sweep failed"),
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

impl Drop for FilesystemStore {
    fn drop(&mut self) {
        if let Ok(sweeper) = self.sweeper.try_lock()
            && let Some(handle) = sweeper.as_ref()
        {
            handle.abort();
        }
    }
}

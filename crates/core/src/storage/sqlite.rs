//! Durable SQLite-backed storage.
//!
//! Same contract as the volatile backend, but expiry enforcement is pushed
//! into the queries (every read filters on the stored `expires_at`) and
//! `write_multi` runs inside one transaction on the one connection, so a
//! partial triple is never visible to readers.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_rusqlite::{params, rusqlite, Connection};

use super::{build_multi_records, migrations, validate_multi, ResourceStore};
use crate::config::AppConfig;
use crate::record::{CacheStats, MultiWrite, MultiWriteUris, RecordStats, ResourceRecord, ResourceType, WriteMeta};
use crate::Error;

/// URI scheme literal for records produced by this backend.
pub const SCHEME: &str = "sqlite";

const COLS: &str = "uri, url, resource_type, content, content_type, extraction_prompt, \
                    ttl_ms, size_bytes, created_at, last_access";

/// Tie-break used when recency alone cannot decide: prefer the most
/// human-readable tier.
const TIER_ORDER: &str = "CASE resource_type WHEN 'cleaned' THEN 0 WHEN 'extracted' THEN 1 ELSE 2 END";

fn ms_to_utc(idx: usize, ms: i64) -> rusqlite::Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single().ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Integer,
            format!("timestamp out of range: {ms}").into(),
        )
    })
}

fn record_from_row(row: &rusqlite::Row) -> rusqlite::Result<ResourceRecord> {
    let type_str: String = row.get(2)?;
    let resource_type: ResourceType = type_str.parse().map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown resource type: {type_str}").into(),
        )
    })?;
    Ok(ResourceRecord {
        uri: row.get(0)?,
        url: row.get(1)?,
        resource_type,
        content: row.get(3)?,
        content_type: row.get(4)?,
        extraction_prompt: row.get(5)?,
        ttl_ms: row.get(6)?,
        size_bytes: row.get::<_, i64>(7)? as u64,
        created_at: ms_to_utc(8, row.get(8)?)?,
        last_access: ms_to_utc(9, row.get(9)?)?,
    })
}

fn upsert(conn: &rusqlite::Connection, record: &ResourceRecord) -> Result<(), Error> {
    let now_ms = Utc::now().timestamp_millis();
    let expires_at = record.expires_at().map(|t| t.timestamp_millis());
    conn.execute(
        "INSERT INTO resources (
            uri, url, resource_type, content, content_type, extraction_prompt,
            ttl_ms, size_bytes, created_at, updated_at, last_access, expires_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        ON CONFLICT(uri) DO UPDATE SET
            url = excluded.url,
            resource_type = excluded.resource_type,
            content = excluded.content,
            content_type = excluded.content_type,
            extraction_prompt = excluded.extraction_prompt,
            ttl_ms = excluded.ttl_ms,
            size_bytes = excluded.size_bytes,
            updated_at = excluded.updated_at,
            last_access = excluded.last_access,
            expires_at = CASE WHEN excluded.ttl_ms > 0
                              THEN resources.created_at + excluded.ttl_ms
                              ELSE NULL END",
        params![
            &record.uri,
            &record.url,
            record.resource_type.as_str(),
            &record.content,
            &record.content_type,
            &record.extraction_prompt,
            record.ttl_ms,
            record.size_bytes as i64,
            record.created_at.timestamp_millis(),
            now_ms,
            record.last_access.timestamp_millis(),
            expires_at,
        ],
    )?;
    Ok(())
}

/// The durable backend. `Connection` runs statements on a background
/// thread; cloning shares the same connection.
pub struct SqliteStore {
    conn: Connection,
    max_items: u64,
    max_size_bytes: u64,
    default_ttl_ms: i64,
    sweep_interval: Duration,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl SqliteStore {
    /// Open a database at the specified path.
    ///
    /// Creates the file if it doesn't exist, applies performance pragmas,
    /// and runs any pending migrations.
    pub async fn open(path: impl AsRef<Path>, config: &AppConfig) -> Result<Self, Error> {
        let conn = Connection::open(path).await.map_err(|e| Error::Database(e.into()))?;
        Self::init(conn, config).await
    }

    /// Open an in-memory database, mainly for testing.
    pub async fn open_in_memory(config: &AppConfig) -> Result<Self, Error> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| Error::Database(e.into()))?;
        Self::init(conn, config).await
    }

    async fn init(conn: Connection, config: &AppConfig) -> Result<Self, Error> {
        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode=WAL;
                 PRAGMA synchronous=NORMAL;
                 PRAGMA temp_store=MEMORY;
                 PRAGMA foreign_keys=ON;",
            )?;
            Ok(())
        })
        .await
        .map_err(Error::Database)?;

        migrations::run(&conn).await?;

        Ok(Self {
            conn,
            max_items: config.max_items,
            max_size_bytes: config.max_size_bytes,
            default_ttl_ms: config.default_ttl_ms,
            sweep_interval: config.cleanup_interval(),
            sweeper: Mutex::new(None),
        })
    }

    pub(crate) async fn upsert_record(&self, record: &ResourceRecord) -> Result<(), Error> {
        let record = record.clone();
        self.conn
            .call(move |conn| upsert(conn, &record))
            .await
            .map_err(Error::from)
    }

    /// Delete every logically-expired row in one server-side statement.
    /// Returns the number of deleted rows.
    pub async fn purge_expired(&self) -> Result<u64, Error> {
        self.purge_expired_at(Utc::now().timestamp_millis()).await
    }

    /// A record is live through its exact expiry instant; only rows strictly
    /// past it are removed, matching the in-process expiry check.
    async fn purge_expired_at(&self, now_ms: i64) -> Result<u64, Error> {
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute(
                    "DELETE FROM resources WHERE expires_at IS NOT NULL AND expires_at < ?1",
                    params![now_ms],
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    #[cfg(test)]
    async fn physical_count(&self) -> i64 {
        self.conn
            .call(|conn| {
                conn.query_row("SELECT COUNT(*) FROM resources", [], |row| row.get(0))
                    .map_err(Error::from)
            })
            .await
            .unwrap()
    }
}

#[async_trait]
impl ResourceStore for SqliteStore {
    async fn list(&self) -> Result<Vec<ResourceRecord>, Error> {
        let now_ms = Utc::now().timestamp_millis();
        self.conn
            .call(move |conn| -> Result<Vec<ResourceRecord>, Error> {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {COLS} FROM resources
                     WHERE expires_at IS NULL OR expires_at >= ?1
                     ORDER BY created_at DESC, {TIER_ORDER}"
                ))?;
                let records = stmt
                    .query_map(params![now_ms], record_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(records)
            })
            .await
            .map_err(Error::from)
    }

    async fn read(&self, uri: &str) -> Result<ResourceRecord, Error> {
        let uri = uri.to_string();
        let now_ms = Utc::now().timestamp_millis();
        self.conn
            .call(move |conn| -> Result<ResourceRecord, Error> {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {COLS} FROM resources
                     WHERE uri = ?1 AND (expires_at IS NULL OR expires_at >= ?2)"
                ))?;
                let result = stmt.query_row(params![uri, now_ms], record_from_row);
                match result {
                    Ok(mut record) => {
                        conn.execute(
                            "UPDATE resources SET last_access = ?1 WHERE uri = ?2",
                            params![now_ms, record.uri],
                        )?;
                        record.last_access = ms_to_utc(0, now_ms).map_err(Error::from)?;
                        Ok(record)
                    }
                    Err(rusqlite::Error::QueryReturnedNoRows) => Err(Error::NotFound(uri.clone())),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    async fn write(&self, url: &str, content: &str, meta: WriteMeta) -> Result<String, Error> {
        let record = super::build_record(SCHEME, url, content, &meta, self.default_ttl_ms)?;
        let uri = record.uri.clone();
        self.upsert_record(&record).await?;
        Ok(uri)
    }

    async fn write_multi(&self, batch: MultiWrite) -> Result<MultiWriteUris, Error> {
        validate_multi(&batch)?;
        let (records, uris) = build_multi_records(SCHEME, &batch, self.default_ttl_ms, Utc::now());
        self.conn
            .call(move |conn| -> Result<(), Error> {
                // One transaction for the whole batch; dropping it without
                // commit rolls every sub-write back.
                let tx = conn.transaction()?;
                for record in &records {
                    upsert(&tx, record)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;
        Ok(uris)
    }

    async fn exists(&self, uri: &str) -> Result<bool, Error> {
        let uri = uri.to_string();
        let now_ms = Utc::now().timestamp_millis();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                // Touch and test in one statement.
                let touched = conn.execute(
                    "UPDATE resources SET last_access = ?1
                     WHERE uri = ?2 AND (expires_at IS NULL OR expires_at >= ?1)",
                    params![now_ms, uri],
                )?;
                Ok(touched > 0)
            })
            .await
            .map_err(Error::from)
    }

    async fn delete(&self, uri: &str) -> Result<(), Error> {
        let uri = uri.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute("DELETE FROM resources WHERE uri = ?1", params![uri])?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn find_by_url(&self, url: &str) -> Result<Vec<ResourceRecord>, Error> {
        let url = url.to_string();
        let now_ms = Utc::now().timestamp_millis();
        self.conn
            .call(move |conn| -> Result<Vec<ResourceRecord>, Error> {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {COLS} FROM resources
                     WHERE url = ?1 AND (expires_at IS NULL OR expires_at >= ?2)
                     ORDER BY created_at DESC, {TIER_ORDER}"
                ))?;
                let records = stmt
                    .query_map(params![url, now_ms], record_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                conn.execute(
                    "UPDATE resources SET last_access = ?1
                     WHERE url = ?2 AND (expires_at IS NULL OR expires_at >= ?1)",
                    params![now_ms, url],
                )?;
                Ok(records)
            })
            .await
            .map_err(Error::from)
    }

    async fn find_by_url_and_extract(
        &self, url: &str, extraction_prompt: Option<&str>,
    ) -> Result<Option<ResourceRecord>, Error> {
        let url = url.to_string();
        let prompt = extraction_prompt.map(String::from);
        let now_ms = Utc::now().timestamp_millis();
        self.conn
            .call(move |conn| -> Result<Option<ResourceRecord>, Error> {
                if let Some(prompt) = &prompt {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {COLS} FROM resources
                         WHERE url = ?1 AND resource_type = 'extracted' AND extraction_prompt = ?2
                           AND (expires_at IS NULL OR expires_at >= ?3)
                         ORDER BY created_at DESC LIMIT 1"
                    ))?;
                    match stmt.query_row(params![url, prompt, now_ms], record_from_row) {
                        Ok(record) => {
                            conn.execute(
                                "UPDATE resources SET last_access = ?1 WHERE uri = ?2",
                                params![now_ms, record.uri],
                            )?;
                            return Ok(Some(record));
                        }
                        Err(rusqlite::Error::QueryReturnedNoRows) => {}
                        Err(e) => return Err(e.into()),
                    }
                }

                // No exact extraction match: the tier tie-break lives in the
                // ordering clause rather than application code.
                let mut stmt = conn.prepare(&format!(
                    "SELECT {COLS} FROM resources
                     WHERE url = ?1 AND (expires_at IS NULL OR expires_at >= ?2)
                     ORDER BY created_at DESC, {TIER_ORDER} LIMIT 1"
                ))?;
                match stmt.query_row(params![url, now_ms], record_from_row) {
                    Ok(record) => {
                        conn.execute(
                            "UPDATE resources SET last_access = ?1 WHERE uri = ?2",
                            params![now_ms, record.uri],
                        )?;
                        Ok(Some(record))
                    }
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    async fn stats(&self) -> Result<CacheStats, Error> {
        let records = self.list().await?;
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
        let conn = self.conn.clone();
        let period = interval.unwrap_or(self.sweep_interval);
        *sweeper = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let now_ms = Utc::now().timestamp_millis();
                let result = conn
                    .call(move |conn| -> Result<u64, Error> {
                        let count = conn.execute(
                            "DELETE FROM resources WHERE expires_at IS NOT NULL AND expires_at < ?1",
                            params![now_ms],
                        )?;
                        Ok(count as u64)
                    })
                    .await;
                // A failed sweep never stops future sweeps.
                match result {
                    Ok(purged) if purged > 0 => {
                        tracing::debug!(purged, "sqlite store sweep removed expired records");
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "sqlite store sweep failed"),
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

impl Drop for SqliteStore {
    fn drop(&mut self) {
        if let Ok(sweeper) = self.sweeper.try_lock()
            && let Some(handle) = sweeper.as_ref()
        {
            handle.abort();
        }
    }
}

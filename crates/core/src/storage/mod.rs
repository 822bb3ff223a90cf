//! The storage contract shared by every cache backend.
//!
//! Callers receive one [`ResourceStore`] handle at startup and never learn
//! which backend is behind it. Semantics that vary per backend (transaction
//! strategy, eviction, capability gaps) are documented on the concrete types.

pub mod filesystem;
pub mod memory;
pub mod migrations;
pub mod sqlite;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::record::{CacheStats, MultiWrite, MultiWriteUris, ResourceRecord, ResourceType, WriteMeta};
use crate::Error;

pub use filesystem::FilesystemStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Uniform contract over the interchangeable storage backends.
///
/// Every read path observes TTL expiry: a record whose TTL has elapsed is
/// invisible even while physically present. `delete` is idempotent.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// All non-expired records, newest first.
    async fn list(&self) -> Result<Vec<ResourceRecord>, Error>;

    /// Read one record by URI. Expired or absent → [`Error::NotFound`].
    /// Touches the record's last-access time.
    async fn read(&self, uri: &str) -> Result<ResourceRecord, Error>;

    /// Store one record, returning its generated URI.
    async fn write(&self, url: &str, content: &str, meta: WriteMeta) -> Result<String, Error>;

    /// Store up to three variants sharing one URL and one write timestamp.
    /// All-or-nothing: if any sub-write fails, none of them persist.
    async fn write_multi(&self, batch: MultiWrite) -> Result<MultiWriteUris, Error>;

    /// Whether a record exists and is not expired. Touches last-access on a hit.
    async fn exists(&self, uri: &str) -> Result<bool, Error>;

    /// Remove a record. Never fails when the record is already absent.
    async fn delete(&self, uri: &str) -> Result<(), Error>;

    /// All non-expired records for a URL, newest first.
    async fn find_by_url(&self, url: &str) -> Result<Vec<ResourceRecord>, Error>;

    /// Single best match for a URL and optional extraction prompt, per the
    /// priority rule: an exact `(url, prompt)` extracted match wins; otherwise
    /// the newest record, ties broken `cleaned > extracted > raw`. An empty
    /// result is not an error.
    async fn find_by_url_and_extract(
        &self, url: &str, extraction_prompt: Option<&str>,
    ) -> Result<Option<ResourceRecord>, Error>;

    /// Aggregate view over the non-expired records.
    async fn stats(&self) -> Result<CacheStats, Error>;

    /// Start the periodic expiry sweep. A second call while running is a no-op.
    async fn start_cleanup(&self, interval: Option<Duration>) -> Result<(), Error>;

    /// Cancel the sweep timer. Safe to call when never started.
    async fn stop_cleanup(&self) -> Result<(), Error>;
}

/// Newest-first ordering with the tier tie-break pushed after recency.
pub(crate) fn sort_newest_first(records: &mut [ResourceRecord]) {
    records.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.resource_type.priority().cmp(&b.resource_type.priority()))
    });
}

/// The shared lookup rule for `find_by_url_and_extract`, applied in
/// application code by the memory and filesystem backends (the SQLite
/// backend pushes the same rule into its ORDER BY).
pub(crate) fn select_best(mut records: Vec<ResourceRecord>, prompt: Option<&str>) -> Option<ResourceRecord> {
    if let Some(prompt) = prompt {
        let mut extracted: Vec<ResourceRecord> = records
            .iter()
            .filter(|r| r.resource_type == ResourceType::Extracted && r.extraction_prompt.as_deref() == Some(prompt))
            .cloned()
            .collect();
        if !extracted.is_empty() {
            sort_newest_first(&mut extracted);
            return extracted.into_iter().next();
        }
    }

    sort_newest_first(&mut records);
    records.into_iter().next()
}

/// Build the record for a single `write`, applying the per-backend scheme
/// and the configured default TTL.
pub(crate) fn build_record(
    scheme: &str, url: &str, content: &str, meta: &WriteMeta, default_ttl_ms: i64,
) -> Result<ResourceRecord, Error> {
    if url.trim().is_empty() {
        return Err(Error::InvalidInput("write requires a non-empty url".into()));
    }
    let resource_type = meta.resource_type.unwrap_or(ResourceType::Raw);
    if resource_type == ResourceType::Extracted && meta.extraction_prompt.is_none() {
        return Err(Error::InvalidInput("extracted records require an extraction_prompt".into()));
    }
    // The prompt belongs to the extracted tier only; a stray prompt on a
    // raw or cleaned write is not stored.
    let extraction_prompt = if resource_type == ResourceType::Extracted {
        meta.extraction_prompt.clone()
    } else {
        None
    };
    let now = Utc::now();
    Ok(ResourceRecord {
        uri: crate::record::build_uri(scheme, resource_type, url, now),
        url: url.to_string(),
        resource_type,
        content: content.to_string(),
        content_type: meta.content_type.clone().unwrap_or_else(|| "text/plain".to_string()),
        extraction_prompt,
        ttl_ms: meta.ttl_ms.unwrap_or(default_ttl_ms),
        size_bytes: content.len() as u64,
        created_at: now,
        last_access: now,
    })
}

/// Validate a multi-write before any backend mutates state. Every backend
/// calls this first so a rejected batch leaves zero records behind.
pub(crate) fn validate_multi(batch: &MultiWrite) -> Result<(), Error> {
    if batch.url.trim().is_empty() {
        return Err(Error::InvalidInput("write_multi requires a non-empty url".into()));
    }
    if batch.extracted.is_some() && batch.meta.extraction_prompt.is_none() {
        return Err(Error::InvalidInput(
            "write_multi requires an extraction_prompt when an extracted variant is supplied".into(),
        ));
    }
    Ok(())
}

/// Materialize the up-to-three records of a multi-write, all sharing the
/// batch timestamp so their URIs and recency agree.
pub(crate) fn build_multi_records(
    scheme: &str, batch: &MultiWrite, default_ttl_ms: i64, now: DateTime<Utc>,
) -> (Vec<ResourceRecord>, MultiWriteUris) {
    let ttl_ms = batch.meta.ttl_ms.unwrap_or(default_ttl_ms);

    let make = |resource_type: ResourceType, content: &str, content_type: &str, prompt: Option<String>| {
        let uri = crate::record::build_uri(scheme, resource_type, &batch.url, now);
        ResourceRecord {
            uri,
            url: batch.url.clone(),
            resource_type,
            content: content.to_string(),
            content_type: content_type.to_string(),
            extraction_prompt: prompt,
            ttl_ms,
            size_bytes: content.len() as u64,
            created_at: now,
            last_access: now,
        }
    };

    let raw = make(
        ResourceType::Raw,
        &batch.raw,
        batch.meta.content_type.as_deref().unwrap_or("text/html"),
        None,
    );
    let cleaned = batch
        .cleaned
        .as_deref()
        .map(|c| make(ResourceType::Cleaned, c, "text/markdown", None));
    let extracted = batch
        .extracted
        .as_deref()
        .map(|c| make(ResourceType::Extracted, c, "text/plain", batch.meta.extraction_prompt.clone()));

    let uris = MultiWriteUris {
        raw: raw.uri.clone(),
        cleaned: cleaned.as_ref().map(|r| r.uri.clone()),
        extracted: extracted.as_ref().map(|r| r.uri.clone()),
    };

    let mut records = vec![raw];
    records.extend(cleaned);
    records.extend(extracted);
    (records, uris)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(url: &str, ty: ResourceType, prompt: Option<&str>, created_ms_ago: i64) -> ResourceRecord {
        // Anchored to a fixed instant so equal `created_ms_ago` values yield
        // identical timestamps (the tie the tie-break tests rely on).
        let base = DateTime::from_timestamp(1_714_564_800, 0).unwrap();
        let created = base - chrono::Duration::milliseconds(created_ms_ago);
        ResourceRecord {
            uri: crate::record::build_uri("memory", ty, url, created),
            url: url.to_string(),
            resource_type: ty,
            content: "c".into(),
            content_type: "text/plain".into(),
            extraction_prompt: prompt.map(String::from),
            ttl_ms: 0,
            size_bytes: 1,
            created_at: created,
            last_access: created,
        }
    }

    #[test]
    fn test_select_best_prompt_match_wins() {
        let records = vec![
            record("https://e.com", ResourceType::Cleaned, None, 0),
            record("https://e.com", ResourceType::Extracted, Some("Summarize"), 5_000),
        ];
        let best = select_best(records, Some("Summarize")).unwrap();
        assert_eq!(best.resource_type, ResourceType::Extracted);
    }

    #[test]
    fn test_select_best_unmatched_prompt_falls_back() {
        let records = vec![
            record("https://e.com", ResourceType::Cleaned, None, 0),
            record("https://e.com", ResourceType::Extracted, Some("Summarize"), 0),
        ];
        let best = select_best(records, Some("Other")).unwrap();
        assert_eq!(best.resource_type, ResourceType::Cleaned);
    }

    #[test]
    fn test_select_best_no_prompt_prefers_cleaned_on_tie() {
        let records = vec![
            record("https://e.com", ResourceType::Raw, None, 0),
            record("https://e.com", ResourceType::Cleaned, None, 0),
            record("https://e.com", ResourceType::Extracted, Some("x"), 0),
        ];
        let best = select_best(records, None).unwrap();
        assert_eq!(best.resource_type, ResourceType::Cleaned);
    }

    #[test]
    fn test_select_best_recency_beats_tier() {
        let records = vec![
            record("https://e.com", ResourceType::Cleaned, None, 10_000),
            record("https://e.com", ResourceType::Raw, None, 0),
        ];
        let best = select_best(records, None).unwrap();
        assert_eq!(best.resource_type, ResourceType::Raw);
    }

    #[test]
    fn test_select_best_empty() {
        assert!(select_best(Vec::new(), None).is_none());
    }

    #[test]
    fn test_build_record_prompt_only_on_extracted() {
        let meta = WriteMeta { extraction_prompt: Some("Summarize".into()), ..Default::default() };
        let record = build_record("memory", "https://e.com", "x", &meta, 0).unwrap();
        assert_eq!(record.resource_type, ResourceType::Raw);
        assert!(record.extraction_prompt.is_none());

        let meta = WriteMeta {
            resource_type: Some(ResourceType::Extracted),
            extraction_prompt: Some("Summarize".into()),
            ..Default::default()
        };
        let record = build_record("memory", "https://e.com", "x", &meta, 0).unwrap();
        assert_eq!(record.extraction_prompt.as_deref(), Some("Summarize"));
    }

    #[test]
    fn test_validate_multi_rejects_prompt_gap() {
        let batch = MultiWrite {
            url: "https://e.com".into(),
            raw: "<h1/>".into(),
            cleaned: None,
            extracted: Some("{}".into()),
            meta: WriteMeta::default(),
        };
        assert!(matches!(validate_multi(&batch), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_build_multi_records_share_timestamp() {
        let batch = MultiWrite {
            url: "https://e.com/a".into(),
            raw: "<h1/>".into(),
            cleaned: Some("# A".into()),
            extracted: Some("{}".into()),
            meta: WriteMeta { extraction_prompt: Some("x".into()), ..Default::default() },
        };
        let now = Utc::now();
        let (records, uris) = build_multi_records("memory", &batch, 1_000, now);
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.created_at == now));
        assert!(records.iter().all(|r| r.ttl_ms == 1_000));
        assert!(uris.cleaned.is_some() && uris.extracted.is_some());
        assert!(uris.raw.starts_with("memory://raw/"));
    }
}

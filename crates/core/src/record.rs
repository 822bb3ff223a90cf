//! Resource record model shared by every storage backend.
//!
//! A record is one stored content variant for a source URL: the raw HTML, the
//! cleaned markdown, or an LLM-extracted rendition keyed by its extraction
//! prompt. Backends store and retrieve these records; the types here carry no
//! backend dependencies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which stage of processing a record represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Raw,
    Cleaned,
    Extracted,
}

impl ResourceType {
    /// Tie-break rank for lookups without a specific extraction prompt:
    /// prefer the most human-readable tier. Lower sorts first.
    pub fn priority(self) -> u8 {
        match self {
            ResourceType::Cleaned => 0,
            ResourceType::Extracted => 1,
            ResourceType::Raw => 2,
        }
    }

    /// The tier token used in generated URIs and stored rows.
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceType::Raw => "raw",
            ResourceType::Cleaned => "cleaned",
            ResourceType::Extracted => "extracted",
        }
    }
}

impl std::str::FromStr for ResourceType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "raw" => Ok(ResourceType::Raw),
            "cleaned" => Ok(ResourceType::Cleaned),
            "extracted" => Ok(ResourceType::Extracted),
            other => Err(crate::Error::Decode(format!("unknown resource type: {other}"))),
        }
    }
}

/// One stored content variant.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ResourceRecord {
    /// Unique identifier, `<scheme>://<tier>/<sanitized-url>_<timestamp-ms>`.
    pub uri: String,
    /// The source URL this content was derived from.
    pub url: String,
    pub resource_type: ResourceType,
    pub content: String,
    /// MIME type of `content`, `text/plain` when the writer did not say.
    pub content_type: String,
    /// Present only on `extracted` records: the instruction that produced
    /// this variant. Same URL with a different prompt is a distinct record.
    pub extraction_prompt: Option<String>,
    /// Milliseconds from creation until expiry; 0 means never expires.
    pub ttl_ms: i64,
    /// Byte length of `content`.
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    /// Bumped on every successful read or existence check. Only the memory
    /// backend's LRU eviction consults it.
    pub last_access: DateTime<Utc>,
}

impl ResourceRecord {
    /// Whether this record is logically absent at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.ttl_ms > 0 && (now - self.created_at).num_milliseconds() > self.ttl_ms
    }

    /// The instant at which this record expires, None for immortal records.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        (self.ttl_ms > 0).then(|| self.created_at + chrono::Duration::milliseconds(self.ttl_ms))
    }
}

/// Per-write options; fields not supplied fall back to the defaults above.
#[derive(Debug, Clone, Default)]
pub struct WriteMeta {
    pub resource_type: Option<ResourceType>,
    pub content_type: Option<String>,
    pub extraction_prompt: Option<String>,
    /// None means "use the configured default TTL"; 0 means never expire.
    pub ttl_ms: Option<i64>,
}

/// Input to `write_multi`: up to three variants sharing one URL and one
/// write timestamp.
#[derive(Debug, Clone)]
pub struct MultiWrite {
    pub url: String,
    pub raw: String,
    pub cleaned: Option<String>,
    pub extracted: Option<String>,
    pub meta: WriteMeta,
}

/// URIs created by a `write_multi` call; `cleaned`/`extracted` are present
/// iff the corresponding variant was supplied.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct MultiWriteUris {
    pub raw: String,
    pub cleaned: Option<String>,
    pub extracted: Option<String>,
}

/// Per-record slice of [`CacheStats`].
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct RecordStats {
    pub uri: String,
    pub url: String,
    pub resource_type: ResourceType,
    pub size_bytes: u64,
    pub ttl_ms: i64,
    pub created_at: DateTime<Utc>,
    pub last_access: DateTime<Utc>,
}

/// Aggregate cache view, computed on demand.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct CacheStats {
    pub item_count: u64,
    pub total_size_bytes: u64,
    pub max_items: u64,
    pub max_size_bytes: u64,
    pub default_ttl_ms: i64,
    /// All non-expired records, newest first.
    pub records: Vec<RecordStats>,
}

impl From<&ResourceRecord> for RecordStats {
    fn from(r: &ResourceRecord) -> Self {
        RecordStats {
            uri: r.uri.clone(),
            url: r.url.clone(),
            resource_type: r.resource_type,
            size_bytes: r.size_bytes,
            ttl_ms: r.ttl_ms,
            created_at: r.created_at,
            last_access: r.last_access,
        }
    }
}

/// Build the canonical record URI.
///
/// Shape is a contract consumed by URI-parsing callers:
/// `<scheme>://<tier>/<url-with-scheme-stripped-and-non-alphanumerics-replaced-by-underscore>_<digits-only-ms-timestamp>`.
pub fn build_uri(scheme: &str, resource_type: ResourceType, url: &str, at: DateTime<Utc>) -> String {
    let stripped = url.split_once("://").map_or(url, |(_, rest)| rest);
    let sanitized: String = stripped
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{scheme}://{}/{sanitized}_{}", resource_type.as_str(), at.timestamp_millis())
}

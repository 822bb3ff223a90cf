//! Read-only backend proxying to the remote content-index service.
//!
//! ### Specification
//!
//! - **Endpoints**: `GET <base>/content/<id>` and
//!   `GET <base>/content/by-url?url=<encoded>&limit=<n>`.
//! - **Authentication**: bearer token derived from the configured shared
//!   secret.
//! - **Capability gap**: lookups only. `list`, `write`, `write_multi`,
//!   `delete`, and `stats` fail immediately with `Unsupported`.
//! - **No local caching**: every call is a live round trip; the service
//!   owns retention.

pub mod response;

pub use response::RemoteContentRow;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header;

use webstash_core::record::{CacheStats, MultiWrite, MultiWriteUris, WriteMeta};
use webstash_core::{AppConfig, Error, ResourceRecord, ResourceStore};

/// URI scheme literal for records served by this backend. Unlike the local
/// backends, the remainder is the service's numeric row id, not a tier path.
pub const SCHEME: &str = "remote";

const BACKEND_NAME: &str = "remote";

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Default user agent.
const DEFAULT_USER_AGENT: &str = "webstash/0.1";

/// How many rows a by-url lookup asks for.
const BY_URL_LIMIT: u32 = 20;

/// Remote index client configuration.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Base URL of the index service, no trailing slash.
    pub base_url: String,
    /// Shared secret sent as a bearer token.
    pub api_key: String,
    /// Request timeout (default: 20s).
    pub timeout: Duration,
    /// User-agent string.
    pub user_agent: String,
}

impl RemoteConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Parse a `remote://<numeric-id>` URI.
///
/// A malformed URI is a validation failure, distinct from "not found".
fn parse_remote_uri(uri: &str) -> Result<u64, Error> {
    let rest = uri
        .strip_prefix("remote://")
        .ok_or_else(|| Error::InvalidUri(format!("expected remote://<id>, got {uri}")))?;
    if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::InvalidUri(format!("expected numeric remote id, got {uri}")));
    }
    rest.parse()
        .map_err(|_| Error::InvalidUri(format!("remote id out of range: {uri}")))
}

/// The remote read-only backend.
#[derive(Debug, Clone)]
pub struct RemoteStore {
    http: reqwest::Client,
    config: RemoteConfig,
}

impl RemoteStore {
    /// Create a client for the given index service.
    pub fn new(config: RemoteConfig) -> Result<Self, Error> {
        if config.base_url.is_empty() {
            return Err(Error::Config("remote base URL must not be empty".into()));
        }
        if config.api_key.is_empty() {
            return Err(Error::Config("remote API key must not be empty".into()));
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Unavailable(e.to_string()))?;

        Ok(Self { http, config })
    }

    /// Build from the application config; missing remote settings are a
    /// startup failure, not a silent fallback.
    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let (base_url, api_key) = config.require_remote().map_err(|e| Error::Config(e.to_string()))?;
        let remote = RemoteConfig { timeout: config.timeout(), ..RemoteConfig::new(base_url, api_key) };
        Self::new(remote)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str, not_found: &str) -> Result<T, Error> {
        tracing::debug!(url, "remote index lookup");
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.config.api_key)
            .header(header::ACCEPT, "application/json")
            .header(header::USER_AGENT, &self.config.user_agent)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Unavailable(format!("remote index timed out: {e}"))
                } else {
                    Error::Unavailable(format!("remote index unreachable: {e}"))
                }
            })?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Err(Error::NotFound(not_found.to_string()));
        }
        if !status.is_success() {
            return Err(Error::Http { status: status.as_u16() });
        }

        let bytes = response.bytes().await.map_err(|e| Error::Unavailable(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| Error::Decode(e.to_string()))
    }
}

#[async_trait]
impl ResourceStore for RemoteStore {
    async fn list(&self) -> Result<Vec<ResourceRecord>, Error> {
        Err(Error::unsupported(BACKEND_NAME, "list"))
    }

    async fn read(&self, uri: &str) -> Result<ResourceRecord, Error> {
        let id = parse_remote_uri(uri)?;
        let url = format!("{}/content/{id}", self.config.base_url);
        let row: RemoteContentRow = self.get_json(&url, uri).await?;
        Ok(row.into_record())
    }

    async fn write(&self, _url: &str, _content: &str, _meta: WriteMeta) -> Result<String, Error> {
        Err(Error::unsupported(BACKEND_NAME, "write"))
    }

    async fn write_multi(&self, _batch: MultiWrite) -> Result<MultiWriteUris, Error> {
        Err(Error::unsupported(BACKEND_NAME, "write_multi"))
    }

    async fn exists(&self, uri: &str) -> Result<bool, Error> {
        match self.read(uri).await {
            Ok(_) => Ok(true),
            Err(Error::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn delete(&self, _uri: &str) -> Result<(), Error> {
        Err(Error::unsupported(BACKEND_NAME, "delete"))
    }

    async fn find_by_url(&self, url: &str) -> Result<Vec<ResourceRecord>, Error> {
        let endpoint = format!(
            "{}/content/by-url?url={}&limit={BY_URL_LIMIT}",
            self.config.base_url,
            urlencode(url)
        );
        let rows: Vec<RemoteContentRow> = self.get_json(&endpoint, url).await?;
        let mut records: Vec<ResourceRecord> = rows.into_iter().map(RemoteContentRow::into_record).collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn find_by_url_and_extract(
        &self, url: &str, extraction_prompt: Option<&str>,
    ) -> Result<Option<ResourceRecord>, Error> {
        // The index has no concept of extraction variants; this is a plain
        // URL lookup.
        if extraction_prompt.is_some() {
            tracing::debug!(url, "remote backend ignores extraction prompt filter");
        }
        Ok(self.find_by_url(url).await?.into_iter().next())
    }

    async fn stats(&self) -> Result<CacheStats, Error> {
        Err(Error::unsupported(BACKEND_NAME, "stats"))
    }

    async fn start_cleanup(&self, _interval: Option<Duration>) -> Result<(), Error> {
        // Nothing local to sweep.
        Ok(())
    }

    async fn stop_cleanup(&self) -> Result<(), Error> {
        Ok(())
    }
}

fn urlencode(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> RemoteStore {
        RemoteStore::new(RemoteConfig::new("https://index.example", "secret")).unwrap()
    }

    #[test]
    fn test_parse_remote_uri() {
        assert_eq!(parse_remote_uri("remote://42").unwrap(), 42);
        assert!(matches!(parse_remote_uri("remote://"), Err(Error::InvalidUri(_))));
        assert!(matches!(parse_remote_uri("remote://abc"), Err(Error::InvalidUri(_))));
        assert!(matches!(parse_remote_uri("memory://raw/x_1"), Err(Error::InvalidUri(_))));
    }

    #[tokio::test]
    async fn test_malformed_uri_is_validation_not_lookup() {
        let store = client();
        // Fails before any network round trip.
        let err = store.read("sqlite://raw/x_1").await.unwrap_err();
        assert!(matches!(err, Error::InvalidUri(_)));
    }

    #[tokio::test]
    async fn test_unsupported_operations() {
        let store = client();
        assert!(matches!(store.list().await, Err(Error::Unsupported { op: "list", .. })));
        assert!(matches!(
            store.write("https://e.com", "x", WriteMeta::default()).await,
            Err(Error::Unsupported { op: "write", .. })
        ));
        assert!(matches!(store.delete("remote://1").await, Err(Error::Unsupported { op: "delete", .. })));
        assert!(matches!(store.stats().await, Err(Error::Unsupported { op: "stats", .. })));

        let batch = MultiWrite {
            url: "https://e.com".into(),
            raw: "<h1/>".into(),
            cleaned: None,
            extracted: None,
            meta: WriteMeta::default(),
        };
        assert!(matches!(store.write_multi(batch).await, Err(Error::Unsupported { op: "write_multi", .. })));
    }

    #[tokio::test]
    async fn test_cleanup_is_noop() {
        let store = client();
        store.start_cleanup(None).await.unwrap();
        store.stop_cleanup().await.unwrap();
    }

    #[test]
    fn test_empty_config_rejected() {
        assert!(matches!(
            RemoteStore::new(RemoteConfig::new("", "secret")),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            RemoteStore::new(RemoteConfig::new("https://index.example", "")),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_from_config_requires_remote_settings() {
        let config = AppConfig::default();
        assert!(matches!(RemoteStore::from_config(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_urlencode() {
        assert_eq!(urlencode("https://e.com/a?b=2"), "https%3A%2F%2Fe.com%2Fa%3Fb%3D2");
    }
}

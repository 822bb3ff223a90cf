//! Wire types for the remote content-index service.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use webstash_core::{ResourceRecord, ResourceType};

/// One content row as the index service returns it.
///
/// `GET /content/<id>` returns a single object of this shape;
/// `GET /content/by-url` returns an array of them.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteContentRow {
    pub id: u64,
    #[serde(default)]
    pub url: Option<String>,
    pub markdown: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub content_type: Option<String>,
}

impl RemoteContentRow {
    /// Translate an index row into the shared record shape.
    ///
    /// The service stores cleaned markdown only, so every row maps to a
    /// `cleaned` record with no expiry; the remote side owns retention.
    pub fn into_record(self) -> ResourceRecord {
        let content_type = self.content_type.unwrap_or_else(|| "text/markdown".to_string());
        ResourceRecord {
            uri: format!("{}://{}", super::SCHEME, self.id),
            url: self.url.unwrap_or_default(),
            resource_type: ResourceType::Cleaned,
            size_bytes: self.markdown.len() as u64,
            content: self.markdown,
            content_type,
            extraction_prompt: None,
            ttl_ms: 0,
            created_at: self.created_at,
            last_access: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_to_record() {
        let row: RemoteContentRow = serde_json::from_str(
            r##"{"id": 42, "url": "https://e.com", "markdown": "# Hi", "created_at": "2024-05-01T12:00:00Z"}"##,
        )
        .unwrap();
        let record = row.into_record();
        assert_eq!(record.uri, "remote://42");
        assert_eq!(record.url, "https://e.com");
        assert_eq!(record.resource_type, ResourceType::Cleaned);
        assert_eq!(record.content, "# Hi");
        assert_eq!(record.content_type, "text/markdown");
        assert_eq!(record.ttl_ms, 0);
        assert_eq!(record.size_bytes, 4);
    }

    #[test]
    fn test_row_minimal_fields() {
        let row: RemoteContentRow =
            serde_json::from_str(r#"{"id": 7, "markdown": "x", "created_at": "2024-05-01T12:00:00Z"}"#).unwrap();
        let record = row.into_record();
        assert_eq!(record.url, "");
        assert_eq!(record.uri, "remote://7");
    }
}

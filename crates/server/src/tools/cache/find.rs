//! cache_find tool implementation.
//!
//! Looks up cached content for a URL before the caller decides whether to
//! re-scrape. Without `all`, applies the priority rule: an exact extraction
//! match wins, otherwise the newest record with cleaned content preferred.

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use webstash_core::{Error, ResourceRecord, ResourceStore};

/// Parameters for the cache_find tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheFindParams {
    /// The source URL to look up.
    pub url: String,

    /// Return only a prior extraction produced by this exact instruction,
    /// falling back to the best non-extracted record.
    pub extraction_prompt: Option<String>,

    /// Return every non-expired record for the URL, newest first, instead
    /// of the single best match.
    #[serde(default)]
    pub all: bool,
}

/// Output from the cache_find tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheFindOutput {
    /// Matching records; empty when the URL has never been cached.
    pub records: Vec<ResourceRecord>,
}

/// Implementation of the cache_find tool.
pub async fn find_impl(store: &dyn ResourceStore, params: CacheFindParams) -> Result<CallToolResult, McpError> {
    let records = if params.all {
        store.find_by_url(&params.url).await?
    } else {
        store
            .find_by_url_and_extract(&params.url, params.extraction_prompt.as_deref())
            .await?
            .into_iter()
            .collect()
    };

    let output = CacheFindOutput { records };
    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize records: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}

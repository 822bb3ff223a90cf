//! cache_store tool implementation.
//!
//! Stores scrape output: a single variant, or a raw/cleaned/extracted batch
//! written atomically.

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use webstash_core::record::{MultiWrite, MultiWriteUris, WriteMeta};
use webstash_core::{Error, ResourceStore};

/// Parameters for the cache_store tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheStoreParams {
    /// Source URL the content was scraped from.
    pub url: String,

    /// Raw content variant (HTML as fetched).
    pub raw: String,

    /// Cleaned/markdown variant, if produced.
    pub cleaned: Option<String>,

    /// LLM-extracted variant, if produced. Requires extraction_prompt.
    pub extracted: Option<String>,

    /// The instruction that produced the extracted variant.
    pub extraction_prompt: Option<String>,

    /// TTL in milliseconds; 0 never expires; omitted uses the configured default.
    pub ttl_ms: Option<i64>,

    /// MIME type of the raw variant.
    pub content_type: Option<String>,
}

/// Output from the cache_store tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheStoreOutput {
    pub uris: MultiWriteUris,
}

/// Implementation of the cache_store tool.
pub async fn store_impl(store: &dyn ResourceStore, params: CacheStoreParams) -> Result<CallToolResult, McpError> {
    let meta = WriteMeta {
        resource_type: None,
        content_type: params.content_type,
        extraction_prompt: params.extraction_prompt,
        ttl_ms: params.ttl_ms,
    };

    let uris = if params.cleaned.is_some() || params.extracted.is_some() {
        store
            .write_multi(MultiWrite {
                url: params.url,
                raw: params.raw,
                cleaned: params.cleaned,
                extracted: params.extracted,
                meta,
            })
            .await?
    } else {
        let raw = store.write(&params.url, &params.raw, meta).await?;
        MultiWriteUris { raw, cleaned: None, extracted: None }
    };

    let output = CacheStoreOutput { uris };
    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}

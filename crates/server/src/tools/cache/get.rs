//! cache_get tool implementation.
//!
//! Retrieves a cached record by URI.

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use webstash_core::{Error, ResourceRecord, ResourceStore};

/// Parameters for the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetParams {
    /// The URI of the cached record to retrieve.
    pub uri: String,
}

/// Output from the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetOutput {
    /// The cached record.
    pub record: ResourceRecord,
}

/// Implementation of the cache_get tool.
pub async fn get_impl(store: &dyn ResourceStore, params: CacheGetParams) -> Result<CallToolResult, McpError> {
    let record = store.read(&params.uri).await?;

    let output = CacheGetOutput { record };
    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize record: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use webstash_core::{MemoryStore, WriteMeta};

    #[tokio::test]
    async fn test_get_impl_missing() {
        let store = MemoryStore::new(10, u64::MAX, 0, Duration::from_secs(60));
        let params = CacheGetParams { uri: "memory://raw/nope_1".into() };
        assert!(get_impl(&store, params).await.is_err());
    }

    #[tokio::test]
    async fn test_get_impl_found() {
        let store = MemoryStore::new(10, u64::MAX, 0, Duration::from_secs(60));
        let uri = store.write("https://e.com", "hello", WriteMeta::default()).await.unwrap();

        let result = get_impl(&store, CacheGetParams { uri }).await.unwrap();
        let content_val = serde_json::to_value(&result.content[0]).unwrap();
        let text = content_val.get("text").and_then(|v| v.as_str()).unwrap();
        let output: CacheGetOutput = serde_json::from_str(text).unwrap();
        assert_eq!(output.record.content, "hello");
    }
}

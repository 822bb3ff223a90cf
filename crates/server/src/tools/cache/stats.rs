//! cache_stats tool implementation.
//!
//! Reports the aggregate cache view. Fails with an Unsupported error when
//! the active backend is the remote read-only one.

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use webstash_core::{CacheStats, Error, ResourceStore};

/// Parameters for the cache_stats tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheStatsParams {}

/// Output from the cache_stats tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheStatsOutput {
    pub stats: CacheStats,
}

/// Implementation of the cache_stats tool.
pub async fn stats_impl(store: &dyn ResourceStore, _params: CacheStatsParams) -> Result<CallToolResult, McpError> {
    let stats = store.stats().await?;

    let output = CacheStatsOutput { stats };
    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize stats: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use webstash_core::{MemoryStore, WriteMeta};

    #[tokio::test]
    async fn test_stats_impl() {
        let store = MemoryStore::new(10, u64::MAX, 0, Duration::from_secs(60));
        store.write("https://e.com", "abc", WriteMeta::default()).await.unwrap();

        let result = stats_impl(&store, CacheStatsParams {}).await.unwrap();
        let content_val = serde_json::to_value(&result.content[0]).unwrap();
        let text = content_val.get("text").and_then(|v| v.as_str()).unwrap();
        let output: CacheStatsOutput = serde_json::from_str(text).unwrap();
        assert_eq!(output.stats.item_count, 1);
        assert_eq!(output.stats.total_size_bytes, 3);
    }
}

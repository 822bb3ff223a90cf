//! MCP server handler implementation.
//!
//! This module defines the main server handler that routes tool calls to
//! the appropriate implementations. The storage backend arrives via the
//! constructor, injected once at startup by the factory.

use std::sync::Arc;

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

use webstash_core::ResourceStore;

use crate::tools::cache::{
    CacheFindParams, CacheGetParams, CacheStatsParams, CacheStoreParams, find_impl, get_impl, stats_impl, store_impl,
};

/// The main MCP server handler for webstash.
#[derive(Clone)]
pub struct WebstashServer {
    store: Arc<dyn ResourceStore>,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl WebstashServer {
    /// Create a new server handler over the given storage backend.
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self { store, tool_router: Self::tool_router() }
    }

    #[tool(description = "Store scraped content for a URL: raw HTML plus optional cleaned/extracted variants, \
                          written atomically. Returns the generated URIs.")]
    async fn cache_store(&self, params: Parameters<CacheStoreParams>) -> Result<CallToolResult, McpError> {
        store_impl(self.store.as_ref(), params.0).await
    }

    #[tool(description = "Retrieve a cached record by its URI.")]
    async fn cache_get(&self, params: Parameters<CacheGetParams>) -> Result<CallToolResult, McpError> {
        get_impl(self.store.as_ref(), params.0).await
    }

    #[tool(description = "Find cached content for a URL. Returns the single best match (cleaned preferred, or a \
                          prior extraction matching the prompt), or all records with all=true.")]
    async fn cache_find(&self, params: Parameters<CacheFindParams>) -> Result<CallToolResult, McpError> {
        find_impl(self.store.as_ref(), params.0).await
    }

    #[tool(description = "Report cache statistics: record count, total size, configured limits.")]
    async fn cache_stats(&self, params: Parameters<CacheStatsParams>) -> Result<CallToolResult, McpError> {
        stats_impl(self.store.as_ref(), params.0).await
    }
}

impl ServerHandler for WebstashServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "webstash".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}

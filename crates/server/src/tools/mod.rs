//! MCP tool implementations.
//!
//! This module contains all tools exposed by the webstash server.

pub mod cache;

pub use cache::{CacheFindParams, CacheGetParams, CacheStatsParams, CacheStoreParams};

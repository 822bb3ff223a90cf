//! Cache-related MCP tools.
//!
//! These tools expose the storage contract at the server boundary: store
//! after a fresh scrape, find before deciding whether to re-scrape.

pub mod find;
pub mod get;
pub mod stats;
pub mod store;

pub use find::{CacheFindParams, find_impl};
pub use get::{CacheGetParams, get_impl};
pub use stats::{CacheStatsParams, stats_impl};
pub use store::{CacheStoreParams, store_impl};

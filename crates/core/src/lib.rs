//! Core types and storage backends for webstash.
//!
//! This crate provides:
//! - The resource record model shared by every backend
//! - The storage contract and the memory, filesystem, and SQLite backends
//! - Unified error types
//! - Configuration structures

pub mod config;
pub mod error;
pub mod record;
pub mod storage;

pub use config::{AppConfig, BackendKind};
pub use error::Error;
pub use record::{CacheStats, MultiWrite, MultiWriteUris, ResourceRecord, ResourceType, WriteMeta};
pub use storage::{FilesystemStore, MemoryStore, ResourceStore, SqliteStore};

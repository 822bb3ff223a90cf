//! Remote index client and backend selection for webstash.
//!
//! This crate provides:
//! - The read-only backend proxying the remote content-index service
//! - The factory that selects and memoizes the process-wide backend

pub mod factory;
pub mod remote;

pub use remote::{RemoteConfig, RemoteStore};

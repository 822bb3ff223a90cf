//! Backend selection and lifecycle.
//!
//! Exactly one backend is constructed per process, at first use, and every
//! later call returns the same handle regardless of arguments. Callers
//! receive it once at startup and pass it down; nothing else reaches into
//! this module's state. `reset` exists for test isolation only.

use std::sync::Arc;

use tokio::sync::Mutex;

use webstash_core::{AppConfig, BackendKind, Error, FilesystemStore, MemoryStore, ResourceStore, SqliteStore};

use crate::remote::RemoteStore;

static INSTANCE: Mutex<Option<Arc<dyn ResourceStore>>> = Mutex::const_new(None);

/// The process-wide storage backend, constructed lazily on first call.
///
/// # Errors
///
/// Fails fast when the configuration is invalid or names a backend whose
/// required settings are missing; it never falls back to another backend.
pub async fn backend(config: &AppConfig) -> Result<Arc<dyn ResourceStore>, Error> {
    let mut guard = INSTANCE.lock().await;
    if let Some(store) = guard.as_ref() {
        return Ok(Arc::clone(store));
    }

    let store = build(config).await?;
    *guard = Some(Arc::clone(&store));
    tracing::info!(backend = ?config.backend, "storage backend initialized");
    Ok(store)
}

/// Clear the memoized backend. Test harness use only; production code
/// never tears a backend down before process shutdown.
pub async fn reset() {
    *INSTANCE.lock().await = None;
}

async fn build(config: &AppConfig) -> Result<Arc<dyn ResourceStore>, Error> {
    config.validate().map_err(|e| Error::Config(e.to_string()))?;

    Ok(match config.backend {
        BackendKind::Memory => Arc::new(MemoryStore::from_config(config)),
        BackendKind::Filesystem => Arc::new(FilesystemStore::open(&config.storage_dir, config).await?),
        BackendKind::Durable => Arc::new(SqliteStore::open(&config.db_path, config).await?),
        BackendKind::Remote => Arc::new(RemoteStore::from_config(config)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // The factory memoizes into process-wide state, so the full lifecycle
    // lives in one test to keep parallel test threads out of each other's
    // way.
    #[tokio::test]
    async fn test_factory_lifecycle() {
        reset().await;

        let config = AppConfig::default();
        let first = backend(&config).await.unwrap();

        // Later calls return the same instance regardless of arguments.
        let other_config = AppConfig { max_items: 7, ..Default::default() };
        let second = backend(&other_config).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        // Reset clears the memoized handle; the next call builds fresh.
        reset().await;
        let third = backend(&config).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &third));

        // An invalid selection fails fast instead of falling back.
        reset().await;
        let bad = AppConfig { backend: BackendKind::Remote, ..Default::default() };
        assert!(matches!(backend(&bad).await, Err(Error::Config(_))));

        // A failed build leaves nothing memoized.
        let fs_dir = tempfile::tempdir().unwrap();
        let fs_config = AppConfig {
            backend: BackendKind::Filesystem,
            storage_dir: fs_dir.path().to_path_buf(),
            ..Default::default()
        };
        let fs_store = backend(&fs_config).await.unwrap();
        fs_store.write("https://e.com", "x", Default::default()).await.unwrap();

        reset().await;
    }
}

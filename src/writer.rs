//! Sync Writer: read-merge-write of one collection snapshot.
//!
//! Every job re-fetches the current remote document, replaces exactly one
//! key, and writes the whole document back. The writer itself makes no
//! concurrency guarantees; jobs must arrive through the session's
//! single-consumer queue so only one read-merge-write is in flight per
//! session at a time.

use tokio::time::timeout;

use crate::config::SyncConfig;
use crate::document::{Document, Record};
use crate::error::SyncError;
use crate::remote::{DocumentHandle, ObjectStore};

/// Persists one collection snapshot, retrying transient failures with
/// bounded exponential backoff. `AuthExpired` and `CorruptStore` are
/// returned immediately.
pub(crate) async fn persist(
    store: &dyn ObjectStore,
    handle: &DocumentHandle,
    collection: &str,
    records: &[Record],
    config: &SyncConfig,
) -> Result<(), SyncError> {
    let mut attempt = 0;
    loop {
        match persist_once(store, handle, collection, records, config).await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_retryable() && attempt < config.max_write_retries => {
                attempt += 1;
                tracing::warn!(
                    collection,
                    attempt,
                    error = %e,
                    "persist failed, retrying"
                );
                tokio::time::sleep(config.retry_delay(attempt)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn persist_once(
    store: &dyn ObjectStore,
    handle: &DocumentHandle,
    collection: &str,
    records: &[Record],
    config: &SyncConfig,
) -> Result<(), SyncError> {
    // Always merge against the latest remote content, never a cached
    // snapshot, so sibling collections written since our last read survive.
    let bytes = timeout(config.request_timeout(), store.read_file(&handle.file_id))
        .await
        .map_err(|_| SyncError::SyncFailed("document read timed out".to_string()))??;

    let mut document = Document::parse(&bytes)?;
    document.set_records(collection, records)?;

    timeout(
        config.request_timeout(),
        store.replace_file(&handle.file_id, &document.to_bytes()?),
    )
    .await
    .map_err(|_| SyncError::SyncFailed("document write timed out".to_string()))??;

    tracing::debug!(collection, records = records.len(), "collection persisted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Record;
    use crate::remote::MemoryObjectStore;
    use serde_json::json;
    use std::time::Duration;

    fn record(id: &str, title: &str) -> Record {
        match json!({"title": title}) {
            serde_json::Value::Object(fields) => Record::with_id(id, fields),
            _ => unreachable!(),
        }
    }

    fn fast_config() -> SyncConfig {
        SyncConfig {
            retry_base_delay_ms: 1,
            ..SyncConfig::default()
        }
    }

    fn handle_for(store: &MemoryObjectStore, content: &[u8]) -> DocumentHandle {
        let file_id = store.seed_file("ClassDesk", "teacher1.json", content);
        DocumentHandle {
            folder_id: "folder-0".to_string(),
            file_id,
        }
    }

    #[tokio::test]
    async fn test_persist_preserves_sibling_collections() {
        let store = MemoryObjectStore::new();
        let handle = handle_for(&store, br#"{"events_X":[{"id":"e1","title":"Y"}]}"#);

        persist(
            &store,
            &handle,
            "todos_X",
            &[record("t1", "X")],
            &fast_config(),
        )
        .await
        .unwrap();

        let bytes = store.file_content("teacher1.json").unwrap();
        let document = Document::parse(&bytes).unwrap();
        assert_eq!(document.records("events_X").unwrap()[0].id, "e1");
        assert_eq!(document.records("todos_X").unwrap()[0].id, "t1");
    }

    #[tokio::test]
    async fn test_persist_retries_transient_failures() {
        let store = MemoryObjectStore::new();
        let handle = handle_for(&store, b"{}");
        store.inject_read_failures(2);

        persist(
            &store,
            &handle,
            "tasks_1",
            &[record("t1", "grade homework")],
            &fast_config(),
        )
        .await
        .unwrap();

        let bytes = store.file_content("teacher1.json").unwrap();
        let document = Document::parse(&bytes).unwrap();
        assert_eq!(document.records("tasks_1").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_persist_gives_up_after_retry_bound() {
        let store = MemoryObjectStore::new();
        let handle = handle_for(&store, b"{}");
        store.inject_write_failures(10);

        let config = SyncConfig {
            max_write_retries: 2,
            retry_base_delay_ms: 1,
            ..SyncConfig::default()
        };
        let err = persist(&store, &handle, "tasks_1", &[], &config)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::SyncFailed(_)));
        // Initial attempt plus two retries read the document three times
        assert_eq!(store.read_count(), 3);
    }

    #[tokio::test]
    async fn test_persist_does_not_retry_corrupt_document() {
        let store = MemoryObjectStore::new();
        let handle = handle_for(&store, b"not-json{");

        let err = persist(&store, &handle, "tasks_1", &[], &fast_config())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::CorruptStore(_)));
        assert_eq!(store.read_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persist_read_timeout_is_sync_failed() {
        let store = MemoryObjectStore::new();
        let handle = handle_for(&store, b"{}");
        store.set_read_delay(Duration::from_millis(2500));

        let config = SyncConfig {
            request_timeout_secs: 1,
            max_write_retries: 0,
            retry_base_delay_ms: 1,
            ..SyncConfig::default()
        };
        let err = persist(&store, &handle, "tasks_1", &[], &config)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SyncError::SyncFailed("document read timed out".to_string())
        );
    }

    #[tokio::test]
    async fn test_persist_does_not_retry_auth_expiry() {
        let store = MemoryObjectStore::new();
        let handle = handle_for(&store, b"{}");
        store.set_auth_expired(true);

        let err = persist(&store, &handle, "tasks_1", &[], &fast_config())
            .await
            .unwrap_err();
        assert_eq!(err, SyncError::AuthExpired);
    }
}

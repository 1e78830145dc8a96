//! Sync engine error types.

use thiserror::Error;

/// Errors that can occur while resolving, loading, or persisting the
/// remote document.
///
/// Variants are `Clone` so they can be carried on the session event
/// channel; causes from remote libraries are stringified at the boundary.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    /// Bearer credential rejected by the storage backend. The caller must
    /// re-authenticate; the engine never retries these.
    #[error("authorization expired; re-authentication required")]
    AuthExpired,

    /// A remote folder or file was not found. Normally resolved by
    /// creating the missing entry, so this rarely reaches callers.
    #[error("remote folder or file missing: {0}")]
    FolderOrFileMissing(String),

    /// The remote document content is not a JSON object. Fatal for the
    /// session: further writes are blocked until the remote file is
    /// repaired out of band.
    #[error("remote document is corrupt: {0}")]
    CorruptStore(String),

    /// Transient network or write failure. Retryable with bounded backoff;
    /// the local cache is unaffected.
    #[error("sync failed: {0}")]
    SyncFailed(String),

    /// A mutation targeted a record id that is not in the collection.
    #[error("no record with id {0}")]
    NotFound(String),
}

impl SyncError {
    /// Whether the writer may retry the failed operation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::SyncFailed(_) | SyncError::FolderOrFileMissing(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(SyncError::SyncFailed("timeout".into()).is_retryable());
        assert!(SyncError::FolderOrFileMissing("file".into()).is_retryable());
        assert!(!SyncError::AuthExpired.is_retryable());
        assert!(!SyncError::CorruptStore("not-json{".into()).is_retryable());
        assert!(!SyncError::NotFound("abc".into()).is_retryable());
    }

    #[test]
    fn test_display_mentions_cause() {
        let err = SyncError::SyncFailed("connection reset".into());
        assert!(err.to_string().contains("connection reset"));
    }
}

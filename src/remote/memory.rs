//! In-memory object storage, used as the test backend and for offline
//! development. Supports injecting transient failures, credential expiry,
//! and read latency to exercise the engine's retry and cancellation paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{ObjectStore, RemoteFile, RemoteId};
use crate::error::SyncError;

#[derive(Debug, Clone)]
struct FileEntry {
    folder_id: RemoteId,
    name: String,
    content: Vec<u8>,
}

#[derive(Debug, Default)]
struct Inner {
    folders: HashMap<RemoteId, String>,
    files: HashMap<RemoteId, FileEntry>,
    read_delay: Option<Duration>,
}

/// Map-backed [`ObjectStore`] implementation.
#[derive(Default)]
pub struct MemoryObjectStore {
    inner: Mutex<Inner>,
    next_id: AtomicU64,
    fail_reads: AtomicU32,
    fail_writes: AtomicU32,
    auth_expired: AtomicBool,
    folder_lookups: AtomicU32,
    reads: AtomicU32,
    writes: AtomicU32,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&self, prefix: &str) -> RemoteId {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", prefix, n)
    }

    fn check_auth(&self) -> Result<(), SyncError> {
        if self.auth_expired.load(Ordering::Relaxed) {
            Err(SyncError::AuthExpired)
        } else {
            Ok(())
        }
    }

    fn take_injected_failure(&self, counter: &AtomicU32, what: &str) -> Result<(), SyncError> {
        loop {
            let remaining = counter.load(Ordering::Relaxed);
            if remaining == 0 {
                return Ok(());
            }
            if counter
                .compare_exchange(remaining, remaining - 1, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                return Err(SyncError::SyncFailed(format!("injected {} failure", what)));
            }
        }
    }

    async fn apply_read_delay(&self) {
        let delay = self.inner.lock().unwrap().read_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    /// Makes the next `n` reads fail with [`SyncError::SyncFailed`].
    pub fn inject_read_failures(&self, n: u32) {
        self.fail_reads.store(n, Ordering::Relaxed);
    }

    /// Makes the next `n` writes fail with [`SyncError::SyncFailed`].
    pub fn inject_write_failures(&self, n: u32) {
        self.fail_writes.store(n, Ordering::Relaxed);
    }

    /// Toggles credential expiry: while set, every call fails with
    /// [`SyncError::AuthExpired`].
    pub fn set_auth_expired(&self, expired: bool) {
        self.auth_expired.store(expired, Ordering::Relaxed);
    }

    /// Delays every read by the given duration.
    pub fn set_read_delay(&self, delay: Duration) {
        self.inner.lock().unwrap().read_delay = Some(delay);
    }

    /// Seeds a folder and file directly, returning the file id.
    pub fn seed_file(&self, folder_name: &str, file_name: &str, content: &[u8]) -> RemoteId {
        let folder_id = self.allocate_id("folder");
        let file_id = self.allocate_id("file");
        let mut inner = self.inner.lock().unwrap();
        inner.folders.insert(folder_id.clone(), folder_name.to_string());
        inner.files.insert(
            file_id.clone(),
            FileEntry {
                folder_id,
                name: file_name.to_string(),
                content: content.to_vec(),
            },
        );
        file_id
    }

    /// Returns the content of the first file with this name, if any.
    pub fn file_content(&self, file_name: &str) -> Option<Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        inner
            .files
            .values()
            .find(|f| f.name == file_name)
            .map(|f| f.content.clone())
    }

    /// Overwrites a file's content directly, bypassing the store contract.
    pub fn overwrite_content(&self, file_id: &str, content: &[u8]) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.files.get_mut(file_id) {
            entry.content = content.to_vec();
        }
    }

    /// Number of folder lookups served.
    pub fn folder_lookup_count(&self) -> u32 {
        self.folder_lookups.load(Ordering::Relaxed)
    }

    /// Number of file reads served.
    pub fn read_count(&self) -> u32 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Number of file replaces served.
    pub fn write_count(&self) -> u32 {
        self.writes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn find_folder(&self, name: &str) -> Result<Option<RemoteId>, SyncError> {
        self.check_auth()?;
        self.folder_lookups.fetch_add(1, Ordering::Relaxed);
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .folders
            .iter()
            .find(|(_, folder_name)| folder_name.as_str() == name)
            .map(|(id, _)| id.clone()))
    }

    async fn create_folder(&self, name: &str) -> Result<RemoteId, SyncError> {
        self.check_auth()?;
        let id = self.allocate_id("folder");
        self.inner
            .lock()
            .unwrap()
            .folders
            .insert(id.clone(), name.to_string());
        Ok(id)
    }

    async fn find_file(
        &self,
        folder_id: &str,
        name: &str,
    ) -> Result<Option<RemoteId>, SyncError> {
        self.check_auth()?;
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .files
            .iter()
            .find(|(_, f)| f.folder_id == folder_id && f.name == name)
            .map(|(id, _)| id.clone()))
    }

    async fn create_file(
        &self,
        folder_id: &str,
        name: &str,
        content: &[u8],
    ) -> Result<RemoteId, SyncError> {
        self.check_auth()?;
        let id = self.allocate_id("file");
        self.inner.lock().unwrap().files.insert(
            id.clone(),
            FileEntry {
                folder_id: folder_id.to_string(),
                name: name.to_string(),
                content: content.to_vec(),
            },
        );
        Ok(id)
    }

    async fn read_file(&self, file_id: &str) -> Result<Vec<u8>, SyncError> {
        self.check_auth()?;
        self.take_injected_failure(&self.fail_reads, "read")?;
        self.apply_read_delay().await;
        self.reads.fetch_add(1, Ordering::Relaxed);
        let inner = self.inner.lock().unwrap();
        inner
            .files
            .get(file_id)
            .map(|f| f.content.clone())
            .ok_or_else(|| SyncError::FolderOrFileMissing(file_id.to_string()))
    }

    async fn replace_file(&self, file_id: &str, content: &[u8]) -> Result<(), SyncError> {
        self.check_auth()?;
        self.take_injected_failure(&self.fail_writes, "write")?;
        self.writes.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.inner.lock().unwrap();
        let entry = inner
            .files
            .get_mut(file_id)
            .ok_or_else(|| SyncError::FolderOrFileMissing(file_id.to_string()))?;
        entry.content = content.to_vec();
        Ok(())
    }

    async fn list_files(&self, folder_id: &str) -> Result<Vec<RemoteFile>, SyncError> {
        self.check_auth()?;
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .files
            .iter()
            .filter(|(_, f)| f.folder_id == folder_id)
            .map(|(id, f)| RemoteFile {
                id: id.clone(),
                name: f.name.clone(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_folder_and_file_lifecycle() {
        let store = MemoryObjectStore::new();

        assert!(store.find_folder("ClassDesk").await.unwrap().is_none());
        let folder_id = store.create_folder("ClassDesk").await.unwrap();
        assert_eq!(
            store.find_folder("ClassDesk").await.unwrap(),
            Some(folder_id.clone())
        );

        let file_id = store
            .create_file(&folder_id, "teacher1.json", b"{}")
            .await
            .unwrap();
        assert_eq!(
            store.find_file(&folder_id, "teacher1.json").await.unwrap(),
            Some(file_id.clone())
        );
        assert_eq!(store.read_file(&file_id).await.unwrap(), b"{}");

        store.replace_file(&file_id, b"{\"a\":[]}").await.unwrap();
        assert_eq!(store.read_file(&file_id).await.unwrap(), b"{\"a\":[]}");

        let files = store.list_files(&folder_id).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "teacher1.json");
    }

    #[tokio::test]
    async fn test_read_of_missing_file() {
        let store = MemoryObjectStore::new();
        let err = store.read_file("file-99").await.unwrap_err();
        assert!(matches!(err, SyncError::FolderOrFileMissing(_)));
    }

    #[tokio::test]
    async fn test_injected_failures_are_transient() {
        let store = MemoryObjectStore::new();
        let file_id = store.seed_file("ClassDesk", "t.json", b"{}");

        store.inject_read_failures(2);
        assert!(store.read_file(&file_id).await.is_err());
        assert!(store.read_file(&file_id).await.is_err());
        assert!(store.read_file(&file_id).await.is_ok());
    }

    #[tokio::test]
    async fn test_auth_expiry_blocks_all_calls() {
        let store = MemoryObjectStore::new();
        store.set_auth_expired(true);
        assert_eq!(
            store.find_folder("ClassDesk").await.unwrap_err(),
            SyncError::AuthExpired
        );
        store.set_auth_expired(false);
        assert!(store.find_folder("ClassDesk").await.is_ok());
    }
}

//! Object storage abstraction consumed by the sync engine.
//!
//! The engine never talks HTTP directly; it goes through [`ObjectStore`],
//! which models the small slice of an object-storage API it needs:
//! find-or-create of folders and files, whole-file reads, and whole-file
//! replaces. There is no partial-patch primitive, which is why the sync
//! writer always rewrites the full document.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::SyncError;

pub mod http;
pub mod memory;

pub use http::{HttpObjectStore, StaticTokenSource};
pub use memory::MemoryObjectStore;

/// Opaque identifier of a remote folder or file.
pub type RemoteId = String;

/// The resolved location of the backing document file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentHandle {
    pub folder_id: RemoteId,
    pub file_id: RemoteId,
}

/// A file entry returned by [`ObjectStore::list_files`].
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteFile {
    pub id: RemoteId,
    pub name: String,
}

/// Supplies the bearer credential for remote calls. Credentials may expire;
/// an expired one surfaces as [`SyncError::AuthExpired`] from the store.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn bearer_token(&self) -> Result<String, SyncError>;
}

/// The object-storage operations the engine consumes.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Finds a folder by exact name, returning its id if present.
    async fn find_folder(&self, name: &str) -> Result<Option<RemoteId>, SyncError>;

    /// Creates a folder with the given name.
    async fn create_folder(&self, name: &str) -> Result<RemoteId, SyncError>;

    /// Finds a file by exact name within a folder.
    async fn find_file(
        &self,
        folder_id: &str,
        name: &str,
    ) -> Result<Option<RemoteId>, SyncError>;

    /// Creates a file within a folder with the given initial content.
    async fn create_file(
        &self,
        folder_id: &str,
        name: &str,
        content: &[u8],
    ) -> Result<RemoteId, SyncError>;

    /// Reads a file's full content.
    async fn read_file(&self, file_id: &str) -> Result<Vec<u8>, SyncError>;

    /// Replaces a file's full content.
    async fn replace_file(&self, file_id: &str, content: &[u8]) -> Result<(), SyncError>;

    /// Lists the files in a folder.
    async fn list_files(&self, folder_id: &str) -> Result<Vec<RemoteFile>, SyncError>;
}

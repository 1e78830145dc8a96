//! Document Locator: find-or-create of the backing document file.

use crate::error::SyncError;
use crate::remote::{DocumentHandle, ObjectStore};

/// Empty-object seed written into a freshly created document file.
const EMPTY_DOCUMENT: &[u8] = b"{}";

/// Resolves the single backing file that holds all collections for one
/// user scope. The folder name is fixed per deployment; the file name is
/// derived from the user scope.
#[derive(Debug, Clone)]
pub struct DocumentLocator {
    folder_name: String,
    file_name: String,
}

impl DocumentLocator {
    /// Creates a locator for the given folder and user scope.
    pub fn new(folder_name: impl Into<String>, user_scope: &str) -> Self {
        Self {
            folder_name: folder_name.into(),
            file_name: format!("{}.json", user_scope),
        }
    }

    /// The backing file name for this user scope.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Idempotently finds or creates the folder and backing file.
    ///
    /// New files are seeded with an empty JSON object so a fresh account
    /// starts from the empty document. Credential failures surface as
    /// [`SyncError::AuthExpired`]; callers own re-authentication.
    pub async fn resolve(&self, store: &dyn ObjectStore) -> Result<DocumentHandle, SyncError> {
        let folder_id = match store.find_folder(&self.folder_name).await? {
            Some(id) => id,
            None => {
                tracing::debug!(folder = %self.folder_name, "creating backing folder");
                store.create_folder(&self.folder_name).await?
            }
        };

        let file_id = match store.find_file(&folder_id, &self.file_name).await? {
            Some(id) => id,
            None => {
                tracing::debug!(file = %self.file_name, "seeding backing document");
                store
                    .create_file(&folder_id, &self.file_name, EMPTY_DOCUMENT)
                    .await?
            }
        };

        Ok(DocumentHandle { folder_id, file_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryObjectStore;

    #[tokio::test]
    async fn test_resolve_creates_folder_and_seeded_file() {
        let store = MemoryObjectStore::new();
        let locator = DocumentLocator::new("ClassDesk", "teacher1");

        let handle = locator.resolve(&store).await.unwrap();

        assert_eq!(
            store.find_folder("ClassDesk").await.unwrap(),
            Some(handle.folder_id.clone())
        );
        assert_eq!(store.read_file(&handle.file_id).await.unwrap(), b"{}");
    }

    #[tokio::test]
    async fn test_resolve_is_idempotent() {
        let store = MemoryObjectStore::new();
        let locator = DocumentLocator::new("ClassDesk", "teacher1");

        let first = locator.resolve(&store).await.unwrap();
        let second = locator.resolve(&store).await.unwrap();

        assert_eq!(first, second);
        // No duplicate file appears in the folder
        assert_eq!(store.list_files(&first.folder_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_does_not_reseed_existing_file() {
        let store = MemoryObjectStore::new();
        store.seed_file("ClassDesk", "teacher1.json", b"{\"tasks_1\":[]}");
        let locator = DocumentLocator::new("ClassDesk", "teacher1");

        let handle = locator.resolve(&store).await.unwrap();
        assert_eq!(
            store.read_file(&handle.file_id).await.unwrap(),
            b"{\"tasks_1\":[]}"
        );
    }

    #[tokio::test]
    async fn test_resolve_surfaces_auth_expiry() {
        let store = MemoryObjectStore::new();
        store.set_auth_expired(true);
        let locator = DocumentLocator::new("ClassDesk", "teacher1");

        let err = locator.resolve(&store).await.unwrap_err();
        assert_eq!(err, SyncError::AuthExpired);
    }
}

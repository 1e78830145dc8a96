//! ClassDesk Sync
//!
//! Synchronization engine for the ClassDesk teacher dashboard. All
//! persistent state (student rosters, behavior logs, schedules, tasks)
//! lives in one remote JSON file in object storage; this crate turns
//! that single document into independent, CRUD-capable collections that
//! many parts of the dashboard can use concurrently.
//!
//! The pieces:
//!
//! - [`remote::ObjectStore`] — the consumed object-storage contract,
//!   with an HTTP implementation and an in-memory one for tests.
//! - [`DocumentLocator`] — find-or-create of the backing file.
//! - [`SessionContext`] — per-session shared state and the
//!   single-consumer write queue that serializes every remote write.
//! - [`CollectionStore`] — the per-collection CRUD handle with an
//!   optimistic local cache.
//!
//! ```no_run
//! use std::sync::Arc;
//! use classdesk_sync::{CollectionStore, SessionContext, SyncConfig};
//! use classdesk_sync::remote::{HttpObjectStore, StaticTokenSource};
//!
//! # async fn example() -> Result<(), classdesk_sync::SyncError> {
//! let config = SyncConfig::default();
//! let storage = HttpObjectStore::new(
//!     "https://storage.example.com/api",
//!     Arc::new(StaticTokenSource::new("token")),
//!     &config,
//! )?;
//! let session = SessionContext::new(Arc::new(storage), "teacher1", config);
//!
//! let students = CollectionStore::new(session.clone(), "students_5B");
//! students.init().await?;
//! students.add(serde_json::Map::new())?;
//! students.flush().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod document;
pub mod error;
pub mod locator;
pub mod remote;
pub mod session;
pub mod store;

mod writer;

pub use config::{ConfigError, SyncConfig};
pub use document::{new_record_id, Document, Fields, Record};
pub use error::SyncError;
pub use locator::DocumentLocator;
pub use remote::{DocumentHandle, ObjectStore, RemoteFile, RemoteId, TokenSource};
pub use session::{SessionContext, SyncEvent, SyncEventKind};
pub use store::{CollectionStore, NaturalKeyFn, StoreState};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}

//! Collection Store: the per-collection CRUD handle.
//!
//! Each store owns an optimistic in-memory cache of one collection's
//! records. Every mutation applies to the cache first and queues a
//! snapshot of the whole collection onto the session's write queue; the
//! snapshot is taken while the cache lock is held, so the order of
//! persisted snapshots always matches the order mutations were applied.
//!
//! A failed remote persist never rolls the cache back: for the running
//! session the local state stays authoritative, and the failure is
//! surfaced on the session's event channel as "not yet saved remotely".

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tokio::time::timeout;

use crate::document::{Document, Fields, Record};
use crate::error::SyncError;
use crate::session::SessionContext;

/// Lifecycle of a collection store.
///
/// `Error` is re-enterable: calling [`CollectionStore::init`] again
/// retries the load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    Uninitialized,
    Loading,
    Ready,
    Error,
}

/// Derives a duplicate-detection key from a record's domain-identifying
/// fields (for a roster import, something like grade + section + roll
/// number). Records whose key matches an existing record are skipped by
/// [`CollectionStore::add_many`]. Returning `None` opts the record out of
/// deduplication.
pub type NaturalKeyFn = dyn Fn(&Record) -> Option<String> + Send + Sync;

struct Inner {
    state: StoreState,
    records: Vec<Record>,
}

/// CRUD handle for one named collection inside the shared document.
pub struct CollectionStore {
    session: Arc<SessionContext>,
    name: String,
    natural_key: Option<Arc<NaturalKeyFn>>,
    inner: Mutex<Inner>,
}

impl CollectionStore {
    /// Creates a store for the named collection. `add_many` will not
    /// deduplicate; use [`CollectionStore::with_natural_key`] for imports.
    pub fn new(session: Arc<SessionContext>, name: impl Into<String>) -> Self {
        Self {
            session,
            name: name.into(),
            natural_key: None,
            inner: Mutex::new(Inner {
                state: StoreState::Uninitialized,
                records: Vec::new(),
            }),
        }
    }

    /// Creates a store whose `add_many` deduplicates by the given
    /// natural-key function.
    pub fn with_natural_key<F>(
        session: Arc<SessionContext>,
        name: impl Into<String>,
        natural_key: F,
    ) -> Self
    where
        F: Fn(&Record) -> Option<String> + Send + Sync + 'static,
    {
        let mut store = Self::new(session, name);
        store.natural_key = Some(Arc::new(natural_key));
        store
    }

    /// The collection name, a key of the shared document.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> StoreState {
        self.inner.lock().unwrap().state
    }

    /// The current cached records.
    ///
    /// Always an array: before the store is `Ready` this is empty, so
    /// callers cannot distinguish "empty collection" from "still loading"
    /// by the data alone. Check [`CollectionStore::state`] when the
    /// difference matters.
    pub fn data(&self) -> Vec<Record> {
        self.inner.lock().unwrap().records.clone()
    }

    /// Loads this collection's slice of the remote document.
    ///
    /// Transient failures are retried with the configured backoff before
    /// giving up. On failure the store enters `Error` with an empty cache
    /// and `init` may be called again; `AuthExpired` is returned without
    /// retry so the caller can prompt for re-authentication.
    ///
    /// If the document has no entry for this collection yet, the key is
    /// materialized remotely as an empty array.
    ///
    /// Dropping the returned future mid-load discards the pending result;
    /// nothing is applied to the cache and the store can be initialized
    /// again later.
    pub async fn init(&self) -> Result<(), SyncError> {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.state == StoreState::Ready {
                return Ok(());
            }
            inner.state = StoreState::Loading;
        }

        let config = self.session.config().clone();
        let mut attempt = 0;
        let (records, key_present) = loop {
            match self.load().await {
                Ok(loaded) => break loaded,
                Err(e) if e.is_retryable() && attempt < config.max_write_retries => {
                    attempt += 1;
                    tracing::warn!(
                        collection = %self.name,
                        attempt,
                        error = %e,
                        "load failed, retrying"
                    );
                    tokio::time::sleep(config.retry_delay(attempt)).await;
                }
                Err(e) => {
                    tracing::warn!(collection = %self.name, error = %e, "load failed");
                    self.inner.lock().unwrap().state = StoreState::Error;
                    return Err(e);
                }
            }
        };

        let mut inner = self.inner.lock().unwrap();
        inner.records = records;
        inner.state = StoreState::Ready;
        if !key_present {
            // A fresh document gets this collection's key right away
            self.session.enqueue(&self.name, inner.records.clone())?;
        }
        Ok(())
    }

    async fn load(&self) -> Result<(Vec<Record>, bool), SyncError> {
        let handle = self.session.resolve().await?;
        let bytes = timeout(
            self.session.config().request_timeout(),
            self.session.store().read_file(&handle.file_id),
        )
        .await
        .map_err(|_| SyncError::SyncFailed("document read timed out".to_string()))??;

        let document = Document::parse(&bytes)?;
        let key_present = document.contains(&self.name);
        Ok((document.records(&self.name)?, key_present))
    }

    /// Appends a record with a freshly generated id and returns the id.
    pub fn add(&self, fields: Fields) -> Result<String, SyncError> {
        let record = Record::new(fields);
        let id = record.id.clone();
        let mut inner = self.inner.lock().unwrap();
        inner.records.push(record);
        self.session.enqueue(&self.name, inner.records.clone())?;
        Ok(id)
    }

    /// Appends a batch of records, skipping those whose natural key
    /// matches an existing record, and returns the number inserted.
    /// Re-running the same import therefore creates no duplicates. The
    /// whole batch results in a single queued write.
    pub fn add_many(&self, batch: Vec<Fields>) -> Result<usize, SyncError> {
        let mut inner = self.inner.lock().unwrap();

        let mut seen: HashSet<String> = match &self.natural_key {
            Some(key_fn) => inner.records.iter().filter_map(|r| key_fn(r)).collect(),
            None => HashSet::new(),
        };

        let mut inserted = 0;
        for fields in batch {
            let record = Record::new(fields);
            if let Some(key_fn) = &self.natural_key {
                if let Some(key) = key_fn(&record) {
                    if !seen.insert(key) {
                        continue;
                    }
                }
            }
            inner.records.push(record);
            inserted += 1;
        }

        if inserted > 0 {
            self.session.enqueue(&self.name, inner.records.clone())?;
        }
        Ok(inserted)
    }

    /// Shallow-merges a partial patch into the record with this id.
    pub fn update(&self, id: &str, patch: Fields) -> Result<(), SyncError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.records.iter_mut().find(|r| r.id == id) {
            Some(record) => record.merge(&patch),
            None => return Err(SyncError::NotFound(id.to_string())),
        }
        self.session.enqueue(&self.name, inner.records.clone())
    }

    /// Applies a batch of patches in one pass and queues a single write.
    /// Patches whose id is absent are skipped.
    pub fn update_many(&self, patches: Vec<(String, Fields)>) -> Result<(), SyncError> {
        let mut inner = self.inner.lock().unwrap();
        let mut changed = false;
        for (id, patch) in &patches {
            if let Some(record) = inner.records.iter_mut().find(|r| &r.id == id) {
                record.merge(patch);
                changed = true;
            }
        }
        if changed {
            self.session.enqueue(&self.name, inner.records.clone())?;
        }
        Ok(())
    }

    /// Replaces the whole collection, bypassing per-record merging.
    pub fn set_all(&self, records: Vec<Record>) -> Result<(), SyncError> {
        let mut inner = self.inner.lock().unwrap();
        inner.records = records;
        self.session.enqueue(&self.name, inner.records.clone())
    }

    /// Removes the record with this id. A missing id is a no-op: no
    /// error, and nothing is queued.
    pub fn remove(&self, id: &str) -> Result<(), SyncError> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.records.len();
        inner.records.retain(|r| r.id != id);
        if inner.records.len() == before {
            return Ok(());
        }
        self.session.enqueue(&self.name, inner.records.clone())
    }

    /// Waits until every write queued so far (by any store of this
    /// session) has settled.
    pub async fn flush(&self) -> Result<(), SyncError> {
        self.session.flush().await
    }
}

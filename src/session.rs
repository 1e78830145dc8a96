//! Per-session context shared by every collection store.
//!
//! One `SessionContext` is constructed per signed-in user and passed to
//! every [`CollectionStore`](crate::store::CollectionStore). It owns the
//! resolved document location, the corrupt-store poison flag, the sync
//! event channel, and the write queue.
//!
//! The queue is the concurrency discipline for the whole session: every
//! collection store independently performs read-merge-write against the
//! same remote file, so two unserialized writes can interleave and revert
//! each other's keys. A single consumer task drains persist jobs in
//! arrival order, keeping exactly one read-merge-write in flight at a
//! time across all collections.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, oneshot, OnceCell};

use crate::config::SyncConfig;
use crate::document::Record;
use crate::error::SyncError;
use crate::locator::DocumentLocator;
use crate::remote::{DocumentHandle, ObjectStore};
use crate::writer;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Outcome of a queued persist, surfaced without blocking mutations.
#[derive(Debug, Clone)]
pub struct SyncEvent {
    /// Collection the job belonged to.
    pub collection: String,
    pub kind: SyncEventKind,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum SyncEventKind {
    /// The snapshot landed remotely (possibly after retries).
    Persisted,
    /// The snapshot could not be persisted. The local cache keeps the
    /// optimistic change; it is "not yet saved remotely", not lost.
    Failed(SyncError),
}

enum Job {
    Persist {
        collection: String,
        records: Vec<Record>,
    },
    /// Queue barrier: acknowledged once every earlier job has settled.
    Flush(oneshot::Sender<()>),
}

/// Shared per-session state. Construct once per signed-in user, inside a
/// tokio runtime, and hand an `Arc` to every collection store.
pub struct SessionContext {
    store: Arc<dyn ObjectStore>,
    config: SyncConfig,
    locator: DocumentLocator,
    handle: Arc<OnceCell<DocumentHandle>>,
    queue: mpsc::UnboundedSender<Job>,
    events: broadcast::Sender<SyncEvent>,
    poisoned: Arc<AtomicBool>,
}

impl SessionContext {
    /// Creates the session context and spawns its write-queue consumer.
    ///
    /// The consumer exits once the context (and with it the queue sender)
    /// is dropped and the remaining jobs have drained.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        user_scope: &str,
        config: SyncConfig,
    ) -> Arc<Self> {
        let locator = DocumentLocator::new(config.folder_name.clone(), user_scope);
        let handle = Arc::new(OnceCell::new());
        let poisoned = Arc::new(AtomicBool::new(false));
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (queue, receiver) = mpsc::unbounded_channel();

        let consumer = QueueConsumer {
            store: Arc::clone(&store),
            config: config.clone(),
            locator: locator.clone(),
            handle: Arc::clone(&handle),
            events: events.clone(),
            poisoned: Arc::clone(&poisoned),
        };
        tokio::spawn(consumer.run(receiver));

        Arc::new(Self {
            store,
            config,
            locator,
            handle,
            queue,
            events,
            poisoned,
        })
    }

    pub(crate) fn store(&self) -> &dyn ObjectStore {
        &*self.store
    }

    pub(crate) fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Resolves (once) and returns the backing document location.
    pub async fn resolve(&self) -> Result<DocumentHandle, SyncError> {
        self.handle
            .get_or_try_init(|| self.locator.resolve(&*self.store))
            .await
            .cloned()
    }

    /// Queues one collection snapshot for persistence.
    ///
    /// Fails fast with [`SyncError::CorruptStore`] once the session is
    /// poisoned; the remote document needs manual repair before any
    /// further writes.
    pub(crate) fn enqueue(&self, collection: &str, records: Vec<Record>) -> Result<(), SyncError> {
        if self.poisoned.load(Ordering::Relaxed) {
            return Err(SyncError::CorruptStore(
                "writes halted for this session".to_string(),
            ));
        }
        self.queue
            .send(Job::Persist {
                collection: collection.to_string(),
                records,
            })
            .map_err(|_| SyncError::SyncFailed("write queue is closed".to_string()))
    }

    /// Waits until every persist queued before this call has settled.
    pub async fn flush(&self) -> Result<(), SyncError> {
        let (ack, done) = oneshot::channel();
        self.queue
            .send(Job::Flush(ack))
            .map_err(|_| SyncError::SyncFailed("write queue is closed".to_string()))?;
        done.await
            .map_err(|_| SyncError::SyncFailed("write queue is closed".to_string()))
    }

    /// Subscribes to persist outcomes. Lagging subscribers miss events
    /// rather than blocking the queue.
    pub fn events(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Whether the remote document was found corrupt and writes halted.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::Relaxed)
    }
}

struct QueueConsumer {
    store: Arc<dyn ObjectStore>,
    config: SyncConfig,
    locator: DocumentLocator,
    handle: Arc<OnceCell<DocumentHandle>>,
    events: broadcast::Sender<SyncEvent>,
    poisoned: Arc<AtomicBool>,
}

impl QueueConsumer {
    async fn run(self, mut jobs: mpsc::UnboundedReceiver<Job>) {
        while let Some(job) = jobs.recv().await {
            match job {
                Job::Flush(ack) => {
                    let _ = ack.send(());
                }
                Job::Persist {
                    collection,
                    records,
                } => self.persist(collection, records).await,
            }
        }
        tracing::debug!("write queue drained, consumer exiting");
    }

    async fn persist(&self, collection: String, records: Vec<Record>) {
        if self.poisoned.load(Ordering::Relaxed) {
            self.emit(
                &collection,
                SyncEventKind::Failed(SyncError::CorruptStore(
                    "writes halted for this session".to_string(),
                )),
            );
            return;
        }

        let handle = match self
            .handle
            .get_or_try_init(|| self.locator.resolve(&*self.store))
            .await
        {
            Ok(handle) => handle.clone(),
            Err(e) => {
                tracing::warn!(collection, error = %e, "could not resolve document");
                self.emit(&collection, SyncEventKind::Failed(e));
                return;
            }
        };

        match writer::persist(&*self.store, &handle, &collection, &records, &self.config).await {
            Ok(()) => self.emit(&collection, SyncEventKind::Persisted),
            Err(e) => {
                if matches!(e, SyncError::CorruptStore(_)) {
                    tracing::error!(collection, error = %e, "remote document corrupt, halting writes");
                    self.poisoned.store(true, Ordering::Relaxed);
                } else {
                    tracing::warn!(collection, error = %e, "persist failed, local cache kept");
                }
                self.emit(&collection, SyncEventKind::Failed(e));
            }
        }
    }

    fn emit(&self, collection: &str, kind: SyncEventKind) {
        // Nobody listening is fine
        let _ = self.events.send(SyncEvent {
            collection: collection.to_string(),
            kind,
            at: Utc::now(),
        });
    }
}

//! Live queries
//!
//! A live query re-runs a read against the pool after every committed
//! write and publishes the result through a `watch` channel. All
//! subscribers of one `LiveQuery` share a single background task. When
//! the last subscriber drops, the task keeps following writes for a grace
//! period and only stops if nobody subscribed again in the meantime.

use crate::error::Result;
use sqlx::SqlitePool;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;

pub(crate) type QueryFuture<T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'static>>;
pub(crate) type QueryFn<T> = Arc<dyn Fn(SqlitePool) -> QueryFuture<T> + Send + Sync>;

/// The running task's channel and the change version its value reflects
struct Shared<T> {
    tx: Arc<watch::Sender<Option<T>>>,
    version: u64,
}

type Slot<T> = Arc<Mutex<Option<Shared<T>>>>;

/// Box an async read so it can back a `LiveQuery`
pub(crate) fn query_fn<T, F, Fut>(f: F) -> QueryFn<T>
where
    F: Fn(SqlitePool) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    Arc::new(move |pool: SqlitePool| -> QueryFuture<T> { Box::pin(f(pool)) })
}

/// Write notifications shared by a repository and its live queries
#[derive(Clone)]
pub(crate) struct ChangeBus {
    tx: Arc<watch::Sender<u64>>,
}

impl ChangeBus {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    /// Record a committed write
    pub fn notify(&self) {
        self.tx.send_modify(|version| *version = version.wrapping_add(1));
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }

    /// Number of writes recorded so far
    pub fn version(&self) -> u64 {
        *self.tx.borrow()
    }
}

/// A shared, continuously updating query
pub struct LiveQuery<T> {
    name: String,
    pool: SqlitePool,
    changes: ChangeBus,
    fetch: QueryFn<T>,
    grace: Duration,
    slot: Slot<T>,
}

impl<T> Clone for LiveQuery<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            pool: self.pool.clone(),
            changes: self.changes.clone(),
            fetch: Arc::clone(&self.fetch),
            grace: self.grace,
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> LiveQuery<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        name: impl Into<String>,
        pool: SqlitePool,
        changes: ChangeBus,
        grace: Duration,
        fetch: QueryFn<T>,
    ) -> Self {
        Self {
            name: name.into(),
            pool,
            changes,
            fetch,
            grace,
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Subscribe to the query result.
    ///
    /// The receiver holds `None` until the first load completes. Must be
    /// called from within a tokio runtime.
    pub fn subscribe(&self) -> watch::Receiver<Option<T>> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(shared) = slot.as_ref() {
            if shared.tx.receiver_count() == 0 && shared.version != self.changes.version() {
                // Nobody is watching and a refresh is pending: hand out
                // "not loaded" rather than the result from before the write
                shared.tx.send_replace(None);
            }
            return shared.tx.subscribe();
        }

        let (tx, rx) = watch::channel(None);
        let tx = Arc::new(tx);
        *slot = Some(Shared {
            tx: Arc::clone(&tx),
            version: self.changes.version(),
        });
        drop(slot);

        let worker = Worker {
            name: self.name.clone(),
            pool: self.pool.clone(),
            fetch: Arc::clone(&self.fetch),
            grace: self.grace,
            slot: Arc::clone(&self.slot),
            changes: self.changes.subscribe(),
        };

        tracing::debug!("Starting live query: {}", self.name);
        tokio::spawn(worker.run(tx));

        rx
    }

    /// Whether a background task is currently serving this query
    pub fn is_active(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

/// Background task serving one `LiveQuery`.
///
/// Holds only a receiver of the change bus, so the task ends once every
/// repository handle is gone.
struct Worker<T> {
    name: String,
    pool: SqlitePool,
    fetch: QueryFn<T>,
    grace: Duration,
    slot: Slot<T>,
    changes: watch::Receiver<u64>,
}

impl<T> Worker<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn run(mut self, tx: Arc<watch::Sender<Option<T>>>) {
        self.refresh(&tx).await;

        loop {
            tokio::select! {
                changed = self.changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    self.refresh(&tx).await;
                }
                _ = tx.closed() => {
                    if !self.linger(&tx).await {
                        break;
                    }
                }
            }
        }

        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|current| Arc::ptr_eq(&current.tx, &tx)) {
            *slot = None;
        }
        drop(slot);
        tracing::debug!("Stopped live query: {}", self.name);
    }

    /// Keep following writes for the grace period with nobody subscribed,
    /// so a subscriber returning in that window sees current data.
    /// Returns `false` when the task should stop.
    async fn linger(&mut self, tx: &Arc<watch::Sender<Option<T>>>) -> bool {
        let deadline = tokio::time::sleep(self.grace);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => return !self.release_if_idle(tx),
                changed = self.changes.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                    self.refresh(tx).await;
                }
            }
        }
    }

    /// Re-run the query and publish the result together with the change
    /// version it was read at
    async fn refresh(&mut self, tx: &Arc<watch::Sender<Option<T>>>) {
        let version = *self.changes.borrow_and_update();

        match (self.fetch)(self.pool.clone()).await {
            Ok(value) => {
                let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
                tx.send_replace(Some(value));
                if let Some(shared) = slot.as_mut() {
                    if Arc::ptr_eq(&shared.tx, tx) {
                        shared.version = version;
                    }
                }
            }
            Err(e) => tracing::error!("Live query {} failed: {}", self.name, e),
        }
    }

    /// Clear the slot when nobody is subscribed. Checked under the slot
    /// lock so a concurrent `subscribe` either sees the running task or
    /// starts a new one.
    fn release_if_idle(&self, tx: &Arc<watch::Sender<Option<T>>>) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if tx.receiver_count() == 0 {
            *slot = None;
            true
        } else {
            false
        }
    }
}

//! Persistence queue.
//!
//! Every mutation of the shared cache or the data directory runs while
//! holding the queue's single admission. Admission is granted strictly in
//! request order; a caller that cannot be admitted within the wait timeout
//! fails with [`StoreError::QueueTimeout`] and leaves the queue untouched.

use crate::error::{StoreError, StoreResult};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::timeout;
use tracing::warn;

/// Admission held by the running operation. Dropping it admits the next one.
pub type Admission<'a> = MutexGuard<'a, ()>;

/// FIFO admission queue for mutating operations.
#[derive(Debug)]
pub struct PersistenceQueue {
    lock: Mutex<()>,
    wait_timeout: Duration,
    waiting: AtomicUsize,
}

impl PersistenceQueue {
    /// Creates a queue that fails admission after `wait_timeout`.
    #[must_use]
    pub fn new(wait_timeout: Duration) -> Self {
        Self {
            lock: Mutex::new(()),
            wait_timeout,
            waiting: AtomicUsize::new(0),
        }
    }

    /// Waits for exclusive admission.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::QueueTimeout`] if admission takes longer than
    /// the wait timeout.
    pub async fn admit(&self) -> StoreResult<Admission<'_>> {
        self.waiting.fetch_add(1, Ordering::SeqCst);
        let admitted = timeout(self.wait_timeout, self.lock.lock()).await;
        self.waiting.fetch_sub(1, Ordering::SeqCst);

        admitted.map_err(|_| {
            warn!(waited = ?self.wait_timeout, "persistence queue admission timed out");
            StoreError::QueueTimeout {
                waited: self.wait_timeout,
            }
        })
    }

    /// Runs `op` under exclusive admission. An error from `op` fails only
    /// this operation.
    pub async fn operation<F, Fut, T>(&self, op: F) -> StoreResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let _admission = self.admit().await?;
        op().await
    }

    /// Number of callers currently waiting for admission.
    #[must_use]
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    /// The configured wait timeout.
    #[must_use]
    pub fn wait_timeout(&self) -> Duration {
        self.wait_timeout
    }
}

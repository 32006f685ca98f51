//! The ledger's single exclusive-access boundary.
//!
//! Reconciliation ticks, event intake, and `add_mirrored_repo` all go through
//! one [`SharedLedger`]. Holding the guard from [`SharedLedger::lock`] across
//! the existence probe and the create call is what keeps a name from being
//! created twice.

use std::path::PathBuf;
use std::sync::Arc;

use reposync_ledger::Ledger;
use tokio::sync::{Mutex, MutexGuard};

#[derive(Clone)]
pub struct SharedLedger {
    inner: Arc<Mutex<Ledger>>,
}

impl SharedLedger {
    pub fn new(ledger: Ledger) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ledger)),
        }
    }

    /// Hydrate from `path`; missing or corrupt storage yields an empty ledger.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        Self::new(Ledger::load(path))
    }

    /// Enter the critical section.
    pub(crate) async fn lock(&self) -> MutexGuard<'_, Ledger> {
        self.inner.lock().await
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.lock().await.contains(name)
    }

    /// Insert and persist in one critical section.
    pub async fn mark_mirrored(&self, name: &str) -> bool {
        self.lock().await.mark_mirrored(name)
    }

    pub async fn count(&self) -> usize {
        self.lock().await.count()
    }

    /// Sorted snapshot of every mirrored name.
    pub async fn names(&self) -> Vec<String> {
        self.lock().await.names().map(str::to_string).collect()
    }

    pub async fn path(&self) -> PathBuf {
        self.lock().await.path().to_path_buf()
    }
}

//! In-memory source and destination doubles for daemon unit tests.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reposync_core::{RepoName, RepositoryRef};
use reposync_forge::{ForgeError, MirrorDestination, SourceLister};
use tokio_util::sync::CancellationToken;

pub fn repo(name: &str, url: &str) -> RepositoryRef {
    RepositoryRef::new(name, url)
}

pub struct FakeSource {
    repos: Mutex<Option<Vec<RepositoryRef>>>,
    calls: AtomicUsize,
}

impl FakeSource {
    pub fn with(repos: Vec<RepositoryRef>) -> Arc<Self> {
        Arc::new(Self {
            repos: Mutex::new(Some(repos)),
            calls: AtomicUsize::new(0),
        })
    }

    /// Every listing fails with a 401.
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            repos: Mutex::new(None),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceLister for FakeSource {
    async fn fetch_all(
        &self,
        _cancel: &CancellationToken,
    ) -> Result<Vec<RepositoryRef>, ForgeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.repos
            .lock()
            .unwrap()
            .clone()
            .ok_or(ForgeError::SourceFetch {
                status: Some(401),
                detail: "Bad credentials".into(),
            })
    }
}

#[derive(Default)]
pub struct FakeDestination {
    existing: Mutex<BTreeSet<String>>,
    failing: Mutex<BTreeSet<String>>,
    attempted: Mutex<Vec<String>>,
    created: Mutex<Vec<String>>,
    exists_calls: AtomicUsize,
    create_delay: Mutex<Duration>,
}

impl FakeDestination {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn existing(self: Arc<Self>, names: &[&str]) -> Arc<Self> {
        self.existing
            .lock()
            .unwrap()
            .extend(names.iter().map(|n| n.to_string()));
        self
    }

    pub fn failing(self: Arc<Self>, names: &[&str]) -> Arc<Self> {
        self.failing
            .lock()
            .unwrap()
            .extend(names.iter().map(|n| n.to_string()));
        self
    }

    /// Make each create call take `delay` before answering.
    pub fn slow(self: Arc<Self>, delay: Duration) -> Arc<Self> {
        *self.create_delay.lock().unwrap() = delay;
        self
    }

    pub fn created(&self) -> Vec<String> {
        self.created.lock().unwrap().clone()
    }

    pub fn attempted(&self) -> Vec<String> {
        self.attempted.lock().unwrap().clone()
    }

    pub fn clear_attempts(&self) {
        self.attempted.lock().unwrap().clear();
    }

    pub fn exists_calls(&self) -> usize {
        self.exists_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MirrorDestination for FakeDestination {
    async fn exists(&self, _cancel: &CancellationToken, name: &RepoName) -> bool {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        self.existing.lock().unwrap().contains(name.as_str())
    }

    async fn create_mirror(
        &self,
        cancel: &CancellationToken,
        repo: &RepositoryRef,
    ) -> Result<(), ForgeError> {
        let name = repo.name.to_string();
        self.attempted.lock().unwrap().push(name.clone());

        let delay = *self.create_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(ForgeError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        if self.failing.lock().unwrap().contains(&name) {
            return Err(ForgeError::MirrorCreate {
                name,
                status: 422,
                body: "migration failed".into(),
            });
        }
        self.existing.lock().unwrap().insert(name.clone());
        self.created.lock().unwrap().push(name);
        Ok(())
    }
}

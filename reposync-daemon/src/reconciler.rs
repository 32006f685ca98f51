//! One reconciliation pass: list source, diff against the ledger, close gaps.

use std::sync::Arc;

use reposync_core::RepositoryRef;
use reposync_forge::{MirrorDestination, SourceLister};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::shared_ledger::SharedLedger;

/// What a single repository ended up as during a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoOutcome {
    /// Already in the ledger.
    Skipped,
    /// Found on the destination and recorded without a create call.
    Absorbed,
    Created,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// What started this pass (`timer`, `socket`, …).
    pub trigger: String,
    pub fetched: usize,
    pub skipped: usize,
    pub absorbed: usize,
    pub created: usize,
    pub failed: Vec<String>,
    /// Set when the source listing failed and nothing was examined.
    pub fetch_error: Option<String>,
    pub mirrored_total: usize,
    pub finished_at_unix: u64,
    pub duration_ms: u128,
}

pub struct Reconciler {
    source: Arc<dyn SourceLister>,
    destination: Arc<dyn MirrorDestination>,
    ledger: SharedLedger,
    last_run: RwLock<Option<RunSummary>>,
}

impl Reconciler {
    pub fn new(
        source: Arc<dyn SourceLister>,
        destination: Arc<dyn MirrorDestination>,
        ledger: SharedLedger,
    ) -> Self {
        Self {
            source,
            destination,
            ledger,
            last_run: RwLock::new(None),
        }
    }

    pub fn ledger(&self) -> &SharedLedger {
        &self.ledger
    }

    /// Summary of the most recently finished pass.
    pub async fn last_run(&self) -> Option<RunSummary> {
        self.last_run.read().await.clone()
    }

    /// Run one pass. Never fails: a listing failure means no progress this
    /// cycle, and per-repository failures are isolated and retried next time.
    pub async fn run_once(&self, cancel: &CancellationToken, trigger: &str) -> RunSummary {
        let started = Instant::now();
        tracing::info!(trigger, "checking for new repos");

        let mut summary = RunSummary {
            trigger: trigger.to_string(),
            ..RunSummary::default()
        };

        match self.source.fetch_all(cancel).await {
            Ok(repos) => {
                summary.fetched = repos.len();
                for repo in repos {
                    if cancel.is_cancelled() {
                        tracing::warn!("reconciliation cancelled mid-cycle");
                        break;
                    }
                    match self.reconcile_repo(cancel, &repo).await {
                        RepoOutcome::Skipped => summary.skipped += 1,
                        RepoOutcome::Absorbed => summary.absorbed += 1,
                        RepoOutcome::Created => summary.created += 1,
                        RepoOutcome::Failed => summary.failed.push(repo.name.to_string()),
                    }
                }
            }
            Err(err) => {
                tracing::error!(error = %err, "error fetching source repos");
                summary.fetch_error = Some(err.to_string());
            }
        }

        summary.mirrored_total = self.ledger.count().await;
        summary.finished_at_unix = crate::runtime::unix_seconds_now();
        summary.duration_ms = started.elapsed().as_millis();
        tracing::info!(
            trigger,
            fetched = summary.fetched,
            created = summary.created,
            absorbed = summary.absorbed,
            failed = summary.failed.len(),
            total = summary.mirrored_total,
            "finished checking",
        );

        *self.last_run.write().await = Some(summary.clone());
        summary
    }

    /// Ledger check, existence probe, and create for one repository, all in
    /// one critical section.
    async fn reconcile_repo(&self, cancel: &CancellationToken, repo: &RepositoryRef) -> RepoOutcome {
        let mut ledger = self.ledger.lock().await;
        let name = repo.name.as_str();

        if ledger.contains(name) {
            return RepoOutcome::Skipped;
        }

        if self.destination.exists(cancel, &repo.name).await {
            ledger.mark_mirrored(name);
            tracing::info!(repo = %name, "added existing destination mirror to ledger");
            return RepoOutcome::Absorbed;
        }

        match self.destination.create_mirror(cancel, repo).await {
            Ok(()) => {
                ledger.mark_mirrored(name);
                tracing::info!(repo = %name, "successfully mirrored repo");
                RepoOutcome::Created
            }
            Err(err) => {
                tracing::error!(repo = %name, error = %err, "error mirroring repo");
                RepoOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{repo, FakeDestination, FakeSource};
    use tempfile::TempDir;

    fn reconciler(
        tmp: &TempDir,
        source: &Arc<FakeSource>,
        destination: &Arc<FakeDestination>,
    ) -> Reconciler {
        let ledger = SharedLedger::load(tmp.path().join("mirrored_repos.json"));
        Reconciler::new(source.clone(), destination.clone(), ledger)
    }

    #[tokio::test]
    async fn creates_every_missing_repo_in_source_order() {
        let tmp = TempDir::new().unwrap();
        let source = FakeSource::with(vec![repo("a", "u1"), repo("b", "u2")]);
        let destination = FakeDestination::new();
        let reconciler = reconciler(&tmp, &source, &destination);

        let summary = reconciler.run_once(&CancellationToken::new(), "test").await;

        assert_eq!(destination.created(), vec!["a", "b"]);
        assert_eq!(summary.created, 2);
        assert_eq!(summary.mirrored_total, 2);
        assert_eq!(reconciler.ledger().count().await, 2);
        assert!(reconciler.ledger().contains("a").await);
        assert!(reconciler.ledger().contains("b").await);

        let on_disk: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(tmp.path().join("mirrored_repos.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(on_disk, serde_json::json!({"a": true, "b": true}));
    }

    #[tokio::test]
    async fn second_pass_with_unchanged_source_creates_nothing() {
        let tmp = TempDir::new().unwrap();
        let source = FakeSource::with(vec![repo("a", "u1"), repo("b", "u2")]);
        let destination = FakeDestination::new();
        let reconciler = reconciler(&tmp, &source, &destination);
        let cancel = CancellationToken::new();

        reconciler.run_once(&cancel, "test").await;
        let second = reconciler.run_once(&cancel, "test").await;

        assert_eq!(destination.created().len(), 2);
        assert_eq!(second.created, 0);
        assert_eq!(second.skipped, 2);
        assert_eq!(destination.exists_calls(), 2, "ledger hits skip the probe");
    }

    #[tokio::test]
    async fn existing_destination_repo_is_absorbed_without_create() {
        let tmp = TempDir::new().unwrap();
        let source = FakeSource::with(vec![repo("manual", "u1")]);
        let destination = FakeDestination::new().existing(&["manual"]);
        let reconciler = reconciler(&tmp, &source, &destination);

        let summary = reconciler.run_once(&CancellationToken::new(), "test").await;

        assert_eq!(summary.absorbed, 1);
        assert!(destination.created().is_empty());
        assert!(reconciler.ledger().contains("manual").await);
    }

    #[tokio::test]
    async fn one_failure_does_not_abort_batch_and_is_retried_alone() {
        let tmp = TempDir::new().unwrap();
        let source = FakeSource::with(vec![repo("a", "u1"), repo("bad", "u2"), repo("c", "u3")]);
        let destination = FakeDestination::new().failing(&["bad"]);
        let reconciler = reconciler(&tmp, &source, &destination);
        let cancel = CancellationToken::new();

        let first = reconciler.run_once(&cancel, "test").await;
        assert_eq!(first.created, 2);
        assert_eq!(first.failed, vec!["bad".to_string()]);
        assert_eq!(reconciler.ledger().names().await, vec!["a", "c"]);

        destination.clear_attempts();
        let second = reconciler.run_once(&cancel, "test").await;
        assert_eq!(destination.attempted(), vec!["bad"]);
        assert_eq!(second.failed, vec!["bad".to_string()]);
        assert_eq!(second.skipped, 2);
    }

    #[tokio::test]
    async fn fetch_failure_leaves_ledger_untouched() {
        let tmp = TempDir::new().unwrap();
        let source = FakeSource::failing();
        let destination = FakeDestination::new();
        let reconciler = reconciler(&tmp, &source, &destination);

        let summary = reconciler.run_once(&CancellationToken::new(), "test").await;

        assert!(summary.fetch_error.is_some());
        assert_eq!(summary.mirrored_total, 0);
        assert_eq!(destination.exists_calls(), 0);
        assert!(!tmp.path().join("mirrored_repos.json").exists());
        assert_eq!(reconciler.last_run().await, Some(summary));
    }

    #[tokio::test]
    async fn cancelled_pass_stops_before_touching_remaining_repos() {
        let tmp = TempDir::new().unwrap();
        let source = FakeSource::with(vec![repo("a", "u1"), repo("b", "u2")]);
        let destination = FakeDestination::new();
        let reconciler = reconciler(&tmp, &source, &destination);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = reconciler.run_once(&cancel, "test").await;
        assert_eq!(summary.fetched, 2);
        assert!(destination.created().is_empty());
    }
}

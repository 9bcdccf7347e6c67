//! Auto-sync - conservative rebase-pull of repositories that are cleanly behind
//!
//! A repository is only touched when it has an upstream, trails it, has no
//! local commits, has a clean working tree and reported no collection error.
//! Every other state is left alone for a human to sort out.

use futures::stream::{FuturesUnordered, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::status::{RepositoryStatus, StatusCollector};
use crate::transport::Transport;

const REBASE_PULL: [&str; 3] = ["git", "pull", "--rebase"];

/// Whether `status` may be rebase-pulled without risking local work
pub fn should_sync(status: &RepositoryStatus, auto_sync: bool) -> bool {
    auto_sync
        && status.remote_branch.is_some()
        && status.behind > 0
        && status.ahead == 0
        && status.changes == 0
        && status.error.is_none()
}

/// Result of one sync attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Rebase-pull succeeded and status was re-collected
    Synced { name: String, path: PathBuf, message: String },
    /// Rebase-pull failed; the previous status was kept
    Failed { name: String, path: PathBuf, error: String },
}

impl SyncOutcome {
    pub fn path(&self) -> &Path {
        match self {
            SyncOutcome::Synced { path, .. } | SyncOutcome::Failed { path, .. } => path,
        }
    }
}

/// Results from a complete sync pass
#[derive(Debug, Clone)]
pub struct SyncSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub duration: Duration,
    pub outcomes: Vec<SyncOutcome>,
}

/// Rebase-pulls eligible repositories and refreshes their status
pub struct Syncer {
    transport: Arc<dyn Transport>,
    collector: StatusCollector,
    auto_sync: bool,
    max_parallel: usize,
}

impl Syncer {
    pub fn new(
        transport: Arc<dyn Transport>,
        collector: StatusCollector,
        auto_sync: bool,
        max_parallel: usize,
    ) -> Self {
        Self {
            transport,
            collector,
            auto_sync,
            max_parallel: max_parallel.max(1),
        }
    }

    /// Indices of the records that qualify for a sync
    pub fn eligible(&self, statuses: &[RepositoryStatus]) -> Vec<usize> {
        statuses
            .iter()
            .enumerate()
            .filter(|(_, status)| should_sync(status, self.auto_sync))
            .map(|(index, _)| index)
            .collect()
    }

    /// Sync every eligible repository, updating the records in place.
    /// Must run after status collection for the whole run has finished.
    pub async fn sync_all(&self, statuses: &mut [RepositoryStatus]) -> SyncSummary {
        let start_time = Instant::now();
        let eligible = self.eligible(statuses);

        if !eligible.is_empty() {
            info!("Auto-syncing {} repositories", eligible.len());
        }

        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        let mut futures = FuturesUnordered::new();

        for index in eligible {
            let semaphore = semaphore.clone();
            let path = statuses[index].path.clone();

            futures.push(async move {
                // Acquire semaphore permit
                let _permit = semaphore.acquire_owned().await.ok();
                (index, self.sync_repository(&path).await)
            });
        }

        // Wait for every attempt before touching the records
        let mut results = Vec::new();
        while let Some(result) = futures.next().await {
            results.push(result);
        }

        let mut outcomes = Vec::with_capacity(results.len());
        for (index, result) in results {
            let status = &mut statuses[index];
            match result {
                Ok(refreshed) => {
                    status.synced = true;
                    status.ahead = refreshed.ahead;
                    status.behind = refreshed.behind;
                    status.changes = refreshed.changes;
                    status.error = refreshed.error;
                    outcomes.push(SyncOutcome::Synced {
                        name: status.name.clone(),
                        path: status.path.clone(),
                        message: "Synced successfully".to_string(),
                    });
                }
                Err(error) => {
                    status.sync_error = Some(error.clone());
                    outcomes.push(SyncOutcome::Failed {
                        name: status.name.clone(),
                        path: status.path.clone(),
                        error,
                    });
                }
            }
        }
        outcomes.sort_by(|a, b| a.path().cmp(b.path()));

        let succeeded = outcomes
            .iter()
            .filter(|outcome| matches!(outcome, SyncOutcome::Synced { .. }))
            .count();

        SyncSummary {
            attempted: outcomes.len(),
            succeeded,
            failed: outcomes.len() - succeeded,
            duration: start_time.elapsed(),
            outcomes,
        }
    }

    /// Rebase-pull one repository, then collect its status again
    async fn sync_repository(&self, path: &Path) -> Result<RepositoryStatus, String> {
        let argv: Vec<String> = REBASE_PULL.iter().map(|s| s.to_string()).collect();

        match self.transport.run_discrete(path, &argv).await {
            Ok(output) => {
                debug!("Rebase-pull output for {}: {}", path.display(), output);
                info!("Synced {}", path.display());
                Ok(self.collector.collect(path).await)
            }
            Err(e) => {
                warn!("Sync failed for {}: {}", path.display(), e);
                Err(format!("Sync failed: {}", e.detail()))
            }
        }
    }
}

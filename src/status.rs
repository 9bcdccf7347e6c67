//! Repository status collection
//!
//! Each repository is queried with a single batched script that runs four git
//! commands and separates their output with a delimiter marker. One round trip
//! per repository keeps remote runs fast; the parser below turns the combined,
//! possibly partial, output into a [`RepositoryStatus`].

use futures::stream::{FuturesUnordered, StreamExt};
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::transport::Transport;

pub const BRANCH_ERROR: &str = "Failed to get branch";
pub const BATCH_ERROR: &str = "Failed to parse batch output";

const GIT_FAILURE_PREFIX: &str = "fatal:";
const SEGMENT_COUNT: usize = 4;

static AHEAD_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[ahead (\d+)(?:, behind (\d+))?\]").expect("valid regex"));
static BEHIND_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[behind (\d+)\]").expect("valid regex"));

/// Status of one repository, gathered fresh on every run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryStatus {
    pub path: PathBuf,
    pub name: String,
    /// Current branch; empty when it could not be resolved
    pub branch: String,
    /// Upstream tracking ref; `None` means no upstream is configured
    pub remote_branch: Option<String>,
    pub ahead: u32,
    pub behind: u32,
    /// Changed and untracked paths
    pub changes: u32,
    pub error: Option<String>,
    /// Rebase-pulled successfully during this run
    pub synced: bool,
    /// Why the rebase-pull attempted during this run failed
    pub sync_error: Option<String>,
}

impl RepositoryStatus {
    /// Empty record for the repository at `path`
    pub fn new(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Self {
            path: path.to_path_buf(),
            name,
            branch: String::new(),
            remote_branch: None,
            ahead: 0,
            behind: 0,
            changes: 0,
            error: None,
            synced: false,
            sync_error: None,
        }
    }

    fn failed(path: &Path, error: impl Into<String>) -> Self {
        let mut status = Self::new(path);
        status.error = Some(error.into());
        status
    }

    pub fn has_upstream(&self) -> bool {
        self.remote_branch.is_some()
    }
}

/// Gathers [`RepositoryStatus`] records through a [`Transport`]
#[derive(Clone)]
pub struct StatusCollector {
    transport: Arc<dyn Transport>,
    marker: String,
    max_parallel: usize,
}

impl StatusCollector {
    /// Collector with a fresh random delimiter for this run
    pub fn new(transport: Arc<dyn Transport>, max_parallel: usize) -> Self {
        let marker = format!("---REPOSTAT-{}---", uuid::Uuid::new_v4().simple());
        Self::with_marker(transport, max_parallel, marker)
    }

    pub fn with_marker(transport: Arc<dyn Transport>, max_parallel: usize, marker: impl Into<String>) -> Self {
        Self {
            transport,
            marker: marker.into(),
            max_parallel: max_parallel.max(1),
        }
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// The script run inside each repository
    pub fn batch_script(&self) -> String {
        let echo = format!("echo '{}'", self.marker);
        [
            "git rev-parse --abbrev-ref HEAD 2>&1",
            &echo,
            "git rev-parse --abbrev-ref @{upstream} 2>&1",
            &echo,
            "git status -sb 2>&1",
            &echo,
            "git status --porcelain 2>&1",
        ]
        .join("\n")
    }

    /// Collect the status of a single repository; failures land in `error`
    pub async fn collect(&self, repo: &Path) -> RepositoryStatus {
        debug!("Collecting status for {}", repo.display());

        match self.transport.run_batch(repo, &self.batch_script()).await {
            Ok(output) => {
                let status = parse_batch_output(repo, &output, &self.marker);
                if let Some(error) = &status.error {
                    warn!("{}: {}", repo.display(), error);
                }
                status
            }
            Err(e) => {
                warn!("Status collection failed for {}: {}", repo.display(), e);
                RepositoryStatus::failed(repo, format!("Transport failure: {}", e))
            }
        }
    }

    /// Collect every repository with bounded concurrency, sorted by path
    pub async fn collect_all(&self, repos: &[PathBuf]) -> Vec<RepositoryStatus> {
        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        let mut futures = FuturesUnordered::new();

        for repo in repos {
            let semaphore = semaphore.clone();
            let collector = self.clone();
            let repo = repo.clone();

            futures.push(async move {
                // Acquire semaphore permit
                let _permit = semaphore.acquire_owned().await.ok();
                collector.collect(&repo).await
            });
        }

        let mut statuses = Vec::with_capacity(repos.len());
        while let Some(status) = futures.next().await {
            statuses.push(status);
        }

        statuses.sort_by(|a, b| a.path.cmp(&b.path));
        statuses
    }
}

/// Parse the combined output of the batch script
pub fn parse_batch_output(repo: &Path, output: &str, marker: &str) -> RepositoryStatus {
    let segments: Vec<&str> = output.split(marker).collect();
    if segments.len() != SEGMENT_COUNT {
        debug!(
            "Expected {} segments from {}, got {}",
            SEGMENT_COUNT,
            repo.display(),
            segments.len()
        );
        return RepositoryStatus::failed(repo, BATCH_ERROR);
    }

    let mut status = RepositoryStatus::new(repo);

    let branch = segments[0].trim();
    if is_git_failure(branch) {
        status.error = Some(BRANCH_ERROR.to_string());
        return status;
    }
    status.branch = branch.to_string();

    let upstream = segments[1].trim();
    if !is_git_failure(upstream) {
        status.remote_branch = Some(upstream.to_string());
    }

    if status.has_upstream() {
        let (ahead, behind) = parse_tracking(segments[2]);
        status.ahead = ahead;
        status.behind = behind;
    }

    status.changes = count_changes(segments[3]);
    status
}

fn is_git_failure(segment: &str) -> bool {
    segment.is_empty() || segment.starts_with(GIT_FAILURE_PREFIX)
}

/// Ahead/behind counts from `git status -sb` output
pub fn parse_tracking(segment: &str) -> (u32, u32) {
    let line = segment
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with("##"))
        .unwrap_or(segment);
    parse_branch_status(line)
}

/// Ahead/behind counts from a `## branch...upstream [ahead N, behind M]` line
pub fn parse_branch_status(line: &str) -> (u32, u32) {
    if let Some(captures) = AHEAD_PATTERN.captures(line) {
        let ahead = captures.get(1).and_then(|m| m.as_str().parse().ok()).unwrap_or(0);
        let behind = captures.get(2).and_then(|m| m.as_str().parse().ok()).unwrap_or(0);
        return (ahead, behind);
    }

    if let Some(captures) = BEHIND_PATTERN.captures(line) {
        let behind = captures.get(1).and_then(|m| m.as_str().parse().ok()).unwrap_or(0);
        return (0, behind);
    }

    (0, 0)
}

fn count_changes(segment: &str) -> u32 {
    segment.lines().filter(|line| !line.trim().is_empty()).count() as u32
}

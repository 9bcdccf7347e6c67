//! Repository discovery
//!
//! Enumerates repository roots below a directory by running `find` through the
//! [`Transport`], so local and remote trees are searched the same way.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::transport::Transport;

/// Directory `find` runs from: the process directory locally, the login directory remotely
const SEARCH_ORIGIN: &str = ".";

/// Finds directories that contain a `.git` subdirectory
pub struct Discoverer {
    transport: Arc<dyn Transport>,
    max_depth: u32,
}

impl Discoverer {
    pub fn new(transport: Arc<dyn Transport>, max_depth: u32) -> Self {
        Self {
            transport,
            max_depth,
        }
    }

    /// The `find` invocation used for enumeration
    pub fn find_command(&self, root: &Path) -> Vec<String> {
        vec![
            "find".to_string(),
            root.to_string_lossy().into_owned(),
            "-maxdepth".to_string(),
            self.max_depth.to_string(),
            "-type".to_string(),
            "d".to_string(),
            "-name".to_string(),
            ".git".to_string(),
        ]
    }

    /// Discover repository roots below `root`, in the order `find` reports them
    pub async fn discover(&self, root: &Path) -> Result<Vec<PathBuf>> {
        debug!("Searching {} for repositories (max depth {})", root.display(), self.max_depth);

        let output = self
            .transport
            .run_discrete(Path::new(SEARCH_ORIGIN), &self.find_command(root))
            .await
            .with_context(|| format!("Failed to discover repositories in {}", root.display()))?;

        let repos = parse_find_output(&output);
        info!("Discovered {} repositories in {}", repos.len(), root.display());
        Ok(repos)
    }
}

/// Turn `find` output (one `.git` directory per line) into repository roots
pub fn parse_find_output(output: &str) -> Vec<PathBuf> {
    let mut seen = HashSet::new();

    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(Path::new)
        .filter(|git_dir| git_dir.file_name().is_some_and(|name| name == ".git"))
        .filter_map(|git_dir| git_dir.parent())
        .map(|repo| {
            if repo.as_os_str().is_empty() {
                PathBuf::from(".")
            } else {
                repo.to_path_buf()
            }
        })
        .filter(|repo| seen.insert(repo.clone()))
        .collect()
}

//! Common test utilities and helpers for repostat tests

#![allow(dead_code)]

use async_trait::async_trait;
use repostat::{Transport, TransportError};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const MARKER: &str = "---REPOSTAT-TEST---";

/// Transport that replays scripted output per repository
#[derive(Default)]
pub struct FakeTransport {
    batches: Mutex<HashMap<PathBuf, VecDeque<String>>>,
    pull_failures: Mutex<HashMap<PathBuf, String>>,
    discrete_calls: Mutex<Vec<(PathBuf, Vec<String>)>>,
    find_output: Mutex<String>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue batch output for `repo`; each collection consumes one entry
    pub fn with_batch(self, repo: &str, output: String) -> Self {
        self.batches
            .lock()
            .unwrap()
            .entry(PathBuf::from(repo))
            .or_default()
            .push_back(output);
        self
    }

    /// Make `git pull --rebase` fail in `repo`
    pub fn with_pull_failure(self, repo: &str, stderr: &str) -> Self {
        self.pull_failures
            .lock()
            .unwrap()
            .insert(PathBuf::from(repo), stderr.to_string());
        self
    }

    pub fn with_find_output(self, output: &str) -> Self {
        *self.find_output.lock().unwrap() = output.to_string();
        self
    }

    /// Repositories `git pull --rebase` ran in, in call order
    pub fn pulled(&self) -> Vec<PathBuf> {
        self.discrete_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, argv)| argv.join(" ") == "git pull --rebase")
            .map(|(path, _)| path.clone())
            .collect()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn run_discrete(&self, repo_path: &Path, argv: &[String]) -> Result<String, TransportError> {
        self.discrete_calls
            .lock()
            .unwrap()
            .push((repo_path.to_path_buf(), argv.to_vec()));

        if argv.first().map(String::as_str) == Some("find") {
            return Ok(self.find_output.lock().unwrap().clone());
        }

        match self.pull_failures.lock().unwrap().get(repo_path) {
            Some(stderr) => Err(TransportError::CommandFailed {
                command: argv.join(" "),
                code: Some(1),
                stderr: stderr.clone(),
            }),
            None => Ok(String::new()),
        }
    }

    async fn run_batch(&self, repo_path: &Path, _script: &str) -> Result<String, TransportError> {
        self.batches
            .lock()
            .unwrap()
            .get_mut(repo_path)
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| TransportError::Spawn {
                program: "fake".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no scripted output"),
            })
    }

    fn describe(&self) -> String {
        "Remote: fake-host".to_string()
    }
}

/// Batch output for a repository on `main` tracking `origin/main`
pub fn tracked_batch(tracking: &str, changed_paths: &[&str]) -> String {
    format!(
        "main\n{m}\norigin/main\n{m}\n## main...origin/main{}\n{m}\n{}\n",
        tracking,
        changed_paths.join("\n"),
        m = MARKER
    )
}

/// Batch output for a repository whose branch has no upstream
pub fn untracked_batch(branch: &str) -> String {
    format!(
        "{b}\n{m}\nfatal: no upstream configured for branch '{b}'\n{m}\n## {b}\n{m}\n\n",
        b = branch,
        m = MARKER
    )
}

//! Command transport - runs git against a repository, locally or over SSH
//!
//! Everything above this module only talks to the [`Transport`] trait, so the
//! same discovery, status and sync logic works against a local directory tree
//! or a remote host reachable through a remote shell.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command as AsyncCommand;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::TransportConfig;
use crate::error::TransportError;

/// Where the repositories of a run live
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportTarget {
    /// Directory tree on this machine
    Local { root: PathBuf },
    /// Directory tree on a host reachable over a remote shell
    Remote {
        host: String,
        user: Option<String>,
        root: PathBuf,
    },
}

impl TransportTarget {
    pub fn local(root: impl Into<PathBuf>) -> Self {
        TransportTarget::Local { root: root.into() }
    }

    /// Remote target; `host` may already carry a `user@` prefix, but not together with `user`
    pub fn remote(host: impl Into<String>, user: Option<String>, root: impl Into<PathBuf>) -> Result<Self> {
        let host = host.into();
        if host.trim().is_empty() {
            bail!("Remote host must not be empty");
        }
        if user.is_some() && host.contains('@') {
            bail!("Remote host {} already names a user; drop the separate SSH user", host);
        }
        Ok(TransportTarget::Remote {
            host,
            user,
            root: root.into(),
        })
    }

    /// Directory the search starts from
    pub fn root(&self) -> &Path {
        match self {
            TransportTarget::Local { root } | TransportTarget::Remote { root, .. } => root,
        }
    }

    /// `user@host` (or bare host) for remote targets
    pub fn destination(&self) -> Option<String> {
        match self {
            TransportTarget::Local { .. } => None,
            TransportTarget::Remote { host, user: Some(user), .. } => Some(format!("{}@{}", user, host)),
            TransportTarget::Remote { host, user: None, .. } => Some(host.clone()),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, TransportTarget::Remote { .. })
    }

    /// Build the transport matching this target
    pub fn connect(&self, config: &TransportConfig) -> Arc<dyn Transport> {
        match self {
            TransportTarget::Local { .. } => Arc::new(LocalTransport::new(config)),
            TransportTarget::Remote { host, .. } => {
                let destination = self.destination().unwrap_or_else(|| host.clone());
                Arc::new(SshTransport::new(destination, host.clone(), config))
            }
        }
    }
}

/// Runs commands and scripts rooted at a repository path
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Run `argv` inside `repo_path`; a non-zero exit is an error.
    /// Returns trimmed standard output.
    async fn run_discrete(&self, repo_path: &Path, argv: &[String]) -> Result<String, TransportError>;

    /// Run a shell script inside `repo_path` and return its raw standard output.
    /// The exit status of the script is ignored; only spawn failures and
    /// timeouts are errors.
    async fn run_batch(&self, repo_path: &Path, script: &str) -> Result<String, TransportError>;

    /// Location label for reports, e.g. "Local" or "Remote: build-box"
    fn describe(&self) -> String;
}

/// Runs commands on this machine
pub struct LocalTransport {
    shell: String,
    timeout: Duration,
}

impl LocalTransport {
    pub fn new(config: &TransportConfig) -> Self {
        Self {
            shell: config.shell.clone(),
            timeout: config.timeout_duration(),
        }
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn run_discrete(&self, repo_path: &Path, argv: &[String]) -> Result<String, TransportError> {
        let (program, args) = argv.split_first().ok_or(TransportError::EmptyCommand)?;
        let label = argv.join(" ");

        let mut command = AsyncCommand::new(program);
        command.args(args).current_dir(repo_path);

        let output = execute(command, program, &label, self.timeout).await?;
        discrete_result(label, output)
    }

    async fn run_batch(&self, repo_path: &Path, script: &str) -> Result<String, TransportError> {
        let label = format!("{} batch in {}", self.shell, repo_path.display());

        let mut command = AsyncCommand::new(&self.shell);
        command.arg("-c").arg(script).current_dir(repo_path);

        let output = execute(command, &self.shell, &label, self.timeout).await?;
        if !output.status.success() {
            debug!("{} exited with {}", label, output.status);
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn describe(&self) -> String {
        "Local".to_string()
    }
}

/// Runs commands on a remote host through an SSH-style client
pub struct SshTransport {
    program: String,
    options: Vec<String>,
    destination: String,
    host: String,
    timeout: Duration,
}

impl SshTransport {
    pub fn new(destination: String, host: String, config: &TransportConfig) -> Self {
        Self {
            program: config.ssh_program.clone(),
            options: config.ssh_options.clone(),
            destination,
            host,
            timeout: config.timeout_duration(),
        }
    }

    /// Arguments handed to the SSH client for one remote command line
    fn client_args(&self, repo_path: &Path, body: &str) -> Vec<String> {
        let mut args = self.options.clone();
        args.push(self.destination.clone());
        args.push(remote_command_line(repo_path, body));
        args
    }

    async fn invoke(&self, repo_path: &Path, body: &str, label: &str) -> Result<Output, TransportError> {
        let mut command = AsyncCommand::new(&self.program);
        command.args(self.client_args(repo_path, body));
        execute(command, &self.program, label, self.timeout).await
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn run_discrete(&self, repo_path: &Path, argv: &[String]) -> Result<String, TransportError> {
        if argv.is_empty() {
            return Err(TransportError::EmptyCommand);
        }
        let body = join_argv(argv);
        let label = format!("{} on {}", argv.join(" "), self.destination);

        let output = self.invoke(repo_path, &body, &label).await?;
        discrete_result(label, output)
    }

    async fn run_batch(&self, repo_path: &Path, script: &str) -> Result<String, TransportError> {
        let body = format!("{{\n{}\n}}", script.trim());
        let label = format!("batch in {} on {}", repo_path.display(), self.destination);

        let output = self.invoke(repo_path, &body, &label).await?;
        if !output.status.success() {
            debug!("{} exited with {}", label, output.status);
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn describe(&self) -> String {
        format!("Remote: {}", self.host)
    }
}

/// Spawn `command` and wait for it, killing it once `limit` elapses
async fn execute(
    mut command: AsyncCommand,
    program: &str,
    label: &str,
    limit: Duration,
) -> Result<Output, TransportError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!("Running: {}", label);

    match timeout(limit, command.output()).await {
        Ok(result) => result.map_err(|source| TransportError::Spawn {
            program: program.to_string(),
            source,
        }),
        Err(_) => {
            warn!("Command timed out after {:?}: {}", limit, label);
            Err(TransportError::Timeout {
                command: label.to_string(),
                timeout: limit,
            })
        }
    }
}

fn discrete_result(label: String, output: Output) -> Result<String, TransportError> {
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();

    if output.status.success() {
        return Ok(stdout);
    }

    // git reports rebase conflicts on stdout
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    Err(TransportError::CommandFailed {
        command: label,
        code: output.status.code(),
        stderr: if stderr.is_empty() { stdout } else { stderr },
    })
}

/// `cd '<repo>' && <body>`, the command line a remote shell executes
pub fn remote_command_line(repo_path: &Path, body: &str) -> String {
    format!("cd {} && {}", shell_quote(&repo_path.to_string_lossy()), body)
}

/// Join an argv for a remote shell: whitespace-bearing arguments are quoted, the rest pass bare
pub fn join_argv(argv: &[String]) -> String {
    argv.iter()
        .map(String::as_str)
        .map(quote_arg)
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn quote_arg(arg: &str) -> String {
    if arg.chars().any(char::is_whitespace) {
        shell_quote(arg)
    } else {
        arg.to_string()
    }
}

/// Single-quote `value` for a POSIX shell
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    /// SSH client stand-in: runs the remote command line with a local shell
    fn stub_ssh(timeout: u64) -> SshTransport {
        let config = TransportConfig {
            timeout,
            ssh_program: "sh".to_string(),
            ssh_options: argv(&["-c", "exec sh -c \"$2\"", "ssh-stub"]),
            ..Default::default()
        };
        SshTransport::new("dev@box".to_string(), "box".to_string(), &config)
    }

    fn local(timeout: u64) -> LocalTransport {
        let config = TransportConfig {
            timeout,
            ..Default::default()
        };
        LocalTransport::new(&config)
    }

    #[test]
    fn test_quote_arg_only_quotes_whitespace() {
        assert_eq!(quote_arg("status"), "status");
        assert_eq!(quote_arg("--rebase"), "--rebase");
        assert_eq!(quote_arg("two words"), "'two words'");
        assert_eq!(quote_arg("tab\there"), "'tab\there'");
    }

    #[test]
    fn test_join_argv() {
        let joined = join_argv(&argv(&["git", "commit", "-m", "two words"]));
        assert_eq!(joined, "git commit -m 'two words'");
    }

    #[test]
    fn test_shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("/srv/it's here"), r"'/srv/it'\''s here'");
        assert_eq!(shell_quote("/plain"), "'/plain'");
    }

    #[test]
    fn test_remote_command_line() {
        let line = remote_command_line(Path::new("/home/dev/my repo"), "git pull --rebase");
        assert_eq!(line, "cd '/home/dev/my repo' && git pull --rebase");
    }

    #[test]
    fn test_ssh_client_args() {
        let target = TransportTarget::remote("build-box", Some("deploy".to_string()), "/srv").unwrap();
        let transport = SshTransport::new(
            target.destination().unwrap(),
            "build-box".to_string(),
            &TransportConfig::default(),
        );

        let args = transport.client_args(Path::new("/srv/api"), &join_argv(&argv(&["git", "pull", "--rebase"])));
        assert_eq!(
            args,
            vec![
                "-o",
                "BatchMode=yes",
                "deploy@build-box",
                "cd '/srv/api' && git pull --rebase",
            ]
        );
        assert_eq!(transport.describe(), "Remote: build-box");
    }

    #[tokio::test]
    async fn test_ssh_batch_runs_inside_repo() {
        let dir = TempDir::new().unwrap();
        let output = stub_ssh(10)
            .run_batch(dir.path(), "pwd\necho second\nexit 4")
            .await
            .expect("batch should not fail on exit status");

        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            PathBuf::from(lines[0]).canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
        assert_eq!(lines[1], "second");
    }

    #[tokio::test]
    async fn test_ssh_discrete_quotes_and_reports_failure() {
        let dir = TempDir::new().unwrap();
        let transport = stub_ssh(10);

        let echoed = transport
            .run_discrete(dir.path(), &argv(&["printf", "%s,", "two words", "one"]))
            .await
            .expect("printf should succeed");
        assert_eq!(echoed, "two words,one,");

        let result = transport
            .run_discrete(dir.path(), &argv(&["sh", "-c", "echo oops >&2; exit 3"]))
            .await;
        assert_matches!(
            result,
            Err(TransportError::CommandFailed { code: Some(3), ref stderr, ref command })
                if stderr == "oops" && command.ends_with("on dev@box")
        );
    }

    #[tokio::test]
    async fn test_ssh_timeout() {
        let dir = TempDir::new().unwrap();
        let mut transport = stub_ssh(10);
        transport.timeout = Duration::from_millis(200);

        let result = transport.run_batch(dir.path(), "sleep 5").await;
        assert_matches!(result, Err(TransportError::Timeout { .. }));
    }

    #[test]
    fn test_target_destination() {
        let bare = TransportTarget::remote("box", None, "/srv").unwrap();
        assert_eq!(bare.destination(), Some("box".to_string()));

        let inline_user = TransportTarget::remote("ops@box", None, "/srv").unwrap();
        assert_eq!(inline_user.destination(), Some("ops@box".to_string()));

        let local = TransportTarget::local("/tmp");
        assert_eq!(local.destination(), None);
        assert!(!local.is_remote());
        assert_eq!(local.root(), Path::new("/tmp"));
    }

    #[test]
    fn test_target_rejects_two_users() {
        assert!(TransportTarget::remote("ops@box", Some("dev".to_string()), "/srv").is_err());
        assert!(TransportTarget::remote("  ", None, "/srv").is_err());
    }

    #[test]
    fn test_connect_picks_implementation() {
        let config = TransportConfig::default();
        assert_eq!(TransportTarget::local("/tmp").connect(&config).describe(), "Local");

        let remote = TransportTarget::remote("box", Some("dev".to_string()), "/srv").unwrap();
        assert_eq!(remote.connect(&config).describe(), "Remote: box");
    }

    #[tokio::test]
    async fn test_local_discrete_runs_in_repo_path() {
        let dir = TempDir::new().unwrap();
        let output = local(10)
            .run_discrete(dir.path(), &argv(&["pwd"]))
            .await
            .expect("pwd should succeed");

        assert_eq!(
            PathBuf::from(output).canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }

    #[tokio::test]
    async fn test_local_discrete_fails_on_non_zero_exit() {
        let dir = TempDir::new().unwrap();
        let result = local(10)
            .run_discrete(dir.path(), &argv(&["sh", "-c", "echo oops >&2; exit 3"]))
            .await;

        assert_matches!(
            result,
            Err(TransportError::CommandFailed { code: Some(3), ref stderr, .. }) if stderr == "oops"
        );
    }

    #[tokio::test]
    async fn test_local_batch_ignores_exit_status() {
        let dir = TempDir::new().unwrap();
        let output = local(10)
            .run_batch(dir.path(), "echo first\necho second\nexit 4")
            .await
            .expect("batch should not fail on exit status");

        assert_eq!(output, "first\nsecond\n");
    }

    #[tokio::test]
    async fn test_local_timeout_kills_command() {
        let dir = TempDir::new().unwrap();
        let config = TransportConfig::default();
        let transport = LocalTransport {
            shell: config.shell,
            timeout: Duration::from_millis(200),
        };

        let result = transport.run_discrete(dir.path(), &argv(&["sleep", "5"])).await;
        assert_matches!(result, Err(TransportError::Timeout { .. }));

        let result = transport.run_batch(dir.path(), "sleep 5").await;
        assert_matches!(result, Err(TransportError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_local_spawn_failure() {
        let dir = TempDir::new().unwrap();
        let result = local(10)
            .run_discrete(dir.path(), &argv(&["repostat-no-such-program"]))
            .await;
        assert_matches!(result, Err(TransportError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_empty_argv() {
        let dir = TempDir::new().unwrap();
        let result = local(10).run_discrete(dir.path(), &[]).await;
        assert_matches!(result, Err(TransportError::EmptyCommand));
    }
}

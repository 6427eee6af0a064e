//! Async wrapper around the `git` executable.
//!
//! Every invocation captures its output, is killed when dropped and races the
//! shared cancellation token, so a shutdown aborts long clones instead of
//! waiting for them.

use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
    process::{ExitStatus, Output, Stdio},
    time::Instant,
};

use thiserror::Error;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::branches::Branch;

const SOURCE: &str = "infra::git";
const HEADS_PREFIX: &str = "refs/heads/";

#[derive(Debug, Error)]
pub enum GitError {
    #[error("failed to run `git {command}`: {source}")]
    Spawn {
        command: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("`git {command}` failed ({status}): {stderr}")]
    Failed {
        command: &'static str,
        status: ExitStatus,
        stderr: String,
    },
    #[error("`git {command}` cancelled by shutdown")]
    Cancelled { command: &'static str },
}

#[derive(Debug, Clone)]
pub struct GitClient {
    program: PathBuf,
}

impl GitClient {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Clone `url` into `target`, including submodules.
    pub async fn clone_repository(
        &self,
        url: &str,
        target: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), GitError> {
        let mut command = self.command(None);
        command
            .args(["clone", "--recurse-submodules", "--quiet", "--"])
            .arg(url)
            .arg(target);
        self.run("clone", command, cancel).await.map(|_| ())
    }

    /// Resolve `commit` to a full object id inside `repo`.
    ///
    /// Returns `Ok(None)` when the id does not name a commit known to the
    /// repository.
    pub async fn resolve_commit(
        &self,
        repo: &Path,
        commit: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, GitError> {
        let mut command = self.command(Some(repo));
        command
            .args(["rev-parse", "--verify", "--quiet"])
            .arg(format!("{commit}^{{commit}}"));

        match self.run("rev-parse", command, cancel).await {
            Ok(output) => {
                let resolved = String::from_utf8_lossy(&output.stdout).trim().to_string();
                Ok((!resolved.is_empty()).then_some(resolved))
            }
            Err(GitError::Failed { status, .. }) if status.code() == Some(1) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Detach the working tree of `repo` at `object`.
    pub async fn checkout(
        &self,
        repo: &Path,
        object: &str,
        cancel: &CancellationToken,
    ) -> Result<(), GitError> {
        let mut command = self.command(Some(repo));
        command.args(["checkout", "--quiet", "--detach"]).arg(object);
        self.run("checkout", command, cancel).await.map(|_| ())
    }

    /// Move submodules to the revisions recorded by the current checkout.
    pub async fn update_submodules(
        &self,
        repo: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), GitError> {
        let mut command = self.command(Some(repo));
        command.args(["submodule", "update", "--init", "--recursive", "--quiet"]);
        self.run("submodule", command, cancel).await.map(|_| ())
    }

    /// List the branch heads advertised by the remote at `url`.
    pub async fn list_remote_branches(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Branch>, GitError> {
        let mut command = self.command(None);
        command.args(["ls-remote", "--heads", "--"]).arg(url);
        let output = self.run("ls-remote", command, cancel).await?;
        Ok(parse_ls_remote(&String::from_utf8_lossy(&output.stdout)))
    }

    fn command(&self, repo: Option<&Path>) -> Command {
        let mut command = Command::new(&self.program);
        if let Some(repo) = repo {
            command.arg("-C").arg(repo);
        }
        command
            .env_remove("GIT_DIR")
            .env_remove("GIT_WORK_TREE")
            .env("GIT_TERMINAL_PROMPT", "0");
        command
    }

    async fn run(
        &self,
        label: &'static str,
        mut command: Command,
        cancel: &CancellationToken,
    ) -> Result<Output, GitError> {
        let started_at = Instant::now();
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(
            target = SOURCE,
            command = label,
            args = ?command.as_std().get_args().collect::<Vec<&OsStr>>(),
            "running git"
        );

        let child = command
            .spawn()
            .map_err(|source| GitError::Spawn {
                command: label,
                source,
            })?;

        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(target = SOURCE, command = label, "git cancelled by shutdown");
                return Err(GitError::Cancelled { command: label });
            }
            output = child.wait_with_output() => output.map_err(|source| GitError::Spawn {
                command: label,
                source,
            })?,
        };

        debug!(
            target = SOURCE,
            command = label,
            status = %output.status,
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "git finished"
        );

        if !output.status.success() {
            return Err(GitError::Failed {
                command: label,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output)
    }
}

/// Parse `git ls-remote --heads` output into branches.
pub fn parse_ls_remote(stdout: &str) -> Vec<Branch> {
    stdout
        .lines()
        .filter_map(|line| {
            let (commit, reference) = line.split_once('\t')?;
            let name = reference.trim().strip_prefix(HEADS_PREFIX)?;
            if name.is_empty() {
                return None;
            }
            Some(Branch {
                name: name.to_string(),
                commit: commit.trim().to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_heads_and_skips_other_refs() {
        let stdout = "1111111111111111111111111111111111111111\trefs/heads/main\n\
                      2222222222222222222222222222222222222222\trefs/heads/feature/x\n\
                      3333333333333333333333333333333333333333\trefs/tags/v1\n\
                      garbage line\n";

        let branches = parse_ls_remote(stdout);
        assert_eq!(
            branches,
            vec![
                Branch {
                    name: "main".to_string(),
                    commit: "1111111111111111111111111111111111111111".to_string(),
                },
                Branch {
                    name: "feature/x".to_string(),
                    commit: "2222222222222222222222222222222222222222".to_string(),
                },
            ]
        );
    }

    #[test]
    fn empty_output_yields_no_branches() {
        assert!(parse_ls_remote("").is_empty());
    }

    #[tokio::test]
    async fn missing_executable_reports_spawn_error() {
        let git = GitClient::new("/nonexistent/hugo-preview-git");
        let err = git
            .list_remote_branches("https://example.invalid/repo.git", &CancellationToken::new())
            .await
            .expect_err("spawn should fail");
        assert!(matches!(err, GitError::Spawn { command: "ls-remote", .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cancellation_kills_running_command() {
        use std::{fs, os::unix::fs::PermissionsExt, time::Duration};

        let dir = tempfile::TempDir::new().expect("temp dir");
        let program = dir.path().join("slow-git");
        fs::write(&program, "#!/bin/sh\nexec sleep 30\n").expect("write script");
        let mut perms = fs::metadata(&program).expect("metadata").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&program, perms).expect("set perms");

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let git = GitClient::new(program);
        let err = tokio::time::timeout(
            Duration::from_secs(5),
            git.clone_repository(
                "https://example.invalid/repo.git",
                &dir.path().join("checkout"),
                &cancel,
            ),
        )
        .await
        .expect("cancelled before the command finished")
        .expect_err("cancelled");
        assert!(matches!(err, GitError::Cancelled { command: "clone" }));
    }
}

use std::{io, path::PathBuf, process::ExitStatus};

use thiserror::Error;
use tokio::sync::oneshot;

use crate::infra::git::GitError;

use super::base_url::BaseUrlError;

/// A request to build one commit of one repository into `target_path`.
///
/// The worker answers every job exactly once on `reply`; a job that never
/// reaches the worker is answered with [`RenderError::QueueClosed`].
#[derive(Debug)]
pub struct RenderJob {
    pub repository_url: String,
    pub commit_hash: String,
    pub target_path: PathBuf,
    pub reply: oneshot::Sender<RenderResult>,
}

impl RenderJob {
    /// Create a job together with the receiver its result will arrive on.
    pub fn new(
        repository_url: impl Into<String>,
        commit_hash: impl Into<String>,
        target_path: impl Into<PathBuf>,
    ) -> (Self, oneshot::Receiver<RenderResult>) {
        let (reply, receiver) = oneshot::channel();
        let job = Self {
            repository_url: repository_url.into(),
            commit_hash: commit_hash.into(),
            target_path: target_path.into(),
            reply,
        };
        (job, receiver)
    }

    /// Consume the job and deliver its result. Returns `false` when the
    /// submitter stopped waiting.
    pub fn respond(self, result: RenderResult) -> bool {
        self.reply.send(result).is_ok()
    }
}

/// Outcome of a render job. `output` holds the combined stdout and stderr of
/// the site generator, including on failure.
#[derive(Debug)]
pub struct RenderResult {
    pub commit_hash: String,
    pub output: String,
    pub error: Option<RenderError>,
}

impl RenderResult {
    pub fn success(commit_hash: impl Into<String>, output: String) -> Self {
        Self {
            commit_hash: commit_hash.into(),
            output,
            error: None,
        }
    }

    pub fn failure(commit_hash: impl Into<String>, output: String, error: RenderError) -> Self {
        Self {
            commit_hash: commit_hash.into(),
            output,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("can not clone repository: {0}")]
    Clone(#[source] GitError),
    #[error("error during checkout: {0}")]
    Checkout(#[source] GitError),
    #[error("commit `{commit}` does not resolve to a known object")]
    UnknownCommit { commit: String },
    #[error("can not format base URL: {0}")]
    BaseUrl(#[source] BaseUrlError),
    #[error("can not capture renderer output: {0}")]
    Capture(#[source] io::Error),
    #[error("can not start renderer: {0}")]
    Start(#[source] io::Error),
    #[error("error while waiting for renderer: {0}")]
    Wait(#[source] io::Error),
    #[error("error during execution of renderer: {status}")]
    Build { status: ExitStatus },
    #[error("render queue is closed")]
    QueueClosed,
}

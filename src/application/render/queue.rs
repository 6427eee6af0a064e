use std::{
    path::{Path, PathBuf},
    time::Instant,
};

use metrics::{counter, histogram};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    config::Settings,
    infra::{
        git::GitClient,
        telemetry::{RENDER_DURATION_MS, RENDER_JOBS_TOTAL},
    },
};

use super::{
    base_url::base_url,
    generator::run_generator,
    types::{RenderError, RenderJob, RenderResult},
};

const SOURCE: &str = "application::render::queue";

/// Jobs allowed to wait behind the one being rendered before `submit` blocks.
pub const QUEUE_CAPACITY: usize = 1;

/// Static configuration shared by every render.
#[derive(Debug, Clone)]
pub struct RenderQueueConfig {
    pub hugo_path: PathBuf,
    pub base_url: String,
    pub git: GitClient,
}

impl From<&Settings> for RenderQueueConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            hugo_path: settings.render.hugo_path.clone(),
            base_url: settings.server.base_url.clone(),
            git: GitClient::new(settings.render.git_path.clone()),
        }
    }
}

/// Submission handle for the render worker. Cheap to clone.
#[derive(Debug, Clone)]
pub struct RenderQueue {
    sender: mpsc::Sender<RenderJob>,
}

/// Receiving side of the queue; renders one job at a time once started.
#[derive(Debug)]
pub struct RenderWorker {
    config: RenderQueueConfig,
    receiver: mpsc::Receiver<RenderJob>,
}

impl RenderQueue {
    pub fn new(config: RenderQueueConfig) -> (Self, RenderWorker) {
        let (sender, receiver) = mpsc::channel(QUEUE_CAPACITY);
        (Self { sender }, RenderWorker { config, receiver })
    }

    /// Enqueue `job`, waiting while the backlog is full.
    ///
    /// Failures are reported on the job's reply channel, never here.
    pub async fn submit(&self, job: RenderJob) {
        if let Err(mpsc::error::SendError(job)) = self.sender.send(job).await {
            let commit_hash = job.commit_hash.clone();
            debug!(
                target = SOURCE,
                commit = %commit_hash,
                "render queue closed; rejecting job"
            );
            job.respond(RenderResult::failure(
                commit_hash,
                String::new(),
                RenderError::QueueClosed,
            ));
        }
    }

    /// Submit a job for `commit_hash` and return the receiver of its result.
    pub async fn render(
        &self,
        repository_url: impl Into<String>,
        commit_hash: impl Into<String>,
        target_path: impl Into<PathBuf>,
    ) -> oneshot::Receiver<RenderResult> {
        let (job, receiver) = RenderJob::new(repository_url, commit_hash, target_path);
        self.submit(job).await;
        receiver
    }
}

impl RenderWorker {
    /// Spawn the worker loop. It stops once `cancel` fires; jobs still queued
    /// at that point are answered with [`RenderError::QueueClosed`].
    pub fn start(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    async fn run(mut self, cancel: CancellationToken) {
        debug!(target = SOURCE, "render queue ready");

        loop {
            let job = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                job = self.receiver.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };

            self.process(job, &cancel).await;
        }

        self.receiver.close();
        while let Ok(job) = self.receiver.try_recv() {
            let commit_hash = job.commit_hash.clone();
            job.respond(RenderResult::failure(
                commit_hash,
                String::new(),
                RenderError::QueueClosed,
            ));
        }

        debug!(target = SOURCE, "render queue shut down");
    }

    async fn process(&self, job: RenderJob, cancel: &CancellationToken) {
        let started_at = Instant::now();
        debug!(
            target = SOURCE,
            repository = %job.repository_url,
            commit = %job.commit_hash,
            target_path = %job.target_path.display(),
            "got render job"
        );

        let (output, outcome) = self.render_site(&job, cancel).await;
        let elapsed_ms = started_at.elapsed().as_millis() as u64;
        histogram!(RENDER_DURATION_MS).record(elapsed_ms as f64);

        let result = match outcome {
            Ok(()) => {
                counter!(RENDER_JOBS_TOTAL, "result" => "success").increment(1);
                info!(
                    target = SOURCE,
                    commit = %job.commit_hash,
                    elapsed_ms,
                    output_bytes = output.len(),
                    "render finished"
                );
                RenderResult::success(job.commit_hash.clone(), output)
            }
            Err(error) => {
                counter!(RENDER_JOBS_TOTAL, "result" => "failure").increment(1);
                warn!(
                    target = SOURCE,
                    commit = %job.commit_hash,
                    elapsed_ms,
                    error = %error,
                    "render failed"
                );
                RenderResult::failure(job.commit_hash.clone(), output, error)
            }
        };

        if !job.respond(result) {
            debug!(target = SOURCE, "render result dropped; submitter stopped waiting");
        }
    }

    /// Build the job's commit into its target path. A target the worker
    /// created is removed again when any step fails.
    async fn render_site(
        &self,
        job: &RenderJob,
        cancel: &CancellationToken,
    ) -> (String, Result<(), RenderError>) {
        let preexisting = tokio::fs::try_exists(&job.target_path)
            .await
            .unwrap_or(true);

        let (output, result) = self.build_worktree(job, cancel).await;
        if result.is_err() && !preexisting {
            remove_worktree(&job.target_path).await;
        }
        (output, result)
    }

    async fn build_worktree(
        &self,
        job: &RenderJob,
        cancel: &CancellationToken,
    ) -> (String, Result<(), RenderError>) {
        if let Err(err) = self.prepare_worktree(job, cancel).await {
            return (String::new(), Err(err));
        }

        let url = match base_url(&self.config.base_url, &job.commit_hash) {
            Ok(url) => url,
            Err(err) => return (String::new(), Err(RenderError::BaseUrl(err))),
        };
        debug!(target = SOURCE, base_url = %url, "base URL");

        run_generator(&self.config.hugo_path, &job.target_path, &url).await
    }

    /// Clone the repository and detach it at the job's commit.
    async fn prepare_worktree(
        &self,
        job: &RenderJob,
        cancel: &CancellationToken,
    ) -> Result<(), RenderError> {
        let git = &self.config.git;

        git.clone_repository(&job.repository_url, &job.target_path, cancel)
            .await
            .map_err(RenderError::Clone)?;

        let resolved = git
            .resolve_commit(&job.target_path, &job.commit_hash, cancel)
            .await
            .map_err(RenderError::Checkout)?
            .ok_or_else(|| RenderError::UnknownCommit {
                commit: job.commit_hash.clone(),
            })?;

        git.checkout(&job.target_path, &resolved, cancel)
            .await
            .map_err(RenderError::Checkout)?;
        git.update_submodules(&job.target_path, cancel)
            .await
            .map_err(RenderError::Checkout)?;

        Ok(())
    }
}

async fn remove_worktree(path: &Path) {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!(
            target = SOURCE,
            path = %path.display(),
            error = %err,
            "failed to remove worktree of failed render"
        ),
    }
}

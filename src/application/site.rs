//! Default site repository: one remote, rendered on demand through the queue.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    application::{
        render::RenderQueue,
        repos::{SiteError, SiteHandler, SiteRepository},
    },
    config::Settings,
    domain::{branches::BranchList, commit::CommitHash},
    infra::{git::GitClient, static_site::StaticSite},
};

const SOURCE: &str = "application::site";

#[derive(Debug, Clone)]
pub struct SiteRepositoryConfig {
    pub repository_url: String,
    pub work_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl SiteRepositoryConfig {
    /// Returns `None` when no repository is configured.
    pub fn from_settings(settings: &Settings) -> Option<Self> {
        let repository_url = settings.repository.url.clone()?;
        Some(Self {
            repository_url,
            work_dir: settings.render.work_dir.clone(),
            output_dir: settings.render.output_dir.clone(),
        })
    }
}

type RenderSlot = Arc<Mutex<Option<Arc<StaticSite>>>>;

/// Renders and serves commits of one remote repository.
///
/// Each render runs on its own task that holds the commit's slot until the
/// worker replies, so a request that goes away neither cancels the render nor
/// lets a retry submit a second job for the same checkout.
pub struct GitSiteRepository {
    state: Arc<SiteState>,
}

struct SiteState {
    config: SiteRepositoryConfig,
    git: GitClient,
    queue: RenderQueue,
    cancel: CancellationToken,
    renders: DashMap<CommitHash, RenderSlot>,
}

impl GitSiteRepository {
    pub fn new(
        config: SiteRepositoryConfig,
        git: GitClient,
        queue: RenderQueue,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            state: Arc::new(SiteState {
                config,
                git,
                queue,
                cancel,
                renders: DashMap::new(),
            }),
        }
    }
}

impl SiteState {
    fn target_path(&self, commit: &CommitHash) -> PathBuf {
        self.config.work_dir.join(commit.as_str())
    }

    fn slot(&self, commit: &CommitHash) -> RenderSlot {
        self.renders
            .entry(commit.clone())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    /// Drop the slot of a failed render unless another request is already
    /// waiting on it.
    fn forget(&self, commit: &CommitHash, slot: &RenderSlot) {
        self.renders.remove_if(commit, |_, current| {
            Arc::ptr_eq(current, slot) && Arc::strong_count(current) == 2
        });
    }

    async fn site(&self, commit: CommitHash) -> Result<Arc<StaticSite>, SiteError> {
        let slot = self.slot(&commit);
        let mut rendered = slot.lock().await;

        if let Some(site) = rendered.as_ref() {
            debug!(target = SOURCE, commit = %commit, "serving rendered preview");
            return Ok(site.clone());
        }

        match self.render(&commit).await {
            Ok(site) => {
                *rendered = Some(site.clone());
                Ok(site)
            }
            Err(err) => {
                self.forget(&commit, &slot);
                Err(err)
            }
        }
    }

    async fn render(&self, commit: &CommitHash) -> Result<Arc<StaticSite>, SiteError> {
        let target = self.target_path(commit);
        clear_target(&target).await?;
        tokio::fs::create_dir_all(&self.config.work_dir).await?;

        let receiver = self
            .queue
            .render(&self.config.repository_url, commit.as_str(), &target)
            .await;

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(SiteError::ShuttingDown),
            result = receiver => result.map_err(|_| SiteError::ReplyDropped)?,
        };

        match result.error {
            None => {
                info!(
                    target = SOURCE,
                    commit = %commit,
                    output = %result.output,
                    "preview rendered"
                );
                Ok(Arc::new(StaticSite::new(
                    target.join(&self.config.output_dir),
                )))
            }
            Some(error) => {
                warn!(
                    target = SOURCE,
                    commit = %commit,
                    error = %error,
                    output = %result.output,
                    "preview render failed"
                );
                Err(SiteError::Render(error))
            }
        }
    }
}

#[async_trait]
impl SiteRepository for GitSiteRepository {
    async fn list_branches(&self) -> Result<BranchList, SiteError> {
        let state = &self.state;
        let branches = state
            .git
            .list_remote_branches(&state.config.repository_url, &state.cancel)
            .await?;
        Ok(BranchList::new(branches))
    }

    async fn site_handler(&self, commit: &str) -> Result<Arc<dyn SiteHandler>, SiteError> {
        let commit = CommitHash::parse(commit)?;
        let state = Arc::clone(&self.state);
        let render = tokio::spawn(async move { state.site(commit).await });

        let site = tokio::select! {
            biased;
            _ = self.state.cancel.cancelled() => return Err(SiteError::ShuttingDown),
            joined = render => joined??,
        };
        Ok(site)
    }
}

async fn clear_target(target: &Path) -> Result<(), SiteError> {
    match tokio::fs::remove_dir_all(target).await {
        Ok(()) => {
            debug!(
                target = SOURCE,
                path = %target.display(),
                "removed leftover checkout"
            );
            Ok(())
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(SiteError::Io(err)),
    }
}

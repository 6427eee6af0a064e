//! Capabilities the preview gateway depends on.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{body::Body, http::Request, response::Response};
use thiserror::Error;

use crate::{
    application::render::RenderError, domain::branches::BranchList, domain::commit::CommitError,
    infra::git::GitError,
};

#[derive(Debug, Error)]
pub enum SiteError {
    #[error("invalid commit: {0}")]
    InvalidCommit(#[from] CommitError),
    #[error("git error: {0}")]
    Git(#[from] GitError),
    #[error("render failed: {0}")]
    Render(#[source] RenderError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("render result channel dropped")]
    ReplyDropped,
    #[error("service is shutting down")]
    ShuttingDown,
    #[error("render task failed: {0}")]
    RenderTask(#[from] tokio::task::JoinError),
}

/// Serves the rendered output of one preview.
///
/// Requests arrive with the `/preview/<commit>` prefix already stripped.
#[async_trait]
pub trait SiteHandler: Send + Sync {
    async fn serve(&self, request: Request<Body>) -> Response;
}

/// Branch discovery and commit resolution behind `/api/branches` and `/preview/`.
#[async_trait]
pub trait SiteRepository: Send + Sync {
    async fn list_branches(&self) -> Result<BranchList, SiteError>;

    /// Resolve `commit` into a handler for its rendered site, rendering it first
    /// if needed.
    async fn site_handler(&self, commit: &str) -> Result<Arc<dyn SiteHandler>, SiteError>;
}

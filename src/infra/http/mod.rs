//! HTTP gateway: router, middleware and the listener lifecycle.

mod middleware;
mod routes;

pub use middleware::{REQUEST_ID_HEADER, RequestContext};
pub use routes::{GatewayState, build_router};

use std::{net::SocketAddr, sync::Arc, time::Duration};

use thiserror::Error;
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{application::repos::SiteRepository, config::ServerSettings};

const SOURCE: &str = "infra::http";

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("listenAddress can not be empty")]
    EmptyListenAddress,
    #[error("shutdownTimeout can not be zero")]
    ZeroShutdownTimeout,
    #[error("failed to bind `{address}`: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
}

/// Validated but not yet listening gateway.
pub struct PreviewServer {
    listen_address: String,
    shutdown_timeout: Duration,
    repository: Arc<dyn SiteRepository>,
}

impl PreviewServer {
    /// Validate the listener settings. No socket is opened here.
    pub fn new(
        settings: &ServerSettings,
        repository: Arc<dyn SiteRepository>,
    ) -> Result<Self, ServerError> {
        let listen_address = settings.listen_address.trim();
        if listen_address.is_empty() {
            return Err(ServerError::EmptyListenAddress);
        }
        if settings.shutdown_timeout.is_zero() {
            return Err(ServerError::ZeroShutdownTimeout);
        }

        Ok(Self {
            listen_address: listen_address.to_string(),
            shutdown_timeout: settings.shutdown_timeout,
            repository,
        })
    }

    /// Bind the listener and serve until `cancel` fires.
    ///
    /// After cancellation in-flight requests get `shutdown_timeout` to
    /// finish before the server task is aborted.
    pub async fn start(self, cancel: CancellationToken) -> Result<ServerHandle, ServerError> {
        let listener = TcpListener::bind(self.listen_address.as_str())
            .await
            .map_err(|source| ServerError::Bind {
                address: self.listen_address.clone(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind {
                address: self.listen_address.clone(),
                source,
            })?;

        let router = build_router(GatewayState::new(self.repository));
        let graceful = cancel.clone();
        let mut serve = tokio::spawn(async move {
            axum::serve(listener, router.into_make_service())
                .with_graceful_shutdown(async move { graceful.cancelled().await })
                .await
        });

        info!(target = SOURCE, address = %local_addr, "preview gateway listening");

        let grace = self.shutdown_timeout;
        let task = tokio::spawn(async move {
            let finished = tokio::select! {
                result = &mut serve => Some(result),
                _ = cancel.cancelled() => None,
            };

            let result = match finished {
                Some(result) => result,
                None => match tokio::time::timeout(grace, &mut serve).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(
                            target = SOURCE,
                            timeout_secs = grace.as_secs(),
                            "graceful shutdown timed out; aborting server"
                        );
                        serve.abort();
                        return;
                    }
                },
            };

            match result {
                Ok(Ok(())) => info!(target = SOURCE, "preview gateway stopped"),
                Ok(Err(err)) => error!(target = SOURCE, error = %err, "server error"),
                Err(err) => error!(target = SOURCE, error = %err, "server task failed"),
            }
        });

        Ok(ServerHandle { local_addr, task })
    }
}

/// Running gateway.
pub struct ServerHandle {
    local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Resolve once the listener has fully stopped.
    pub async fn wait(self) {
        if let Err(err) = self.task.await {
            error!(target = SOURCE, error = %err, "server supervisor failed");
        }
    }
}

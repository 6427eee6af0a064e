use std::{process, sync::Arc};

use hugo_preview::{
    application::{
        error::AppError,
        render::{RenderQueue, RenderQueueConfig},
        site::{GitSiteRepository, SiteRepositoryConfig},
    },
    config::{self, RenderArgs, Settings},
    domain::commit::CommitHash,
    infra::{http::PreviewServer, telemetry},
};
use tokio_util::sync::CancellationToken;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Render(args) => run_render(settings, args).await,
    }
}

async fn run_serve(settings: Settings) -> Result<(), AppError> {
    let site_config = SiteRepositoryConfig::from_settings(&settings)
        .ok_or_else(|| AppError::validation("repository.url is required to serve previews"))?;

    let cancel = CancellationToken::new();
    let queue_config = RenderQueueConfig::from(&settings);
    let git = queue_config.git.clone();
    let (queue, worker) = RenderQueue::new(queue_config);

    let repository = Arc::new(GitSiteRepository::new(
        site_config,
        git,
        queue,
        cancel.clone(),
    ));
    let server = PreviewServer::new(&settings.server, repository)?;

    let worker_handle = worker.start(cancel.clone());
    let server_handle = match server.start(cancel.clone()).await {
        Ok(handle) => handle,
        Err(err) => {
            cancel.cancel();
            join_worker(worker_handle).await;
            return Err(err.into());
        }
    };

    info!(
        address = %server_handle.local_addr(),
        base_url = %settings.server.base_url,
        "hugo-preview ready"
    );

    let watcher = tokio::spawn(cancel_on_signal(cancel.clone()));

    server_handle.wait().await;
    cancel.cancel();
    join_worker(worker_handle).await;
    watcher.abort();

    info!("hugo-preview stopped");
    Ok(())
}

async fn run_render(settings: Settings, args: RenderArgs) -> Result<(), AppError> {
    let repository_url = settings
        .repository
        .url
        .clone()
        .ok_or_else(|| AppError::validation("repository.url is required to render"))?;
    let commit = CommitHash::parse(&args.commit)
        .map_err(|err| AppError::validation(err.to_string()))?;
    let target = args
        .target
        .unwrap_or_else(|| settings.render.work_dir.join(commit.as_str()));

    let cancel = CancellationToken::new();
    let (queue, worker) = RenderQueue::new(RenderQueueConfig::from(&settings));
    let worker_handle = worker.start(cancel.clone());
    let watcher = tokio::spawn(cancel_on_signal(cancel.clone()));

    let receiver = queue.render(repository_url, commit.as_str(), &target).await;
    let result = receiver
        .await
        .map_err(|_| AppError::unexpected("render worker dropped the job"));

    cancel.cancel();
    join_worker(worker_handle).await;
    watcher.abort();

    let result = result?;
    print!("{}", result.output);
    match result.error {
        None => {
            info!(
                commit = %commit,
                output = %target.join(&settings.render.output_dir).display(),
                "render complete"
            );
            Ok(())
        }
        Some(err) => Err(AppError::unexpected(err.to_string())),
    }
}

async fn join_worker(handle: tokio::task::JoinHandle<()>) {
    if let Err(err) = handle.await {
        warn!(error = %err, "render worker task failed");
    }
}

async fn cancel_on_signal(cancel: CancellationToken) {
    shutdown_signal().await;
    info!("shutdown requested");
    cancel.cancel();
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(err) => {
            warn!(error = %err, "failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

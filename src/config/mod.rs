//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    path::{Component, Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "hugo-preview";
const ENV_PREFIX: &str = "HUGO_PREVIEW";
const DEFAULT_LISTEN_ADDRESS: &str = "127.0.0.1:8080";
const DEFAULT_BASE_URL: &str = "http://localhost:8080/";
const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 10;
const DEFAULT_HUGO_PATH: &str = "hugo";
const DEFAULT_GIT_PATH: &str = "git";
const DEFAULT_WORK_DIR_NAME: &str = "hugo-preview";
const DEFAULT_OUTPUT_DIR: &str = "public";

/// Command-line arguments for the hugo-preview binary.
#[derive(Debug, Parser)]
#[command(
    name = "hugo-preview",
    version,
    about = "Render and serve previews of Hugo sites by commit"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "HUGO_PREVIEW_CONFIG_FILE",
        value_name = "PATH"
    )]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the preview HTTP gateway.
    Serve(Box<ServeArgs>),
    /// Render a single commit and print the generator output.
    Render(RenderArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct RenderOverrides {
    /// Override the site generator executable.
    #[arg(long = "hugo-path", value_name = "PATH")]
    pub hugo_path: Option<PathBuf>,

    /// Override the git executable.
    #[arg(long = "git-path", value_name = "PATH")]
    pub git_path: Option<PathBuf>,

    /// Override the directory holding per-commit checkouts.
    #[arg(long = "work-dir", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub work_dir: Option<PathBuf>,

    /// Override the generator output directory, relative to the checkout.
    #[arg(long = "output-dir", value_name = "PATH")]
    pub output_dir: Option<PathBuf>,

    /// Override the repository to preview.
    #[arg(long = "repository-url", value_name = "URL")]
    pub repository_url: Option<String>,

    /// Override the externally reachable base URL of the gateway.
    #[arg(long = "base-url", value_name = "URL")]
    pub base_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub render: RenderOverrides,

    /// Override the listen address (`host:port`).
    #[arg(long = "listen-address", value_name = "ADDR")]
    pub listen_address: Option<String>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "shutdown-timeout-seconds", value_name = "SECONDS")]
    pub shutdown_timeout_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Args, Clone)]
pub struct RenderArgs {
    #[command(flatten)]
    pub overrides: RenderOverrides,

    /// Checkout directory; defaults to `<work-dir>/<commit>`.
    #[arg(long, value_name = "DIR", value_hint = ValueHint::DirPath)]
    pub target: Option<PathBuf>,

    /// Commit to render.
    #[arg(value_name = "COMMIT")]
    pub commit: String,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub render: RenderSettings,
    pub repository: RepositorySettings,
}

/// Listener settings. Emptiness and zero timeouts are rejected by the server
/// itself when it is constructed.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub listen_address: String,
    pub base_url: String,
    pub shutdown_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub hugo_path: PathBuf,
    pub git_path: PathBuf,
    pub work_dir: PathBuf,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct RepositorySettings {
    pub url: Option<String>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Render(args)) => raw.apply_render_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    render: RawRenderSettings,
    repository: RawRepositorySettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(address) = overrides.listen_address.as_ref() {
            self.server.listen_address = Some(address.clone());
        }
        if let Some(seconds) = overrides.shutdown_timeout_seconds {
            self.server.shutdown_timeout_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }

        self.apply_render_overrides(&overrides.render);
    }

    fn apply_render_overrides(&mut self, overrides: &RenderOverrides) {
        if let Some(path) = overrides.hugo_path.as_ref() {
            self.render.hugo_path = Some(path.clone());
        }
        if let Some(path) = overrides.git_path.as_ref() {
            self.render.git_path = Some(path.clone());
        }
        if let Some(dir) = overrides.work_dir.as_ref() {
            self.render.work_dir = Some(dir.clone());
        }
        if let Some(dir) = overrides.output_dir.as_ref() {
            self.render.output_dir = Some(dir.clone());
        }
        if let Some(url) = overrides.repository_url.as_ref() {
            self.repository.url = Some(url.clone());
        }
        if let Some(url) = overrides.base_url.as_ref() {
            self.server.base_url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            render,
            repository,
        } = raw;

        Ok(Self {
            server: build_server_settings(server),
            logging: build_logging_settings(logging)?,
            render: build_render_settings(render)?,
            repository: build_repository_settings(repository),
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> ServerSettings {
    let listen_address = server
        .listen_address
        .unwrap_or_else(|| DEFAULT_LISTEN_ADDRESS.to_string());
    let base_url = server
        .base_url
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    let shutdown_timeout = Duration::from_secs(
        server
            .shutdown_timeout_seconds
            .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
    );

    ServerSettings {
        listen_address,
        base_url,
        shutdown_timeout,
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_render_settings(render: RawRenderSettings) -> Result<RenderSettings, LoadError> {
    let hugo_path = render
        .hugo_path
        .unwrap_or_else(|| PathBuf::from(DEFAULT_HUGO_PATH));
    if hugo_path.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "render.hugo_path",
            "path must not be empty",
        ));
    }

    let git_path = render
        .git_path
        .unwrap_or_else(|| PathBuf::from(DEFAULT_GIT_PATH));
    if git_path.as_os_str().is_empty() {
        return Err(LoadError::invalid("render.git_path", "path must not be empty"));
    }

    let work_dir = render
        .work_dir
        .unwrap_or_else(|| std::env::temp_dir().join(DEFAULT_WORK_DIR_NAME));
    if work_dir.as_os_str().is_empty() {
        return Err(LoadError::invalid("render.work_dir", "path must not be empty"));
    }

    let output_dir = render
        .output_dir
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));
    if !is_plain_relative(&output_dir) {
        return Err(LoadError::invalid(
            "render.output_dir",
            "must be a non-empty path inside the checkout",
        ));
    }

    Ok(RenderSettings {
        hugo_path,
        git_path,
        work_dir,
        output_dir,
    })
}

fn build_repository_settings(repository: RawRepositorySettings) -> RepositorySettings {
    let url = repository.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    RepositorySettings { url }
}

fn is_plain_relative(path: &Path) -> bool {
    let mut components = path.components().peekable();
    components.peek().is_some()
        && components.all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    listen_address: Option<String>,
    base_url: Option<String>,
    shutdown_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderSettings {
    hugo_path: Option<PathBuf>,
    git_path: Option<PathBuf>,
    work_dir: Option<PathBuf>,
    output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRepositorySettings {
    url: Option<String>,
}

#[cfg(test)]
mod tests;

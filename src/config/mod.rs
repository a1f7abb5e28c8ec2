//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{num::NonZeroU64, path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "vellum";
const DEFAULT_VIEWS_FOLDER: &str = "Views";
const DEFAULT_AREAS_FOLDER: &str = "Areas";
const DEFAULT_PARTIALS_FOLDER: &str = "_Partials";
const DEFAULT_LAYOUTS_FOLDER: &str = "_Layouts";
const DEFAULT_SHARED_FOLDER: &str = "_Shared";
const DEFAULT_EXTENSION: &str = ".hbs";
const DEFAULT_VIEWS_SLIDING_SECS: u64 = 5 * 60;
const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;
const DEFAULT_MISSING_RETRY_MS: u64 = 3_000;
const DEFAULT_MISSING_SLIDING_SECS: u64 = 15 * 60;
const DEFAULT_VIEW_RECHECK_MS: u64 = 30_000;
const DEFAULT_COMPILE_FAILURE_RETRY_MS: u64 = 2_000;
const DEFAULT_SWEEP_INTERVAL_MS: u64 = 1_000;
const DEFAULT_WATCH_INTERVAL_MS: u64 = 1_000;

/// Command-line arguments for the Vellum binary.
#[derive(Debug, Parser)]
#[command(name = "vellum", version, about = "Resolve and render view templates")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "VELLUM_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Resolve a view with its layouts and print the rendered output.
    Render(Box<RenderArgs>),
    /// Render a view repeatedly, printing the output whenever it changes.
    Watch(Box<WatchArgs>),
    /// Print the folders searched for a group.
    Paths(PathsArgs),
}

impl Command {
    fn overrides(&self) -> &SettingsOverrides {
        match self {
            Command::Render(args) => &args.overrides,
            Command::Watch(args) => &args.render.overrides,
            Command::Paths(args) => &args.overrides,
        }
    }
}

#[derive(Debug, Args, Default, Clone)]
pub struct SettingsOverrides {
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

    /// Override the template file extension.
    #[arg(long = "views-extension", value_name = "EXT")]
    pub extension: Option<String>,

    /// Override the compiled view sliding lifetime; 0 disables view caching.
    #[arg(long = "views-sliding-seconds", value_name = "SECONDS")]
    pub views_sliding_seconds: Option<u64>,

    /// Also search the bare views folder.
    #[arg(
        long = "views-allow-controllerless",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub allow_controllerless: Option<bool>,

    /// Override the cache key prefix.
    #[arg(long = "cache-key-prefix", value_name = "PREFIX")]
    pub cache_key_prefix: Option<String>,

    /// Override the partial folder polling interval.
    #[arg(long = "cache-poll-interval-ms", value_name = "MILLIS")]
    pub poll_interval_ms: Option<u64>,
}

#[derive(Debug, Args, Clone)]
pub struct GroupArgs {
    /// Area of the group, if any.
    #[arg(long, value_name = "AREA")]
    pub area: Option<String>,

    /// Controller of the group.
    #[arg(long, value_name = "CONTROLLER")]
    pub controller: String,
}

#[derive(Debug, Args, Clone)]
pub struct RenderArgs {
    #[command(flatten)]
    pub overrides: SettingsOverrides,

    #[command(flatten)]
    pub group: GroupArgs,

    /// Directory mapped to `~/`.
    #[arg(long, value_name = "DIR", value_hint = ValueHint::DirPath, default_value = ".")]
    pub root: PathBuf,

    /// View name, or an absolute `~/` path including the extension.
    pub view: String,

    /// Explicit layout, replacing the view's own declaration.
    #[arg(long, value_name = "LAYOUT")]
    pub layout: Option<String>,

    /// Resolve the view alone, without layouts.
    #[arg(long, action = clap::ArgAction::SetTrue, conflicts_with = "layout")]
    pub partial: bool,

    /// Model as an inline JSON object.
    #[arg(long, value_name = "JSON", conflicts_with = "data_file")]
    pub data: Option<String>,

    /// Model read from a JSON file.
    #[arg(long = "data-file", value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub data_file: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct WatchArgs {
    #[command(flatten)]
    pub render: RenderArgs,

    /// Delay between renders.
    #[arg(long = "interval-ms", value_name = "MILLIS", default_value_t = DEFAULT_WATCH_INTERVAL_MS)]
    pub interval_ms: u64,
}

#[derive(Debug, Args, Clone)]
pub struct PathsArgs {
    #[command(flatten)]
    pub overrides: SettingsOverrides,

    #[command(flatten)]
    pub group: GroupArgs,
}

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub views: ViewSettings,
    pub cache: CacheSettings,
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
pub struct ViewSettings {
    pub views_folder: String,
    pub areas_folder: String,
    pub partials_folder: String,
    pub layouts_folder: String,
    pub shared_folder: String,
    pub allow_controllerless: bool,
    pub extension: String,
    /// `None` disables caching of compiled views.
    pub views_sliding: Option<Duration>,
    pub cache_key_prefix: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub poll_interval_ms: NonZeroU64,
    pub missing_retry_ms: NonZeroU64,
    pub missing_sliding_secs: NonZeroU64,
    pub view_recheck_ms: NonZeroU64,
    pub compile_failure_retry_ms: NonZeroU64,
    pub sweep_interval_ms: NonZeroU64,
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

    builder = builder.add_source(Environment::with_prefix("VELLUM").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(cli.command.overrides());

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    views: RawViewSettings,
    cache: RawCacheSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &SettingsOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(extension) = overrides.extension.as_ref() {
            self.views.extension = Some(extension.clone());
        }
        if let Some(seconds) = overrides.views_sliding_seconds {
            self.views.views_sliding_seconds = Some(seconds);
        }
        if let Some(allow) = overrides.allow_controllerless {
            self.views.allow_controllerless = Some(allow);
        }
        if let Some(prefix) = overrides.cache_key_prefix.as_ref() {
            self.views.cache_key_prefix = Some(prefix.clone());
        }
        if let Some(interval) = overrides.poll_interval_ms {
            self.cache.poll_interval_ms = Some(interval);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            views,
            cache,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let views = build_view_settings(views)?;
        let cache = build_cache_settings(cache)?;

        Ok(Self {
            logging,
            views,
            cache,
        })
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

fn build_view_settings(views: RawViewSettings) -> Result<ViewSettings, LoadError> {
    let views_folder = folder_name(views.views_folder, DEFAULT_VIEWS_FOLDER, "views.views_folder")?;
    let areas_folder = folder_name(views.areas_folder, DEFAULT_AREAS_FOLDER, "views.areas_folder")?;
    let partials_folder = folder_name(
        views.partials_folder,
        DEFAULT_PARTIALS_FOLDER,
        "views.partials_folder",
    )?;
    let layouts_folder = folder_name(
        views.layouts_folder,
        DEFAULT_LAYOUTS_FOLDER,
        "views.layouts_folder",
    )?;

    // An empty shared folder is allowed and disables it.
    let shared_folder = views
        .shared_folder
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| DEFAULT_SHARED_FOLDER.to_string());
    if shared_folder.contains('/') {
        return Err(LoadError::invalid(
            "views.shared_folder",
            "must be a single folder name",
        ));
    }

    let extension = views
        .extension
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string());
    if extension.len() < 2 || !extension.starts_with('.') || extension.contains('/') {
        return Err(LoadError::invalid(
            "views.extension",
            format!("`{extension}` must be a dot followed by a name"),
        ));
    }

    let sliding_secs = views
        .views_sliding_seconds
        .unwrap_or(DEFAULT_VIEWS_SLIDING_SECS);
    let views_sliding = (sliding_secs > 0).then(|| Duration::from_secs(sliding_secs));

    let cache_key_prefix = match views.cache_key_prefix {
        Some(prefix) => {
            let trimmed = prefix.trim();
            if trimmed.is_empty() || trimmed.contains(':') {
                return Err(LoadError::invalid(
                    "views.cache_key_prefix",
                    "must be non-empty and must not contain ':'",
                ));
            }
            Some(trimmed.to_string())
        }
        None => None,
    };

    Ok(ViewSettings {
        views_folder,
        areas_folder,
        partials_folder,
        layouts_folder,
        shared_folder,
        allow_controllerless: views.allow_controllerless.unwrap_or(false),
        extension,
        views_sliding,
        cache_key_prefix,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    Ok(CacheSettings {
        poll_interval_ms: non_zero_u64(
            cache.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS),
            "cache.poll_interval_ms",
        )?,
        missing_retry_ms: non_zero_u64(
            cache.missing_retry_ms.unwrap_or(DEFAULT_MISSING_RETRY_MS),
            "cache.missing_retry_ms",
        )?,
        missing_sliding_secs: non_zero_u64(
            cache
                .missing_sliding_secs
                .unwrap_or(DEFAULT_MISSING_SLIDING_SECS),
            "cache.missing_sliding_secs",
        )?,
        view_recheck_ms: non_zero_u64(
            cache.view_recheck_ms.unwrap_or(DEFAULT_VIEW_RECHECK_MS),
            "cache.view_recheck_ms",
        )?,
        compile_failure_retry_ms: non_zero_u64(
            cache
                .compile_failure_retry_ms
                .unwrap_or(DEFAULT_COMPILE_FAILURE_RETRY_MS),
            "cache.compile_failure_retry_ms",
        )?,
        sweep_interval_ms: non_zero_u64(
            cache.sweep_interval_ms.unwrap_or(DEFAULT_SWEEP_INTERVAL_MS),
            "cache.sweep_interval_ms",
        )?,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawViewSettings {
    views_folder: Option<String>,
    areas_folder: Option<String>,
    partials_folder: Option<String>,
    layouts_folder: Option<String>,
    shared_folder: Option<String>,
    allow_controllerless: Option<bool>,
    extension: Option<String>,
    views_sliding_seconds: Option<u64>,
    cache_key_prefix: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    poll_interval_ms: Option<u64>,
    missing_retry_ms: Option<u64>,
    missing_sliding_secs: Option<u64>,
    view_recheck_ms: Option<u64>,
    compile_failure_retry_ms: Option<u64>,
    sweep_interval_ms: Option<u64>,
}

fn folder_name(
    value: Option<String>,
    default: &str,
    key: &'static str,
) -> Result<String, LoadError> {
    let name = value
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| default.to_string());
    if name.is_empty() {
        return Err(LoadError::invalid(key, "must not be empty"));
    }
    if name.contains('/') {
        return Err(LoadError::invalid(key, "must be a single folder name"));
    }
    Ok(name)
}

fn non_zero_u64(value: u64, key: &'static str) -> Result<NonZeroU64, LoadError> {
    NonZeroU64::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[cfg(test)]
mod tests;

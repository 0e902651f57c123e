//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{collections::BTreeMap, path::PathBuf, str::FromStr};

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::cache::{FreshnessEngine, InvalidationResolver, StaleWindowPolicy, SurfaceRegistry};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "regen-cache";
const ENV_PREFIX: &str = "REGEN_CACHE";
const STALE_WINDOW_MIRROR: &str = "mirror_ttl";
const STALE_WINDOW_FIXED: &str = "fixed";
const STALE_WINDOW_DISABLED: &str = "disabled";

/// Command-line arguments for the regen-cache binary.
#[derive(Debug, Parser)]
#[command(
    name = "regen-cache",
    version,
    about = "Cache keys, freshness verdicts and purge sets for incremental regeneration"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "REGEN_CACHE_CONFIG_FILE",
        value_name = "PATH",
        global = true
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Print the canonical key for a request path and its variants.
    Key(KeyArgs),
    /// Classify an artifact's freshness.
    Freshness(FreshnessArgs),
    /// Resolve invalidation events (JSON) into purge sets.
    Resolve(ResolveArgs),
    /// Print the effective invalidation rule table.
    Rules,
}

#[derive(Debug, Args, Clone)]
pub struct KeyArgs {
    /// Request path or absolute URL.
    #[arg(long, default_value = "")]
    pub path: String,

    /// Variant dimension as KEY=VALUE; dotted keys nest, values parse as JSON scalars.
    #[arg(long = "variant", value_name = "KEY=VALUE")]
    pub variants: Vec<String>,
}

#[derive(Debug, Args, Clone)]
pub struct FreshnessArgs {
    /// Artifact creation time (unix seconds); defaults to now.
    #[arg(long = "created-at", value_name = "SECONDS", allow_negative_numbers = true)]
    pub created_at: Option<i64>,

    /// Artifact TTL in seconds; may be zero or negative.
    #[arg(long, value_name = "SECONDS", allow_negative_numbers = true, default_value_t = 0)]
    pub ttl: i64,

    /// Evaluation time (unix seconds); defaults to the wall clock.
    #[arg(long, value_name = "SECONDS", allow_negative_numbers = true)]
    pub now: Option<i64>,
}

#[derive(Debug, Args, Clone)]
pub struct ResolveArgs {
    /// JSON file holding one event or a list of events; stdin when omitted.
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub file: Option<PathBuf>,

    /// Only print key counts, without digesting.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub estimate: bool,
}

#[derive(Debug, Args, Default, Clone)]
pub struct Overrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    /// Use a fixed stale window of this many seconds.
    #[arg(long = "stale-window-seconds", value_name = "SECONDS", global = true)]
    pub stale_window_seconds: Option<u64>,
}

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub freshness: FreshnessSettings,
    pub invalidation: InvalidationSettings,
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
pub struct FreshnessSettings {
    pub stale_window: StaleWindowPolicy,
}

#[derive(Debug, Clone, Default)]
pub struct InvalidationSettings {
    /// Event type → surfaces; added to or replacing the standard rules.
    pub rules: BTreeMap<String, Vec<String>>,
    /// Surface kind → path template replacing the standard one.
    pub paths: BTreeMap<String, String>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: String, reason: String },
}

impl LoadError {
    fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
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
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

/// Resolve configuration using the process arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            freshness,
            invalidation,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            freshness: build_freshness_settings(freshness)?,
            invalidation: build_invalidation_settings(invalidation)?,
        })
    }

    pub fn freshness_engine(&self) -> FreshnessEngine {
        FreshnessEngine::new(self.freshness.stale_window)
    }

    /// Build a resolver from the standard tables plus configured overrides.
    pub fn resolver(&self) -> InvalidationResolver {
        let standard = SurfaceRegistry::standard();
        let mut builder = InvalidationResolver::builder();

        for (kind, path) in &self.invalidation.paths {
            if let Some(scope) = standard.get(kind) {
                builder = builder.with_surface(kind.clone(), scope.with_path(path.clone()));
            }
        }
        for (event_type, surfaces) in &self.invalidation.rules {
            builder = builder.with_rule(event_type.clone(), surfaces.iter().cloned());
        }

        builder.build()
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    freshness: RawFreshnessSettings,
    invalidation: RawInvalidationSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(seconds) = overrides.stale_window_seconds {
            self.freshness.stale_window = Some(STALE_WINDOW_FIXED.to_string());
            self.freshness.stale_window_seconds = Some(i64::try_from(seconds).unwrap_or(i64::MAX));
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawFreshnessSettings {
    stale_window: Option<String>,
    stale_window_seconds: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawInvalidationSettings {
    rules: BTreeMap<String, Vec<String>>,
    paths: BTreeMap<String, String>,
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

fn build_freshness_settings(
    freshness: RawFreshnessSettings,
) -> Result<FreshnessSettings, LoadError> {
    let mode = match freshness.stale_window.as_deref().map(str::trim) {
        Some(mode) => mode.to_ascii_lowercase(),
        None if freshness.stale_window_seconds.is_some() => STALE_WINDOW_FIXED.to_string(),
        None => STALE_WINDOW_MIRROR.to_string(),
    };

    let stale_window = match mode.as_str() {
        STALE_WINDOW_MIRROR | STALE_WINDOW_DISABLED if freshness.stale_window_seconds.is_some() => {
            return Err(LoadError::invalid(
                "freshness.stale_window_seconds",
                format!("only applies when freshness.stale_window is `{STALE_WINDOW_FIXED}`"),
            ));
        }
        STALE_WINDOW_MIRROR => StaleWindowPolicy::MirrorTtl,
        STALE_WINDOW_DISABLED => StaleWindowPolicy::Disabled,
        STALE_WINDOW_FIXED => {
            let seconds = freshness.stale_window_seconds.ok_or_else(|| {
                LoadError::invalid(
                    "freshness.stale_window_seconds",
                    "required when freshness.stale_window is `fixed`",
                )
            })?;
            let seconds = u64::try_from(seconds).map_err(|_| {
                LoadError::invalid("freshness.stale_window_seconds", "must not be negative")
            })?;
            StaleWindowPolicy::Fixed(seconds)
        }
        other => {
            return Err(LoadError::invalid(
                "freshness.stale_window",
                format!(
                    "unknown mode `{other}` (expected {STALE_WINDOW_MIRROR}, {STALE_WINDOW_FIXED} or {STALE_WINDOW_DISABLED})"
                ),
            ));
        }
    };

    Ok(FreshnessSettings { stale_window })
}

fn build_invalidation_settings(
    invalidation: RawInvalidationSettings,
) -> Result<InvalidationSettings, LoadError> {
    let mut rules = BTreeMap::new();
    for (event_type, surfaces) in invalidation.rules {
        let event_type = event_type.trim().to_string();
        if event_type.is_empty() {
            return Err(LoadError::invalid(
                "invalidation.rules",
                "event type must not be empty",
            ));
        }

        let key = format!("invalidation.rules.{event_type}");
        let mut cleaned = Vec::with_capacity(surfaces.len());
        for surface in surfaces {
            let surface = surface.trim();
            if surface.is_empty() {
                return Err(LoadError::invalid(key, "surface kind must not be empty"));
            }
            cleaned.push(surface.to_string());
        }
        rules.insert(event_type, cleaned);
    }

    let standard = SurfaceRegistry::standard();
    let mut paths = BTreeMap::new();
    for (kind, template) in invalidation.paths {
        let key = format!("invalidation.paths.{kind}");
        let Some(scope) = standard.get(&kind) else {
            return Err(LoadError::invalid(
                key,
                format!("unknown surface kind (expected one of {})", standard.kinds().join(", ")),
            ));
        };

        let template = template.trim().to_string();
        if template.is_empty() {
            return Err(LoadError::invalid(key, "path must not be empty"));
        }
        if scope.requires_placeholder() && !template.contains("{id}") {
            return Err(LoadError::invalid(key, "path must contain an `{id}` placeholder"));
        }
        paths.insert(kind, template);
    }

    Ok(InvalidationSettings { rules, paths })
}

#[cfg(test)]
mod tests;

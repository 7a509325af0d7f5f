use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::offer::{CategoryId, StoreId};
use crate::errors::EngineError;
use crate::ranking::{estimator::Estimator, rank::RankingMode, RankingConfig};

pub const DEFAULT_CONFIG_PATHS: [&str; 2] = ["storerank.toml", "config/storerank.toml"];

#[derive(Clone, Debug, Default)]
pub struct AppConfig {
    pub ranking: RankingConfig,
    pub exclusions: ExclusionConfig,
    pub logging: LoggingConfig,
}

/// Exclusions applied when the caller does not supply its own lists.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExclusionConfig {
    pub stores: BTreeSet<StoreId>,
    pub categories: BTreeSet<CategoryId>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: LogFormat::Compact }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub mode: Option<RankingMode>,
    pub estimator: Option<Estimator>,
    pub min_store_samples: Option<u32>,
    pub min_category_samples: Option<u32>,
    pub shards: Option<usize>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl From<EngineError> for ConfigError {
    fn from(error: EngineError) -> Self {
        match error {
            EngineError::Configuration(message) => Self::Validation(message),
        }
    }
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::Pretty => "pretty",
            Self::Json => "json",
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch)?;
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATHS[0]));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        if let Some(ranking) = patch.ranking {
            if let Some(value) = ranking.min_store_samples {
                self.ranking.min_store_samples = non_negative("ranking.min_store_samples", value)?;
            }
            if let Some(value) = ranking.min_category_samples {
                self.ranking.min_category_samples =
                    non_negative("ranking.min_category_samples", value)?;
            }
            if let Some(mode) = ranking.mode {
                self.ranking.mode = mode.parse()?;
            }
            if let Some(estimator) = ranking.estimator {
                self.ranking.estimator = estimator.parse()?;
            }
            if let Some(value) = ranking.top_categories_per_store {
                self.ranking.top_categories_per_store =
                    non_negative("ranking.top_categories_per_store", value)? as usize;
            }
            if let Some(value) = ranking.top_stores_per_category {
                self.ranking.top_stores_per_category =
                    non_negative("ranking.top_stores_per_category", value)? as usize;
            }
            if let Some(value) = ranking.shards {
                self.ranking.shards = non_negative("ranking.shards", value)? as usize;
            }
        }

        if let Some(exclusions) = patch.exclusions {
            if let Some(stores) = exclusions.stores {
                self.exclusions.stores = stores.into_iter().map(StoreId::new).collect();
            }
            if let Some(categories) = exclusions.categories {
                self.exclusions.categories = categories.into_iter().map(CategoryId::new).collect();
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("STORERANK_RANKING_MIN_STORE_SAMPLES") {
            self.ranking.min_store_samples =
                parse_count("STORERANK_RANKING_MIN_STORE_SAMPLES", &value)?;
        }
        if let Some(value) = read_env("STORERANK_RANKING_MIN_CATEGORY_SAMPLES") {
            self.ranking.min_category_samples =
                parse_count("STORERANK_RANKING_MIN_CATEGORY_SAMPLES", &value)?;
        }
        if let Some(value) = read_env("STORERANK_RANKING_MODE") {
            self.ranking.mode = value.parse()?;
        }
        if let Some(value) = read_env("STORERANK_RANKING_ESTIMATOR") {
            self.ranking.estimator = value.parse()?;
        }
        if let Some(value) = read_env("STORERANK_RANKING_TOP_CATEGORIES_PER_STORE") {
            self.ranking.top_categories_per_store =
                parse_count("STORERANK_RANKING_TOP_CATEGORIES_PER_STORE", &value)? as usize;
        }
        if let Some(value) = read_env("STORERANK_RANKING_TOP_STORES_PER_CATEGORY") {
            self.ranking.top_stores_per_category =
                parse_count("STORERANK_RANKING_TOP_STORES_PER_CATEGORY", &value)? as usize;
        }
        if let Some(value) = read_env("STORERANK_RANKING_SHARDS") {
            self.ranking.shards = parse_count("STORERANK_RANKING_SHARDS", &value)? as usize;
        }

        if let Some(value) = read_env("STORERANK_EXCLUDED_STORES") {
            self.exclusions.stores = split_list(&value).map(StoreId::new).collect();
        }
        if let Some(value) = read_env("STORERANK_EXCLUDED_CATEGORIES") {
            self.exclusions.categories = split_list(&value).map(CategoryId::new).collect();
        }

        let log_level =
            read_env("STORERANK_LOGGING_LEVEL").or_else(|| read_env("STORERANK_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("STORERANK_LOGGING_FORMAT").or_else(|| read_env("STORERANK_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(mode) = overrides.mode {
            self.ranking.mode = mode;
        }
        if let Some(estimator) = overrides.estimator {
            self.ranking.estimator = estimator;
        }
        if let Some(min_store_samples) = overrides.min_store_samples {
            self.ranking.min_store_samples = min_store_samples;
        }
        if let Some(min_category_samples) = overrides.min_category_samples {
            self.ranking.min_category_samples = min_category_samples;
        }
        if let Some(shards) = overrides.shards {
            self.ranking.shards = shards;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ranking.validate()?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    DEFAULT_CONFIG_PATHS.into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn non_negative(key: &str, value: i64) -> Result<u32, ConfigError> {
    if value < 0 {
        return Err(ConfigError::Validation(format!("{key} must not be negative (got {value})")));
    }
    u32::try_from(value)
        .map_err(|_| ConfigError::Validation(format!("{key} is too large (got {value})")))
}

/// Blank values count as unset.
pub fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_count(key: &str, value: &str) -> Result<u32, ConfigError> {
    let parsed = value.trim().parse::<i64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })?;
    non_negative(key, parsed)
}

fn split_list(value: &str) -> impl Iterator<Item = String> + '_ {
    value.split(',').map(str::trim).filter(|item| !item.is_empty()).map(str::to_string)
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    ranking: Option<RankingPatch>,
    exclusions: Option<ExclusionPatch>,
    logging: Option<LoggingPatch>,
}

/// Raw values: signed integers and free-form strings so that negatives and
/// unknown modes produce validation errors rather than parse errors.
#[derive(Debug, Default, Deserialize)]
struct RankingPatch {
    min_store_samples: Option<i64>,
    min_category_samples: Option<i64>,
    mode: Option<String>,
    estimator: Option<String>,
    top_categories_per_store: Option<i64>,
    top_stores_per_category: Option<i64>,
    shards: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct ExclusionPatch {
    stores: Option<Vec<String>>,
    categories: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

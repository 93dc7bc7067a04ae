//! Run configuration, read from a JSON file.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};

use crate::domain::window::parse_timestamp;
use crate::domain::BackfillPlan;

/// Environment variable naming the configuration file
pub const CONFIG_ENV_VAR: &str = "ENRICHER_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "enricher.json";

const DEFAULT_STEP_DAYS: i64 = 30;
const DEFAULT_GAP_MINUTES: i64 = 1;
const DEFAULT_BACKUP_COUNT: usize = 7;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration {path:?}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("configuration has no `{0}` section")]
    MissingSection(&'static str),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub daily: Option<DailyConfig>,
    pub backfill: Option<BackfillConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Inputs of the daily "yesterday" enrichment
#[derive(Debug, Clone, Deserialize)]
pub struct DailyConfig {
    /// Workspace (directory or database connection) holding the source table
    pub source_path: String,
    pub table_name: String,
    pub date_field: String,
    /// Polygon datasets joined in order
    pub auxiliary_datasets: Vec<String>,
    pub keep_fields: Vec<String>,
    /// Replaced on every run
    pub destination_path: String,
}

/// Inputs of the historical backfill into a master table
#[derive(Debug, Clone, Deserialize)]
pub struct BackfillConfig {
    pub source_path: String,
    pub table_name: String,
    pub date_field: String,
    pub auxiliary_dataset: String,
    pub keep_fields: Vec<String>,
    /// Appended to, never replaced
    pub master_table: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub first_start: NaiveDateTime,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub first_stop: NaiveDateTime,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub end: NaiveDateTime,
    #[serde(default = "default_step_days")]
    pub step_days: i64,
    #[serde(default = "default_gap_minutes")]
    pub gap_minutes: i64,
    /// Where progress is recorded; no resumption when absent
    pub checkpoint_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
    /// Number of rolled-over log files kept
    #[serde(default = "default_backup_count")]
    pub backup_count: usize,
    /// `EnvFilter` directive used when `RUST_LOG` is not set
    #[serde(default = "default_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_file: default_log_file(),
            backup_count: DEFAULT_BACKUP_COUNT,
            filter: default_filter(),
        }
    }
}

fn default_step_days() -> i64 {
    DEFAULT_STEP_DAYS
}

fn default_gap_minutes() -> i64 {
    DEFAULT_GAP_MINUTES
}

fn default_log_file() -> PathBuf {
    PathBuf::from("enricher.log")
}

fn default_backup_count() -> usize {
    DEFAULT_BACKUP_COUNT
}

fn default_filter() -> String {
    "info,point_enricher=debug".to_string()
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    parse_timestamp(&text)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", text)))
}

/// Configuration file to use: the command line, then `ENRICHER_CONFIG`,
/// then `enricher.json` in the working directory
pub fn resolve_path(cli: Option<PathBuf>) -> PathBuf {
    cli.or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content).map_err(|err| match err {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            serde_json::from_str(content).map_err(|source| ConfigError::Parse {
                path: PathBuf::new(),
                source,
            })?;
        if let Some(daily) = &config.daily {
            daily.validate()?;
        }
        if let Some(backfill) = &config.backfill {
            backfill.validate()?;
        }
        Ok(config)
    }

    pub fn daily(&self) -> Result<&DailyConfig, ConfigError> {
        self.daily.as_ref().ok_or(ConfigError::MissingSection("daily"))
    }

    pub fn backfill(&self) -> Result<&BackfillConfig, ConfigError> {
        self.backfill
            .as_ref()
            .ok_or(ConfigError::MissingSection("backfill"))
    }
}

fn require(value: &str, name: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{} must not be empty", name)));
    }
    Ok(())
}

impl DailyConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require(&self.table_name, "daily.table_name")?;
        require(&self.date_field, "daily.date_field")?;
        require(&self.destination_path, "daily.destination_path")?;
        if self.keep_fields.is_empty() {
            return Err(ConfigError::Invalid(
                "daily.keep_fields must list at least one field".to_string(),
            ));
        }
        Ok(())
    }
}

impl BackfillConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require(&self.table_name, "backfill.table_name")?;
        require(&self.date_field, "backfill.date_field")?;
        require(&self.auxiliary_dataset, "backfill.auxiliary_dataset")?;
        require(&self.master_table, "backfill.master_table")?;
        if self.keep_fields.is_empty() {
            return Err(ConfigError::Invalid(
                "backfill.keep_fields must list at least one field".to_string(),
            ));
        }
        if self.first_start >= self.first_stop {
            return Err(ConfigError::Invalid(
                "backfill.first_start must be before backfill.first_stop".to_string(),
            ));
        }
        if self.step_days <= 0 || self.gap_minutes < 0 {
            return Err(ConfigError::Invalid(
                "backfill.step_days must be positive and backfill.gap_minutes non-negative"
                    .to_string(),
            ));
        }
        Ok(())
    }

    pub fn plan(&self) -> BackfillPlan {
        BackfillPlan {
            first_start: self.first_start,
            first_stop: self.first_stop,
            end: self.end,
            step: Duration::days(self.step_days),
            gap: Duration::minutes(self.gap_minutes),
        }
    }
}

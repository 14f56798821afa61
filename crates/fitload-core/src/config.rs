//! Run configuration loaded from TOML.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::loader::{is_identifier, TableName, VerificationPolicy};
use crate::transform::{transformer_for, DatasetTransformer};

pub const DEFAULT_CONFIG_PATH: &str = "config/fitload.toml";

#[derive(Debug, Clone, Deserialize)]
struct ConfigFile {
    paths: PathsConfig,
    #[serde(default)]
    database: DatabaseConfig,
    #[serde(default)]
    etl: EtlConfig,
    #[serde(default)]
    datasets: Vec<DatasetEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct PathsConfig {
    raw_data: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Destination schema (default: public)
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoadStrategy {
    /// Truncate and reload.
    #[default]
    Replace,
    /// Accepted in configuration, rejected per dataset at run time.
    Append,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EtlConfig {
    #[serde(default)]
    pub load_strategy: LoadStrategy,
    /// Rows per insert statement (default: 5000)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub verbose: bool,
    /// Exit non-zero when any dataset failed
    #[serde(default)]
    pub strict: bool,
    #[serde(default)]
    pub verification: VerificationPolicy,
    /// Processing order; every configured dataset when absent
    #[serde(default)]
    pub datasets_to_process: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
struct DatasetEntry {
    name: String,
    pattern: String,
    table: String,
    #[serde(default)]
    transformer: Option<String>,
}

fn default_schema() -> String {
    "public".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_batch_size() -> usize {
    5000
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            schema: default_schema(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            load_strategy: LoadStrategy::default(),
            batch_size: default_batch_size(),
            verbose: false,
            strict: false,
            verification: VerificationPolicy::default(),
            datasets_to_process: None,
        }
    }
}

/// One configured dataset, fully resolved.
#[derive(Debug, Clone)]
pub struct DatasetSpec {
    pub name: String,
    pub pattern: String,
    pub table: TableName,
    pub transformer: &'static dyn DatasetTransformer,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub raw_data: PathBuf,
    pub database: DatabaseConfig,
    pub etl: EtlConfig,
    pub datasets: Vec<DatasetSpec>,
}

impl Config {
    /// Reads and validates a config file. A relative `paths.raw_data` is
    /// taken relative to the file's directory, not the working directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|err| {
            PipelineError::Config(format!("cannot read {}: {err}", path.display()))
        })?;
        let mut config = Self::from_toml_str(&text)?;
        if config.raw_data.is_relative() {
            if let Some(dir) = path.parent() {
                config.raw_data = dir.join(&config.raw_data);
            }
        }
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(text)?;
        Self::resolve(file)
    }

    fn resolve(file: ConfigFile) -> Result<Self> {
        if file.etl.batch_size == 0 {
            return Err(PipelineError::Config("etl.batch_size must be greater than 0".into()));
        }
        if !is_identifier(&file.database.schema) {
            return Err(PipelineError::Config(format!(
                "database.schema `{}` is not a plain SQL identifier",
                file.database.schema
            )));
        }

        let mut seen = HashSet::new();
        let mut datasets = Vec::with_capacity(file.datasets.len());
        for entry in file.datasets {
            if !seen.insert(entry.name.clone()) {
                return Err(PipelineError::Config(format!(
                    "dataset `{}` is configured more than once",
                    entry.name
                )));
            }
            let code = entry.transformer.as_deref().unwrap_or(&entry.name);
            let transformer = transformer_for(code).ok_or_else(|| {
                PipelineError::Config(format!(
                    "dataset `{}` names unknown transformer `{code}`",
                    entry.name
                ))
            })?;
            let table = TableName::new(Some(&file.database.schema), &entry.table).map_err(|_| {
                PipelineError::Config(format!(
                    "dataset `{}` table `{}` is not a plain SQL identifier",
                    entry.name, entry.table
                ))
            })?;
            datasets.push(DatasetSpec {
                name: entry.name,
                pattern: entry.pattern,
                table,
                transformer,
            });
        }

        Ok(Self {
            raw_data: file.paths.raw_data,
            database: file.database,
            etl: file.etl,
            datasets,
        })
    }

    pub fn dataset(&self, name: &str) -> Option<&DatasetSpec> {
        self.datasets.iter().find(|d| d.name == name)
    }

    /// Dataset names to run, in order: an explicit selection, else
    /// `etl.datasets_to_process`, else every configured dataset.
    pub fn selection(&self, requested: Option<&[String]>) -> Vec<String> {
        match (requested, &self.etl.datasets_to_process) {
            (Some(names), _) if !names.is_empty() => names.to_vec(),
            (_, Some(names)) => names.clone(),
            _ => self.datasets.iter().map(|d| d.name.clone()).collect(),
        }
    }
}

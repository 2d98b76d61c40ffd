//! Configuration system for the SQLFlow compiler
//!
//! Loads configuration from:
//! 1. config.yaml - operational settings (logging, backend policies, codegen, schemas)
//! 2. .env file - the session (data source, token, storage credentials)
//!
//! Environment variables always override config.yaml values.

use serde::{Deserialize, Serialize};
use sqlflow_codegen::CodegenOptions;
use sqlflow_ir::{BackendCredentials, MemorySchemaOracle, SessionConfig, TableSchema};
use sqlflow_registry::{BackendKind, ModelRegistry, UnknownKeyPolicy};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for environment variable {name}: {value:?}")]
    InvalidEnvVar { name: String, value: String },
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or module-specific directives
    pub level: String,

    /// Output format: pretty, json, compact
    pub format: String,

    /// Output destination: stderr, file, both
    pub output: String,

    /// Directory for log files
    pub directory: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            output: "stderr".to_string(),
            directory: "./logs".to_string(),
        }
    }
}

/// Per-backend settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// What to do with `WITH` keys the backend does not declare
    pub unknown_keys: UnknownKeyPolicy,
}

/// Main compiler configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    pub logging: LoggingConfig,

    /// Overrides of the built-in unknown-key policies
    pub backends: BTreeMap<BackendKind, BackendConfig>,

    pub codegen: CodegenOptions,

    /// Table name -> column name -> native type, for callers without a live database
    pub schemas: BTreeMap<String, BTreeMap<String, String>>,
}

impl CompilerConfig {
    /// Load configuration from YAML file with environment variable overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: CompilerConfig = serde_yaml::from_str(&contents)?;
        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Apply overrides from `lookup` (the process environment in [`CompilerConfig::load`])
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("RUST_LOG") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Some(output) = lookup("LOG_OUTPUT") {
            self.logging.output = output;
        }
        if let Some(dir) = lookup("LOG_DIR") {
            self.logging.directory = dir;
        }

        if let Some(size) = lookup("SQLFLOW_HASH_BUCKET_SIZE") {
            self.codegen.hash_bucket_size = match size.trim().parse() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::InvalidEnvVar {
                        name: "SQLFLOW_HASH_BUCKET_SIZE".to_string(),
                        value: size,
                    })
                }
            };
        }
        Ok(())
    }

    /// Model registry with this configuration's policy overrides
    pub fn registry(&self) -> ModelRegistry {
        ModelRegistry::with_policies(
            self.backends
                .iter()
                .map(|(backend, config)| (*backend, config.unknown_keys)),
        )
    }

    /// In-memory oracle over the `schemas` section
    pub fn schema_oracle(&self) -> MemorySchemaOracle {
        let mut oracle = MemorySchemaOracle::new();
        for (table, columns) in &self.schemas {
            let pairs: Vec<(&str, &str)> = columns
                .iter()
                .map(|(column, native_type)| (column.as_str(), native_type.as_str()))
                .collect();
            oracle.add_table(TableSchema::from_pairs(table.as_str(), &pairs));
        }
        oracle
    }
}

/// Build the session from the environment, loading `.env` first if present
pub fn session_from_env() -> Result<SessionConfig, ConfigError> {
    dotenvy::dotenv().ok();
    session_from_lookup(|name| std::env::var(name).ok())
}

/// Build the session from `lookup`. Empty values count as unset.
pub fn session_from_lookup<F>(lookup: F) -> Result<SessionConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| lookup(name).filter(|value| !value.is_empty());

    let connection =
        get("SQLFLOW_DATASOURCE").ok_or_else(|| ConfigError::MissingEnvVar("SQLFLOW_DATASOURCE".to_string()))?;

    let exit_on_submit = match get("SQLFLOW_EXIT_ON_SUBMIT") {
        None => false,
        Some(value) => parse_bool(&value).ok_or(ConfigError::InvalidEnvVar {
            name: "SQLFLOW_EXIT_ON_SUBMIT".to_string(),
            value,
        })?,
    };

    Ok(SessionConfig {
        connection,
        token: get("SQLFLOW_TOKEN"),
        exit_on_submit,
        user_id: get("SQLFLOW_USER_ID"),
        credentials: BackendCredentials {
            storage_location: get("SQLFLOW_HIVE_LOCATION"),
            namenode_addr: get("SQLFLOW_HDFS_NAMENODE_ADDR"),
            user: get("SQLFLOW_HDFS_USER"),
            password: get("SQLFLOW_HDFS_PASS"),
        },
    })
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

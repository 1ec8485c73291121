use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use thiserror::Error;
use validator::Validate;

use crate::execution::AccessMode;

const ENV_PREFIX: &str = "GRAPHQL_CYPHER_";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    #[error("Parse error for {field}: {value} - {source}")]
    Parse {
        field: String,
        value: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Compiler and service configuration with validation
#[derive(Clone, Debug, PartialEq, Validate, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Reject every operation that arrives without valid claims
    pub global_authentication: bool,

    /// Dotted claim path holding the caller's roles
    #[validate(length(min = 1, message = "Roles claim path cannot be empty"))]
    pub roles_claim_path: String,

    /// Access mode forced onto read operations
    pub default_access_mode: Option<AccessMode>,

    /// Deepest nesting of relationship selections accepted (1-64)
    #[validate(range(min = 1, max = 64, message = "Max selection depth must be between 1 and 64"))]
    pub max_selection_depth: u32,

    /// Engine hints handed to the executor untouched
    pub query_options: BTreeMap<String, String>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            global_authentication: false,
            roles_claim_path: "roles".to_string(),
            default_access_mode: None,
            max_selection_depth: 16,
            query_options: BTreeMap::new(),
        }
    }
}

impl CompilerConfig {
    /// Create configuration from `GRAPHQL_CYPHER_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            global_authentication: parse_env_var("GLOBAL_AUTHENTICATION", "false")?,
            roles_claim_path: env::var(format!("{}ROLES_CLAIM_PATH", ENV_PREFIX))
                .unwrap_or_else(|_| "roles".to_string()),
            default_access_mode: match env::var(format!("{}DEFAULT_ACCESS_MODE", ENV_PREFIX)) {
                Ok(value) => Some(value.parse().map_err(|e: String| ConfigError::Parse {
                    field: format!("{}DEFAULT_ACCESS_MODE", ENV_PREFIX),
                    value,
                    source: e.into(),
                })?),
                Err(env::VarError::NotPresent) => None,
                Err(e) => return Err(e.into()),
            },
            max_selection_depth: parse_env_var("MAX_SELECTION_DEPTH", "16")?,
            query_options: match env::var(format!("{}QUERY_OPTIONS", ENV_PREFIX)) {
                Ok(value) => parse_query_options(&value)?,
                Err(_) => BTreeMap::new(),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Create configuration from YAML file
    pub fn from_yaml_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Parse {
            field: "yaml_file".to_string(),
            value: "file read failed".to_string(),
            source: Box::new(e),
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            field: "yaml_content".to_string(),
            value: content,
            source: Box::new(e),
        })?;

        config.validate()?;
        Ok(config)
    }
}

/// Parse `GRAPHQL_CYPHER_<key>` with a default value
fn parse_env_var<T: std::str::FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let name = format!("{}{}", ENV_PREFIX, key);
    let value = env::var(&name).unwrap_or_else(|_| default.to_string());
    value.parse().map_err(|e| ConfigError::Parse {
        field: name,
        value,
        source: Box::new(e),
    })
}

/// `runtime=parallel,planner=cost` style option list
fn parse_query_options(value: &str) -> Result<BTreeMap<String, String>, ConfigError> {
    let mut options = BTreeMap::new();
    for pair in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, option) = pair.split_once('=').ok_or_else(|| ConfigError::Parse {
            field: format!("{}QUERY_OPTIONS", ENV_PREFIX),
            value: value.to_string(),
            source: format!("expected key=value, got `{}`", pair).into(),
        })?;
        options.insert(key.trim().to_string(), option.trim().to_string());
    }
    Ok(options)
}

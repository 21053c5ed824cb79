// SPDX-License-Identifier: Apache-2.0

//! Configuration
//!
//! Loaded from `veilsql.json` (or the file named by `VEILSQL_CONFIG`).
//! Every field has a default, so an empty object is a valid configuration
//! that reads its key from `VEILSQL_DATA_KEY`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use veil_core::{VeilError, VeilResult};
use veil_sql::SqlDialectKind;

use crate::policy::FieldDeclaration;
use crate::vault::cipher::{DEFAULT_BLOCK_SIZE, MIN_BLOCK_SIZE};
use crate::vault::KeySource;

pub const CONFIG_ENV_VAR: &str = "VEILSQL_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "veilsql.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VeilConfig {
    /// Where the data key comes from
    #[serde(default)]
    pub key: KeySource,
    /// Byte budget of one fuzzy window
    #[serde(default = "default_block_size")]
    pub fuzzy_block_size: usize,
    /// SQL dialect used to parse intercepted statements
    #[serde(default)]
    pub dialect: SqlDialectKind,
    /// Protected fields per mapped type
    #[serde(default)]
    pub policies: Vec<TypePolicyConfig>,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Field declarations of one mapped type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypePolicyConfig {
    pub mapped_type: String,
    /// Table the type maps to, for statements issued without a type
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldDeclaration>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Directory for daily rolling JSON logs; stderr when absent
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    /// `EnvFilter` directives; `RUST_LOG` takes precedence
    #[serde(default)]
    pub filter: Option<String>,
    /// Days to keep rolled log files
    #[serde(default = "default_retention_days")]
    pub retention_days: u64,
}

fn default_block_size() -> usize {
    DEFAULT_BLOCK_SIZE
}

fn default_retention_days() -> u64 {
    14
}

impl Default for VeilConfig {
    fn default() -> Self {
        Self {
            key: KeySource::default(),
            fuzzy_block_size: default_block_size(),
            dialect: SqlDialectKind::default(),
            policies: Vec::new(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            filter: None,
            retention_days: default_retention_days(),
        }
    }
}

impl VeilConfig {
    pub fn from_json(content: &str) -> VeilResult<Self> {
        let config: Self = serde_json::from_str(content)
            .map_err(|e| VeilError::config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> VeilResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            VeilError::config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        let config = Self::from_json(&content)?;
        debug!(path = %path.display(), types = config.policies.len(), "Loaded configuration");
        Ok(config)
    }

    /// Loads `$VEILSQL_CONFIG`, else `./veilsql.json`, else the defaults
    pub fn load_default() -> VeilResult<Self> {
        if let Some(path) = std::env::var_os(CONFIG_ENV_VAR) {
            return Self::load(Path::new(&path));
        }

        let path = Path::new(DEFAULT_CONFIG_FILE);
        if path.exists() {
            return Self::load(path);
        }

        debug!("No configuration file found, using defaults");
        Ok(Self::default())
    }

    pub fn validate(&self) -> VeilResult<()> {
        if self.fuzzy_block_size < MIN_BLOCK_SIZE {
            return Err(VeilError::config(format!(
                "fuzzy_block_size must be at least {}, got {}",
                MIN_BLOCK_SIZE, self.fuzzy_block_size
            )));
        }

        let mut types = HashSet::new();
        for policy in &self.policies {
            if policy.mapped_type.trim().is_empty() {
                return Err(VeilError::config("policy with an empty mapped_type"));
            }
            if !types.insert(policy.mapped_type.as_str()) {
                return Err(VeilError::config(format!(
                    "mapped type {} is declared twice",
                    policy.mapped_type
                )));
            }

            let mut columns = HashSet::new();
            for field in &policy.fields {
                let column = field.column_name().to_lowercase();
                if column.trim().is_empty() {
                    return Err(VeilError::config(format!(
                        "{}.{} has an empty column name",
                        policy.mapped_type, field.property
                    )));
                }
                if !columns.insert(column) {
                    return Err(VeilError::config(format!(
                        "{} declares column {} more than once",
                        policy.mapped_type,
                        field.column_name()
                    )));
                }
            }
        }

        Ok(())
    }
}

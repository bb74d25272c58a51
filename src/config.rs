//! Optional YAML settings file. Every field has a default, and command-line
//! flags take precedence over whatever the file says.

use std::{
    fs,
    path::{Path, PathBuf},
};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    error::{LedgerError, Result},
    underperformance::{DEFAULT_SUMMATIVE_KEYWORDS, DEFAULT_THRESHOLD},
};

pub const DEFAULT_DATABASE: &str = "quiz-ledger.db";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LedgerConfig {
    pub database: PathBuf,
    pub threshold: f64,
    pub summative_keywords: Vec<String>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from(DEFAULT_DATABASE),
            threshold: DEFAULT_THRESHOLD,
            summative_keywords: DEFAULT_SUMMATIVE_KEYWORDS
                .iter()
                .map(|k| k.to_string())
                .collect(),
        }
    }
}

impl LedgerConfig {
    pub fn from_yaml_str(input: &str) -> Result<Self> {
        let config: LedgerConfig =
            serde_yaml::from_str(input).map_err(|err| LedgerError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(LedgerError::NotFound(format!(
                "config file {path:?} does not exist"
            )));
        }
        let raw = fs::read_to_string(path)?;
        let config = Self::from_yaml_str(&raw).map_err(|err| match err {
            LedgerError::Config(msg) => LedgerError::Config(format!("{path:?}: {msg}")),
            other => other,
        })?;
        debug!("Loaded configuration from {path:?}");
        Ok(config)
    }

    /// Loads `path` when given, otherwise the defaults, then applies `database`.
    pub fn resolve(path: Option<&Path>, database: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        if let Some(database) = database {
            config.database = database.to_path_buf();
        }
        Ok(config)
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|err| LedgerError::Config(err.to_string()))
    }

    fn validate(&self) -> Result<()> {
        if !self.threshold.is_finite() {
            return Err(LedgerError::Config(format!(
                "threshold must be a finite number, got {}",
                self.threshold
            )));
        }
        if self.summative_keywords.iter().any(|k| k.trim().is_empty()) {
            return Err(LedgerError::Config(
                "summative_keywords must not contain blank entries".into(),
            ));
        }
        Ok(())
    }
}

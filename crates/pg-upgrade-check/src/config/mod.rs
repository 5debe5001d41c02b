//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::{CheckError, Result};
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Look up the templates for a table.
    pub fn table(&self, name: &str) -> Result<&TableSpec> {
        self.tables
            .get(name)
            .ok_or_else(|| CheckError::Config(format!("table {} is not configured", name)))
    }
}

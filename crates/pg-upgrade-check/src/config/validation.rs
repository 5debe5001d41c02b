//! Configuration validation.

use super::{Config, MAX_WINDOW_SIZE};
use crate::error::{CheckError, Result};
use crate::query::{parse_collect, parse_compare, validate_table_name};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    if config.tables.is_empty() {
        return Err(CheckError::Config("tables must list at least one table".into()));
    }

    for (name, spec) in &config.tables {
        validate_table_name(name)?;
        parse_collect(&spec.collect).map_err(|e| field_error(name, "collect", e))?;
        parse_compare(&spec.compare).map_err(|e| field_error(name, "compare", e))?;
    }

    if config.compare.window_size < 1 || config.compare.window_size > MAX_WINDOW_SIZE {
        return Err(CheckError::Config(format!(
            "compare.window_size must be between 1 and {}, got {}",
            MAX_WINDOW_SIZE, config.compare.window_size
        )));
    }

    Ok(())
}

fn field_error(table: &str, field: &str, err: CheckError) -> CheckError {
    match err {
        CheckError::Config(msg) => CheckError::Config(format!("tables.{}.{}: {}", table, field, msg)),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CompareConfig, TableSpec};
    use std::collections::BTreeMap;

    fn valid_config() -> Config {
        let mut tables = BTreeMap::new();
        tables.insert(
            "orders".to_string(),
            TableSpec {
                collect: "SELECT max(id) FROM %s".to_string(),
                compare: "SELECT id, md5(%s::text) FROM %s WHERE id >= %d AND id < %d ORDER BY id"
                    .to_string(),
            },
        );
        Config {
            tables,
            compare: CompareConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_no_tables() {
        let mut config = valid_config();
        config.tables.clear();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_unsafe_table_name() {
        let mut config = valid_config();
        let spec = config.tables["orders"].clone();
        config.tables.insert("orders; --".to_string(), spec);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_bad_collect_template() {
        let mut config = valid_config();
        if let Some(spec) = config.tables.get_mut("orders") {
            spec.collect = "SELECT max(id) FROM orders".to_string();
        }
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("tables.orders.collect"));
    }

    #[test]
    fn test_bad_compare_template() {
        let mut config = valid_config();
        if let Some(spec) = config.tables.get_mut("orders") {
            spec.compare = "SELECT id, md5(%s::text) FROM %s".to_string();
        }
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("tables.orders.compare"));
    }

    #[test]
    fn test_window_size_bounds() {
        let mut config = valid_config();
        config.compare.window_size = 0;
        assert!(validate(&config).is_err());
        config.compare.window_size = 1001;
        assert!(validate(&config).is_err());
        config.compare.window_size = 1000;
        assert!(validate(&config).is_ok());
    }
}

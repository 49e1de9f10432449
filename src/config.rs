//! File configuration
//!
//! ```toml
//! [stage]
//! dialect = "postgres"
//! tenant_id = 1
//! grant_select_to = "reporting"
//!
//! [[tables]]
//! name = "items"
//! source_path = "/item-storage/items"
//! module = "mod-inventory-storage"
//!
//! [anonymize]
//! users = ["/personal/email", "/barcode"]
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::stage::anonymize::FieldPaths;
use crate::types::{StageConfig, TableSchema};
use crate::{Error, Result};

/// Environment variable overriding `stage.dialect`
pub const ENV_DIALECT: &str = "KILN_DIALECT";

/// Environment variable overriding `stage.tenant_id`
pub const ENV_TENANT_ID: &str = "KILN_TENANT_ID";

/// A table to stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableEntry {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
}

impl TableEntry {
    pub fn new(name: impl Into<String>) -> Self {
        TableEntry {
            name: name.into(),
            source_path: None,
            module: None,
        }
    }

    /// Empty schema for this table, ready for inference
    pub fn schema(&self) -> TableSchema {
        TableSchema {
            source_path: self.source_path.clone(),
            module_name: self.module.clone(),
            ..TableSchema::new(&self.name)
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KilnConfig {
    #[serde(default)]
    pub stage: StageConfig,

    #[serde(default)]
    pub tables: Vec<TableEntry>,

    #[serde(default)]
    pub anonymize: FieldPaths,
}

impl KilnConfig {
    /// Read configuration from `path` and apply environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&content)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(dialect) = std::env::var(ENV_DIALECT) {
            self.stage.dialect = dialect.parse().map_err(Error::Config)?;
        }
        if let Ok(tenant) = std::env::var(ENV_TENANT_ID) {
            self.stage.tenant_id = tenant
                .parse()
                .map_err(|_| Error::Config(format!("{} is not a tenant id: {}", ENV_TENANT_ID, tenant)))?;
        }
        Ok(())
    }

    /// The configured entry for `name`, or a bare one
    pub fn table(&self, name: &str) -> TableEntry {
        self.tables
            .iter()
            .find(|entry| entry.name == name)
            .cloned()
            .unwrap_or_else(|| TableEntry::new(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::anonymize::Anonymizer;
    use crate::warehouse::Dialect;

    #[test]
    fn test_parse_full_config() {
        let config = KilnConfig::parse(
            r#"
            [stage]
            dialect = "redshift"
            tenant_id = 3
            grant_select_to = "reporting"

            [[tables]]
            name = "items"
            source_path = "/item-storage/items"
            module = "mod-inventory-storage"

            [[tables]]
            name = "users"

            [anonymize]
            users = ["/personal/email"]
            "#,
        )
        .unwrap();

        assert_eq!(config.stage.dialect, Dialect::Redshift);
        assert_eq!(config.stage.tenant_id, 3);
        assert_eq!(config.stage.max_value_len, 65535);
        assert_eq!(config.stage.grant_select_to.as_deref(), Some("reporting"));
        assert_eq!(config.tables.len(), 2);
        assert!(config.anonymize.is_sensitive("users", "/personal/email"));

        let schema = config.table("items").schema();
        assert_eq!(schema.table_name, "items");
        assert_eq!(schema.source_path.as_deref(), Some("/item-storage/items"));
        assert_eq!(schema.module_name.as_deref(), Some("mod-inventory-storage"));
        assert_eq!(config.table("loans"), TableEntry::new("loans"));
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = KilnConfig::parse("").unwrap();
        assert_eq!(config.stage.dialect, Dialect::Postgres);
        assert_eq!(config.stage.flush_threshold, 10_000_000);
        assert!(config.tables.is_empty());
    }

    #[test]
    fn test_unknown_dialect_is_rejected() {
        let err = KilnConfig::parse("[stage]\ndialect = \"oracle\"\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = KilnConfig::default();
        config.tables.push(TableEntry::new("items"));
        let text = config.to_toml().unwrap();
        let parsed = KilnConfig::parse(&text).unwrap();
        assert_eq!(parsed.tables, config.tables);
    }
}

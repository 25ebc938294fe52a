use serde::Deserialize;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use crate::domains::csv::TextEncoding;
use crate::domains::import::DEFAULT_BATCH_SIZE;
use crate::domains::schema::{TypeAliases, TypeCategory};
use crate::errors::{MigrationError, MigrationResult};

pub const DEFAULT_CONNECTION_NAME: &str = "Default";
pub const DEFAULT_BACKUP_PREFIX: &str = "backup";

/// Settings file read when no path is given on the command line.
#[cfg(debug_assertions)]
pub const DEFAULT_CONFIG_FILE: &str = "appsettings.Development.json";
#[cfg(not(debug_assertions))]
pub const DEFAULT_CONFIG_FILE: &str = "appsettings.json";

/// Application settings, in the `appsettings.json` layout.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MigrationConfig {
    #[serde(default)]
    pub connection_strings: HashMap<String, String>,
    #[serde(default)]
    pub backup: BackupSettings,
    #[serde(default)]
    pub import: ImportSettings,
    /// Extra declared type names, e.g. `"citext": "Text"`.
    #[serde(default)]
    pub type_aliases: HashMap<String, TypeCategory>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BackupSettings {
    pub folder: Option<String>,
    pub file_name: Option<String>,
    pub encoding: Option<String>,
    /// Tables to export; empty means all of them.
    #[serde(default)]
    pub tables: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImportSettings {
    pub folder: Option<String>,
    pub batch_size: Option<ConfigNumber>,
    pub encoding: Option<String>,
}

/// Numbers are accepted both bare and quoted.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ConfigNumber {
    Number(i64),
    Text(String),
}

impl MigrationConfig {
    pub fn load(path: &Path) -> MigrationResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            MigrationError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config = Self::from_json(&text)?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_json(text: &str) -> MigrationResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| MigrationError::Config(format!("invalid settings: {}", e)))
    }

    /// `path` when given, otherwise the build's default settings file in the working directory.
    pub fn resolve_path(path: Option<&Path>) -> PathBuf {
        path.map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    /// Connection string `name`; the `ConnectionStrings<name>` environment variable wins.
    pub fn connection_string(&self, name: &str) -> MigrationResult<String> {
        self.connection_string_with(name, |key| std::env::var(key).ok())
    }

    pub fn connection_string_with<F>(&self, name: &str, env: F) -> MigrationResult<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = env(&format!("ConnectionStrings{}", name)).filter(|v| !v.trim().is_empty()) {
            return Ok(value);
        }
        self.connection_strings
            .get(name)
            .filter(|v| !v.trim().is_empty())
            .cloned()
            .ok_or_else(|| MigrationError::Config(format!("connection string '{}' is not set", name)))
    }

    pub fn batch_size(&self) -> MigrationResult<NonZeroUsize> {
        let raw = match &self.import.batch_size {
            None => return Ok(default_batch_size()),
            Some(ConfigNumber::Number(n)) => *n,
            Some(ConfigNumber::Text(text)) if text.trim().is_empty() => return Ok(default_batch_size()),
            Some(ConfigNumber::Text(text)) => text.trim().parse::<i64>().map_err(|_| {
                MigrationError::Config(format!("Import:BatchSize '{}' is not a number", text))
            })?,
        };
        usize::try_from(raw)
            .ok()
            .and_then(NonZeroUsize::new)
            .ok_or_else(|| MigrationError::Config(format!("Import:BatchSize must be positive, got {}", raw)))
    }

    pub fn import_encoding(&self) -> MigrationResult<TextEncoding> {
        TextEncoding::for_label(self.import.encoding.as_deref().unwrap_or_default())
    }

    pub fn backup_encoding(&self) -> MigrationResult<TextEncoding> {
        TextEncoding::for_label(self.backup.encoding.as_deref().unwrap_or_default())
    }

    pub fn backup_prefix(&self) -> &str {
        match self.backup.file_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name,
            _ => DEFAULT_BACKUP_PREFIX,
        }
    }

    pub fn type_aliases(&self) -> TypeAliases {
        TypeAliases::new(self.type_aliases.clone())
    }

    /// Configured import folder, when set and present on disk.
    pub fn import_folder(&self) -> Option<PathBuf> {
        self.import
            .folder
            .as_deref()
            .map(str::trim)
            .filter(|folder| !folder.is_empty())
            .map(PathBuf::from)
            .filter(|folder| folder.is_dir())
    }
}

fn default_batch_size() -> NonZeroUsize {
    NonZeroUsize::new(DEFAULT_BATCH_SIZE).unwrap_or(NonZeroUsize::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SETTINGS: &str = r#"{
        "ConnectionStrings": { "Default": "sqlite://shop.db" },
        "Backup": { "Folder": "/tmp/backups", "FileName": "shop", "Encoding": "gbk", "Tables": ["orders"] },
        "Import": { "Folder": "", "BatchSize": "500", "Encoding": "utf-8" }
    }"#;

    #[test]
    fn test_reads_appsettings_layout() {
        let config = MigrationConfig::from_json(SETTINGS).unwrap();
        assert_eq!(config.backup.folder.as_deref(), Some("/tmp/backups"));
        assert_eq!(config.backup_prefix(), "shop");
        assert_eq!(config.backup.tables, vec!["orders".to_string()]);
        assert_eq!(config.batch_size().unwrap().get(), 500);
        assert_eq!(config.backup_encoding().unwrap().name(), "GBK");
        assert_eq!(config.import_folder(), None);
    }

    #[test]
    fn test_environment_overrides_connection_string() {
        let config = MigrationConfig::from_json(SETTINGS).unwrap();
        let from_file = config.connection_string_with("Default", |_| None).unwrap();
        assert_eq!(from_file, "sqlite://shop.db");

        let from_env = config
            .connection_string_with("Default", |key| {
                (key == "ConnectionStringsDefault").then(|| "sqlite://other.db".to_string())
            })
            .unwrap();
        assert_eq!(from_env, "sqlite://other.db");

        assert!(matches!(
            config.connection_string_with("Reporting", |_| None),
            Err(MigrationError::Config(_))
        ));
    }

    #[test]
    fn test_batch_size_defaults_and_validation() {
        let empty = MigrationConfig::from_json("{}").unwrap();
        assert_eq!(empty.batch_size().unwrap().get(), DEFAULT_BATCH_SIZE);
        assert_eq!(empty.backup_prefix(), DEFAULT_BACKUP_PREFIX);
        assert_eq!(empty.import_encoding().unwrap(), TextEncoding::default());

        let numeric = MigrationConfig::from_json(r#"{"Import": {"BatchSize": 250}}"#).unwrap();
        assert_eq!(numeric.batch_size().unwrap().get(), 250);

        for bad in [r#"{"Import": {"BatchSize": 0}}"#, r#"{"Import": {"BatchSize": -5}}"#, r#"{"Import": {"BatchSize": "lots"}}"#] {
            let config = MigrationConfig::from_json(bad).unwrap();
            assert!(matches!(config.batch_size(), Err(MigrationError::Config(_))), "{}", bad);
        }
    }

    #[test]
    fn test_unknown_encoding_is_a_config_error() {
        let config = MigrationConfig::from_json(r#"{"Import": {"Encoding": "klingon"}}"#).unwrap();
        assert!(config.import_encoding().is_err());
    }

    #[test]
    fn test_type_aliases_section() {
        let config = MigrationConfig::from_json(r#"{"TypeAliases": {"CITEXT": "Text", "yesno": "Integer16"}}"#).unwrap();
        let aliases = config.type_aliases();
        assert_eq!(aliases.resolve("citext"), TypeCategory::Text);
        assert_eq!(aliases.resolve("YesNo"), TypeCategory::Integer16);
        assert_eq!(aliases.resolve("int"), TypeCategory::Integer32);
    }

    #[test]
    fn test_existing_import_folder_is_used() {
        let dir = tempfile::TempDir::new().unwrap();
        let json = serde_json::json!({ "Import": { "Folder": dir.path() } }).to_string();
        let config = MigrationConfig::from_json(&json).unwrap();
        assert_eq!(config.import_folder(), Some(dir.path().to_path_buf()));
    }
}

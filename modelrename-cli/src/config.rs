use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::ConfigError;

/// Project-level config file name, looked up in the project root
pub const PROJECT_CONFIG_FILE: &str = "modelrename.toml";

/// Rename engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenameConfig {
    #[serde(default)]
    pub backup: BackupConfig,

    #[serde(default)]
    pub scan: ScanConfig,

    #[serde(default)]
    pub report: ReportConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Keep the backup directory after a rolled-back rename
    #[serde(default)]
    pub retain_on_rollback: bool,

    /// Parent directory for backups. Defaults to the project's parent directory.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Directory names skipped while walking the project
    #[serde(default = "default_ignore_dir_names")]
    pub ignore_dir_names: Vec<String>,

    /// Files larger than this fail the load instead of being read
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Index and edit report definition files
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Parse stringified JSON payloads inside `report.json`
    #[serde(default = "default_true")]
    pub parse_embedded: bool,
}

fn default_ignore_dir_names() -> Vec<String> {
    [".git", ".pbi", "node_modules", "target"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_max_file_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_true() -> bool {
    true
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            retain_on_rollback: false,
            directory: None,
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            ignore_dir_names: default_ignore_dir_names(),
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            parse_embedded: true,
        }
    }
}

impl RenameConfig {
    /// Load configuration for a project
    ///
    /// **Config Priority (highest to lowest):**
    /// 1. `<project>/modelrename.toml`
    /// 2. `~/.config/modelrename/config.toml`
    /// 3. Defaults
    ///
    /// The first file found is used as a whole; missing fields take defaults.
    pub fn load(project_root: &Path) -> Result<Self, ConfigError> {
        Self::load_with_global(project_root, Self::global_config_path().as_deref())
    }

    pub fn load_with_global(project_root: &Path, global: Option<&Path>) -> Result<Self, ConfigError> {
        let project_path = project_root.join(PROJECT_CONFIG_FILE);
        if project_path.exists() {
            tracing::info!("Loading project config from: {}", project_path.display());
            return Self::load_from_file(&project_path);
        }

        if let Some(global_path) = global {
            if global_path.exists() {
                tracing::info!("Loading global config from: {}", global_path.display());
                return Self::load_from_file(global_path);
            }
        }

        tracing::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load config from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Get the global config path (~/.config/modelrename/config.toml)
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config").join("modelrename").join("config.toml"))
    }

    pub fn is_ignored_dir(&self, name: &str) -> bool {
        self.scan.ignore_dir_names.iter().any(|n| n == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = RenameConfig::default();
        assert!(!config.backup.retain_on_rollback);
        assert_eq!(config.backup.directory, None);
        assert_eq!(config.scan.max_file_bytes, 10 * 1024 * 1024);
        assert!(config.is_ignored_dir(".git"));
        assert!(config.report.enabled);
        assert!(config.report.parse_embedded);
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
            [backup]
            retain_on_rollback = true
        "#;

        let config: RenameConfig = toml::from_str(toml_str).unwrap();
        assert!(config.backup.retain_on_rollback);
        // Other sections should use defaults
        assert_eq!(config.scan, ScanConfig::default());
        assert_eq!(config.report, ReportConfig::default());
    }

    #[test]
    fn test_project_config_wins_over_global() {
        let project = TempDir::new().unwrap();
        let global_dir = TempDir::new().unwrap();
        let global = global_dir.path().join("config.toml");
        fs::write(&global, "[scan]\nmax_file_bytes = 5\n").unwrap();

        let config = RenameConfig::load_with_global(project.path(), Some(&global)).unwrap();
        assert_eq!(config.scan.max_file_bytes, 5);

        fs::write(
            project.path().join(PROJECT_CONFIG_FILE),
            "[report]\nenabled = false\n",
        )
        .unwrap();
        let config = RenameConfig::load_with_global(project.path(), Some(&global)).unwrap();
        assert!(!config.report.enabled);
        assert_eq!(config.scan.max_file_bytes, default_max_file_bytes());
    }

    #[test]
    fn test_invalid_toml() {
        let project = TempDir::new().unwrap();
        fs::write(project.path().join(PROJECT_CONFIG_FILE), "[backup\nretain = 1").unwrap();
        let err = RenameConfig::load_with_global(project.path(), None).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}

//! Runner configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via RSMIGRATE_CONFIG or --config)
//! 3. Environment variables
//! 4. Command-line flags (applied by the caller)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Runner configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where migration definitions live and how they are run.
    pub migrations: MigrationsConfig,
    /// Where the position record is kept.
    pub state: StateConfig,
    /// Engine behavior.
    pub engine: EngineConfig,
}

impl Config {
    /// Loads configuration from `path` if given, then applies environment
    /// variable overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
    }

    /// Applies overrides from a variable lookup (the process environment in
    /// [`load`](Self::load)).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        self.migrations.apply_overrides(&lookup);
        self.state.apply_overrides(&lookup);
        self.engine.apply_overrides(&lookup);
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.migrations.shell.trim().is_empty() {
            return Err(ConfigError::Validation(
                "migrations.shell must not be empty".into(),
            ));
        }

        rsmigrate_storage::codec::validate_key(&self.state.key)
            .map_err(|e| ConfigError::Validation(format!("state.key: {}", e)))?;

        Ok(())
    }
}

/// Migration definition settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationsConfig {
    /// Directory holding one YAML definition per migration.
    pub dir: PathBuf,
    /// Shell used to run `up`/`down` commands.
    pub shell: String,
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./migrations"),
            shell: "sh".to_string(),
        }
    }
}

impl MigrationsConfig {
    fn apply_overrides(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup("RSMIGRATE_MIGRATIONS_DIR") {
            self.dir = PathBuf::from(dir);
        }

        if let Some(shell) = lookup("RSMIGRATE_SHELL") {
            self.shell = shell;
        }
    }
}

/// State record settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Directory of the file state store.
    pub dir: PathBuf,
    /// Storage key of this project's record.
    pub key: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./.rsmigrate"),
            key: "default".to_string(),
        }
    }
}

impl StateConfig {
    fn apply_overrides(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup("RSMIGRATE_STATE_DIR") {
            self.dir = PathBuf::from(dir);
        }

        if let Some(key) = lookup("RSMIGRATE_STATE_KEY") {
            self.key = key;
        }
    }
}

/// Engine settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Save the reached position when a step fails.
    pub persist_progress: bool,
}

impl EngineConfig {
    fn apply_overrides(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
        if let Some(value) = lookup("RSMIGRATE_PERSIST_PROGRESS") {
            self.persist_progress = value == "1" || value.to_lowercase() == "true";
        }
    }
}

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),

    #[error("failed to parse config file '{}': {}", .0.display(), .1)]
    Parse(PathBuf, #[source] serde_yaml::Error),

    #[error("configuration validation failed: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.migrations.dir, PathBuf::from("./migrations"));
        assert_eq!(config.migrations.shell, "sh");
        assert_eq!(config.state.dir, PathBuf::from("./.rsmigrate"));
        assert_eq!(config.state.key, "default");
        assert!(!config.engine.persist_progress);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rsmigrate.yaml");
        std::fs::write(&path, "state:\n  key: billing\nengine:\n  persist_progress: true\n")
            .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.state.key, "billing");
        assert_eq!(config.state.dir, PathBuf::from("./.rsmigrate"));
        assert!(config.engine.persist_progress);
        assert_eq!(config.migrations, MigrationsConfig::default());
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = Config::default();
        config.state.key = "from-file".into();

        config.apply_overrides(lookup(&[
            ("RSMIGRATE_STATE_KEY", "from-env"),
            ("RSMIGRATE_MIGRATIONS_DIR", "/srv/migrations"),
            ("RSMIGRATE_SHELL", "bash"),
            ("RSMIGRATE_PERSIST_PROGRESS", "TRUE"),
        ]));

        assert_eq!(config.state.key, "from-env");
        assert_eq!(config.migrations.dir, PathBuf::from("/srv/migrations"));
        assert_eq!(config.migrations.shell, "bash");
        assert!(config.engine.persist_progress);
    }

    #[test]
    fn test_no_overrides() {
        let mut config = Config::default();
        config.apply_overrides(lookup(&[]));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = Config::from_file(dir.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(..)));
        assert!(err.to_string().contains("nope.yaml"));
    }

    #[test]
    fn test_invalid_yaml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "state: [unterminated").unwrap();

        let err = Config::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(..)));
    }

    #[test]
    fn test_validate() {
        let mut config = Config::default();
        config.state.key = String::new();
        assert!(config.validate().is_err());

        config.state.key = "../elsewhere".into();
        assert!(config.validate().is_err());

        config.state.key = "..".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("state.key"));

        config.state.key = "svc.v2_main-1".into();
        assert!(config.validate().is_ok());

        config.migrations.shell = "  ".into();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, config);
    }
}

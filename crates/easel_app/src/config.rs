use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use easel_core::Credential;
use easel_engine::EngineConfig;
use easel_logging::easel_warn;
use serde::{Deserialize, Serialize};

use crate::cli::Cli;

pub const CREDENTIAL_ENV: &str = "EASEL_CREDENTIAL";
const DEFAULT_SLOT_FILENAME: &str = ".easel_slot.ron";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse config {path:?}: {message}")]
    Parse { path: PathBuf, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub credential: Option<String>,
    /// Used when `--model` is not given.
    pub default_model: Option<String>,
    pub slot_path: PathBuf,
    pub log_to_file: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            credential: None,
            default_model: None,
            slot_path: PathBuf::from(DEFAULT_SLOT_FILENAME),
            log_to_file: false,
        }
    }
}

impl AppConfig {
    /// Read `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        ron::from_str(&content).map_err(|err| ConfigError::Parse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
    }

    /// Flags beat the environment, which beats the file.
    pub fn apply_overrides(&mut self, cli: &Cli, env_credential: Option<String>) {
        if let Some(base_url) = &cli.base_url {
            self.engine.base_url = base_url.clone();
        }
        if let Some(slot) = &cli.slot {
            self.slot_path = slot.clone();
        }
        if let Some(credential) = cli.credential.clone().or(env_credential) {
            self.credential = Some(credential);
        }
    }

    pub fn credential(&self) -> Option<Credential> {
        let credential = self
            .credential
            .as_deref()
            .map(str::trim)
            .filter(|secret| !secret.is_empty())
            .map(Credential::new);
        if credential.is_none() {
            easel_warn!("no credential configured; set --credential or {}", CREDENTIAL_ENV);
        }
        credential
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use clap::Parser;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let temp = TempDir::new().unwrap();
        let config = AppConfig::load(&temp.path().join("easel.ron")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("easel.ron");
        fs::write(
            &path,
            r#"(
                engine: (
                    base_url: "https://backend.example",
                    poll: (interval_ms: 2000),
                    request: (retry_count: 5),
                ),
                default_model: Some("600423432991350804"),
            )"#,
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.engine.base_url, "https://backend.example");
        assert_eq!(config.engine.poll.interval, Duration::from_secs(2));
        assert_eq!(config.engine.poll.max_ticks, 90);
        assert_eq!(config.engine.request.retry_count, 5);
        assert_eq!(config.engine.request.timeout, Duration::from_secs(30));
        assert_eq!(config.default_model.as_deref(), Some("600423432991350804"));
        assert_eq!(config.slot_path, PathBuf::from(DEFAULT_SLOT_FILENAME));
    }

    #[test]
    fn credential_rules_can_be_loosened() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("easel.ron");
        fs::write(
            &path,
            "(engine: (credential_rules: (required_prefix: None, min_len: 4)))",
        )
        .unwrap();

        let rules = AppConfig::load(&path).unwrap().engine.credential_rules;
        assert_eq!(rules.required_prefix, None);
        assert!(rules.check(Some(&Credential::new("sk-local"))).is_ok());

        let defaults = AppConfig::default().engine.credential_rules;
        assert!(defaults.check(Some(&Credential::new("sk-local"))).is_err());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("easel.ron");
        fs::write(&path, "(engine: [").unwrap();
        assert!(matches!(AppConfig::load(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn flag_credential_beats_environment() {
        let mut config = AppConfig {
            credential: Some("from-file".to_string()),
            ..AppConfig::default()
        };
        let cli = Cli::parse_from(["easel", "status"]);
        config.apply_overrides(&cli, Some("from-env".to_string()));
        assert_eq!(config.credential.as_deref(), Some("from-env"));

        let cli = Cli::parse_from(["easel", "--credential", "from-flag", "status"]);
        config.apply_overrides(&cli, Some("from-env".to_string()));
        assert_eq!(config.credential.as_deref(), Some("from-flag"));
    }
}

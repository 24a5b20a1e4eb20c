//! Configuration loader and validator for the transcription store CLI.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    #[serde(default)]
    pub history: History,
    #[serde(default)]
    pub batch: Batch,
    #[serde(default)]
    pub engine: Engine,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    #[serde(default = "default_database_file")]
    pub database_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct History {
    pub page_size: u32,
}

impl Default for History {
    fn default() -> Self {
        Self { page_size: 50 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Batch {
    pub list_limit: u32,
}

impl Default for Batch {
    fn default() -> Self {
        Self { list_limit: 20 }
    }
}

/// External speech-to-text program used by `batch run`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Engine {
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub language: Option<String>,
}

fn default_database_file() -> String {
    "transcriptions.db".to_string()
}

impl App {
    /// `data_dir` with a leading `~/` expanded to `$HOME`.
    pub fn resolved_data_dir(&self) -> PathBuf {
        if let Some(rest) = self.data_dir.strip_prefix("~/") {
            if let Ok(home) = std::env::var("HOME") {
                return Path::new(home.trim_end_matches('/')).join(rest);
            }
        }
        PathBuf::from(&self.data_dir)
    }
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        fs::create_dir_all(self.app.resolved_data_dir())
    }

    pub fn database_path(&self) -> PathBuf {
        self.app.resolved_data_dir().join(&self.app.database_file)
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    let file = cfg.app.database_file.trim();
    if file.is_empty() {
        return Err(ConfigError::Invalid("app.database_file must be non-empty"));
    }
    if file.contains(['/', '\\']) {
        return Err(ConfigError::Invalid("app.database_file must be a plain file name"));
    }
    if cfg.history.page_size == 0 {
        return Err(ConfigError::Invalid("history.page_size must be > 0"));
    }
    if cfg.batch.list_limit == 0 {
        return Err(ConfigError::Invalid("batch.list_limit must be > 0"));
    }
    if cfg.engine.command.iter().any(|a| a.trim().is_empty()) {
        return Err(ConfigError::Invalid("engine.command entries must be non-empty"));
    }
    Ok(())
}

/// Example configuration accepted by [`load`].
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  database_file: "transcriptions.db"

history:
  page_size: 50

batch:
  list_limit: 20

engine:
  command: ["whisper-json", "--model", "base"]
  language: "en"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.engine.command[0], "whisper-json");
        assert_eq!(cfg.engine.language.as_deref(), Some("en"));
    }

    #[test]
    fn optional_sections_default() {
        let cfg: Config = serde_yaml::from_str("app:\n  data_dir: \"/var/lib/ts\"\n").unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.history.page_size, 50);
        assert_eq!(cfg.batch.list_limit, 20);
        assert!(cfg.engine.command.is_empty());
        assert_eq!(
            cfg.database_path(),
            PathBuf::from("/var/lib/ts/transcriptions.db")
        );
    }

    #[test]
    fn invalid_values() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.data_dir = " ".into();
        let err = validate(&cfg).unwrap_err();
        match err { ConfigError::Invalid(msg) => assert!(msg.contains("data_dir")), _ => panic!("wrong error") }

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.database_file = "sub/x.db".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.history.page_size = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.batch.list_limit = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.engine.command.push("".into());
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn ensure_dirs_creates_data_dir() {
        let td = tempdir().unwrap();
        let data_path = td.path().join("data");
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.data_dir = data_path.to_string_lossy().to_string();
        cfg.ensure_dirs().unwrap();
        assert!(data_path.exists());
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.batch.list_limit, 20);
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let td = tempdir().unwrap();
        let err = load(Some(&td.path().join("nope.yaml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}

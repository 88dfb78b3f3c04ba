use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{GuardError, Result};
use crate::frontend::RunnerKind;
use crate::trust::TrustMode;

/// Console guard configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Log level
    pub log_level: LogLevel,

    /// How nested trust regions combine
    pub trust_mode: TrustMode,

    /// Notice shown when a termination attempt is refused
    pub blocked_message: String,

    /// Front-end integration
    pub front_end: FrontEndConfig,

    /// Roots searched by `run_module`
    pub module_paths: Vec<PathBuf>,

    /// How deeply scripts may run other scripts
    pub max_run_depth: usize,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Warn,
            trust_mode: TrustMode::SaveRestore,
            blocked_message: "Exit is disabled in the interactive console; run a script to exit with a status."
                .to_string(),
            front_end: FrontEndConfig::default(),
            module_paths: vec![PathBuf::from(".")],
            max_run_depth: 24,
        }
    }
}

impl GuardConfig {
    /// Load configuration from a YAML or JSON file (chosen by extension).
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let config: GuardConfig = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&data)?,
            Some("yaml") | Some("yml") | None => serde_yaml::from_str(&data)?,
            Some(other) => {
                return Err(GuardError::ConfigError(format!(
                    "unsupported config format: .{}",
                    other
                )))
            }
        };
        Ok(config)
    }

    /// Load `~/.console-guard/config.yaml`, or defaults if it doesn't exist.
    pub fn load_default() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Default configuration file path.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .map(|h| h.join(".console-guard"))
            .unwrap_or_else(|| PathBuf::from(".console-guard"))
            .join("config.yaml")
    }
}

/// Front-end integration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrontEndConfig {
    /// Attach to the front end when one is available
    pub attach: bool,

    /// Run operations executed inside a trust region
    pub runners: Vec<RunnerKind>,
}

impl Default for FrontEndConfig {
    fn default() -> Self {
        Self {
            attach: true,
            runners: RunnerKind::ALL.to_vec(),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let level: tracing::Level = (*self).into();
        write!(f, "{}", level.as_str().to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = GuardConfig::default();
        assert_eq!(config.trust_mode, TrustMode::SaveRestore);
        assert!(config.front_end.attach);
        assert_eq!(config.front_end.runners.len(), 3);
        assert_eq!(config.log_level, LogLevel::Warn);
        assert_eq!(config.max_run_depth, 24);
    }

    #[test]
    fn test_load_yaml_partial() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "trust_mode: depth\nfront_end:\n  runners: [exec_file]").unwrap();

        let config = GuardConfig::load(file.path()).unwrap();
        assert_eq!(config.trust_mode, TrustMode::Depth);
        assert_eq!(config.front_end.runners, vec![RunnerKind::ExecFile]);
        assert!(config.front_end.attach);
    }

    #[test]
    fn test_load_json() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"log_level": "debug", "blocked_message": "no"}}"#).unwrap();

        let config = GuardConfig::load(file.path()).unwrap();
        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.blocked_message, "no");
    }

    #[test]
    fn test_load_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        let err = GuardConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, GuardError::ConfigError(_)));
    }

    #[test]
    fn test_load_invalid_yaml() {
        let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        writeln!(file, "trust_mode: [").unwrap();
        let err = GuardConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, GuardError::SerializationError(_)));
    }

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(tracing::Level::from(LogLevel::Info), tracing::Level::INFO);
        assert_eq!(LogLevel::Error.to_string(), "error");
    }

    #[test]
    fn test_default_path_file_name() {
        assert!(GuardConfig::default_path().ends_with(".console-guard/config.yaml"));
    }
}

use thiserror::Error;

/// Console guard error types
#[derive(Error, Debug)]
pub enum GuardError {
    /// The host sealed a slot against replacement
    #[error("Slot is read-only: {slot}")]
    ReadOnlySlot { slot: String },

    /// Front-end attachment failed
    #[error("Front-end attach failed: {frontend} - {message}")]
    AttachFailed { frontend: String, message: String },

    /// Script parse or evaluation error
    #[error("Script error at line {line}: {message}")]
    ScriptError { line: usize, message: String },

    /// Scripts ran other scripts too deeply
    #[error("maximum run depth exceeded ({limit})")]
    RunDepthExceeded { limit: usize },

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for GuardError {
    fn from(err: serde_json::Error) -> Self {
        GuardError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for GuardError {
    fn from(err: serde_yaml::Error) -> Self {
        GuardError::SerializationError(err.to_string())
    }
}

/// Result type alias for console guard operations
pub type Result<T> = std::result::Result<T, GuardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_only_slot_display() {
        let error = GuardError::ReadOnlySlot {
            slot: "sys.exit".to_string(),
        };
        assert_eq!(error.to_string(), "Slot is read-only: sys.exit");
    }

    #[test]
    fn test_attach_failed_display() {
        let error = GuardError::AttachFailed {
            frontend: "console".to_string(),
            message: "exit hook missing".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Front-end attach failed: console - exit hook missing"
        );
    }

    #[test]
    fn test_script_error_display() {
        let error = GuardError::ScriptError {
            line: 3,
            message: "unexpected token".to_string(),
        };
        assert_eq!(error.to_string(), "Script error at line 3: unexpected token");
    }

    #[test]
    fn test_run_depth_display() {
        let error = GuardError::RunDepthExceeded { limit: 24 };
        assert_eq!(error.to_string(), "maximum run depth exceeded (24)");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let guard_error: GuardError = io_error.into();
        assert!(matches!(guard_error, GuardError::IoError(_)));
        assert!(guard_error.to_string().contains("file not found"));
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let result: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ nope }");
        let guard_error: GuardError = result.unwrap_err().into();
        assert!(matches!(guard_error, GuardError::SerializationError(_)));
    }

    #[test]
    fn test_serde_yaml_error_conversion() {
        let result: std::result::Result<serde_yaml::Value, _> =
            serde_yaml::from_str("invalid: yaml: content:");
        let guard_error: GuardError = result.unwrap_err().into();
        assert!(matches!(guard_error, GuardError::SerializationError(_)));
    }

    #[test]
    fn test_config_error_display() {
        let error = GuardError::ConfigError("unknown trust mode".to_string());
        assert_eq!(error.to_string(), "Configuration error: unknown trust mode");
    }

    #[test]
    fn test_other_error_display() {
        let error = GuardError::Other("something went wrong".to_string());
        assert_eq!(error.to_string(), "something went wrong");
    }
}

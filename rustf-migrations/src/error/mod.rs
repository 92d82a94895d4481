use crate::capabilities::EngineVersion;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for RustF migrations
#[derive(Error, Debug)]
pub enum Error {
    /// Domain failure reported by the migration engine (bad revision
    /// reference, missing directory, conflicting heads, ...)
    #[error("{0}")]
    Command(String),

    /// The installed engine is too old for the requested operation
    #[error("{operation} requires migration engine {required} or greater (installed: {installed})")]
    Compatibility {
        operation: &'static str,
        required: EngineVersion,
        installed: EngineVersion,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Template error: {0}")]
    Template(#[from] handlebars::RenderError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<handlebars::TemplateError> for Error {
    fn from(err: handlebars::TemplateError) -> Self {
        Self::Command(format!("Invalid script template: {}", err))
    }
}

impl Error {
    pub fn command(msg: impl Into<String>) -> Self {
        Self::Command(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn compatibility(
        operation: &'static str,
        required: EngineVersion,
        installed: EngineVersion,
    ) -> Self {
        Self::Compatibility {
            operation,
            required,
            installed,
        }
    }

    /// Whether this is an engine-level command failure
    pub fn is_command(&self) -> bool {
        matches!(self, Error::Command(_))
    }

    /// Whether the operation was refused because of the engine version
    pub fn is_compatibility(&self) -> bool {
        matches!(self, Error::Compatibility { .. })
    }

    /// Get a stable error code, used by the CLI log output
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Command(_) => "E_COMMAND",
            Error::Compatibility { .. } => "E_COMPATIBILITY",
            Error::Config(_) => "E_CONFIG",
            Error::Io(_) => "E_IO",
            Error::Toml(_) => "E_TOML",
            Error::Template(_) => "E_TEMPLATE",
            Error::Database(_) => "E_DATABASE",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compatibility_message() {
        let err = Error::compatibility(
            "edit",
            EngineVersion::new(0, 8, 0),
            EngineVersion::new(0, 7, 6),
        );
        assert!(err.is_compatibility());
        assert_eq!(
            err.to_string(),
            "edit requires migration engine 0.8.0 or greater (installed: 0.7.6)"
        );
        assert_eq!(err.error_code(), "E_COMPATIBILITY");
    }

    #[test]
    fn test_command_error_is_passthrough() {
        let err = Error::command("Can't locate revision identified by 'abc'");
        assert!(err.is_command());
        assert_eq!(err.to_string(), "Can't locate revision identified by 'abc'");
    }
}

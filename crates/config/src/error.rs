use std::path::PathBuf;

/// Errors that can occur while loading or validating a [`crate::RuntimeConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("failed to parse config file {path} as TOML: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

impl ConfigError {
    pub fn io(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Io {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

//! Configuration errors.

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no config file at {}", .0.display())]
    NotFound(PathBuf),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("environment variable {0} is not set")]
    EnvVarNotSet(String),

    #[error("{field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl ConfigError {
    /// Adapter for `map_err` on filesystem calls touching `path`.
    pub(crate) fn io(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_culprit() {
        let err = ConfigError::NotFound(PathBuf::from("conf/everhook.toml"));
        assert_eq!(err.to_string(), "no config file at conf/everhook.toml");

        let err = ConfigError::EnvVarNotSet("EVERHOOK_LOG_DIR".to_string());
        assert!(err.to_string().contains("EVERHOOK_LOG_DIR"));

        let err = ConfigError::InvalidValue {
            field: "modules.settings.core".to_string(),
            message: "not a table".to_string(),
        };
        assert_eq!(err.to_string(), "modules.settings.core: not a table");
    }

    #[test]
    fn test_io_keeps_path_and_source() {
        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err = ConfigError::io(Path::new("launch.txt"))(denied);

        assert_eq!(err.to_string(), "launch.txt: read-only");
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "read-only");
    }
}

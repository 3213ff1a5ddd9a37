//! Loads `everhook.toml`.
//!
//! `${VAR}` references are replaced from the environment before parsing, and a
//! leading `~` in path settings is expanded afterwards.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use regex::{Captures, Regex};

use crate::error::ConfigError;
use crate::schema::Config;

/// File name looked up in the working directory and the user config dir.
pub const CONFIG_FILE: &str = "everhook.toml";

const ENV_VAR_PATTERN: &str = r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Fails with [`ConfigError::NotFound`] when `path` does not exist.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Err(e) => return Err(ConfigError::io(path)(e)),
        };
        Self::load_str(&content)
    }

    /// Like [`load`](Self::load), with defaults when the file is absent.
    pub fn load_or_default(path: &Path) -> Result<Config, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::NotFound(_)) => Ok(Self::expand_paths(Config::default())),
            other => other,
        }
    }

    pub fn load_str(content: &str) -> Result<Config, ConfigError> {
        let expanded = Self::expand_env_vars(content)?;
        let config: Config = toml::from_str(&expanded)?;
        Ok(Self::expand_paths(config))
    }

    /// `everhook.toml` in the working directory if present, otherwise the one
    /// in the user config directory.
    pub fn default_path() -> PathBuf {
        let local = PathBuf::from(CONFIG_FILE);
        if local.exists() {
            return local;
        }
        dirs::config_dir()
            .map(|d| d.join("everhook").join(CONFIG_FILE))
            .filter(|p| p.exists())
            .unwrap_or(local)
    }

    /// Reports the first unset variable.
    fn expand_env_vars(content: &str) -> Result<String, ConfigError> {
        let pattern = Regex::new(ENV_VAR_PATTERN).map_err(|e| ConfigError::InvalidValue {
            field: ENV_VAR_PATTERN.to_string(),
            message: e.to_string(),
        })?;

        let mut missing: Option<String> = None;
        let expanded = pattern.replace_all(content, |caps: &Captures<'_>| {
            std::env::var(&caps[1]).unwrap_or_else(|_| {
                missing.get_or_insert_with(|| caps[1].to_string());
                String::new()
            })
        });

        match missing {
            Some(name) => Err(ConfigError::EnvVarNotSet(name)),
            None => Ok(expanded.into_owned()),
        }
    }

    /// `~/logs` -> `$HOME/logs`. Other paths come back unchanged.
    pub fn expand_tilde(path: &str) -> String {
        shellexpand::tilde(path).into_owned()
    }

    fn expand_paths(mut config: Config) -> Config {
        let paths = [
            &mut config.logging.file,
            &mut config.logging.history_dir,
            &mut config.crash.report_path,
        ];
        for path in paths {
            if let Some(expanded) = path.to_str().map(Self::expand_tilde) {
                *path = PathBuf::from(expanded);
            }
        }
        config
    }
}

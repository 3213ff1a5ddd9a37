//! Configuration schema definitions.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::ConfigError;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub crash: CrashConfig,

    #[serde(default)]
    pub modules: ModulesConfig,

    #[serde(default)]
    pub host: HostConfig,
}

/// Log file, log history and filter levels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log of the current run.
    #[serde(default = "default_log_file")]
    pub file: PathBuf,

    /// Where the previous run's log is moved on startup.
    #[serde(default = "default_history_dir")]
    pub history_dir: PathBuf,

    /// How many old logs to keep. Negative values count as 0.
    #[serde(default = "default_history_count")]
    pub history_count_to_keep: i64,

    /// Default filter level.
    #[serde(default = "default_level")]
    pub level: String,

    /// Per-target filter levels, e.g. `everhook_core::hook = "debug"`.
    #[serde(default)]
    pub levels: HashMap<String, String>,
}

impl LoggingConfig {
    /// History count with negative values clamped to 0.
    pub fn retained_history(&self) -> usize {
        usize::try_from(self.history_count_to_keep.max(0)).unwrap_or(usize::MAX)
    }

    /// Filter directive: the default level followed by the per-target
    /// levels, sorted by target.
    pub fn filter_directive(&self) -> String {
        let mut targets: Vec<_> = self.levels.iter().collect();
        targets.sort();
        let mut directive = self.level.clone();
        for (target, level) in targets {
            directive.push(',');
            directive.push_str(target);
            directive.push('=');
            directive.push_str(level);
        }
        directive
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: default_log_file(),
            history_dir: default_history_dir(),
            history_count_to_keep: default_history_count(),
            level: default_level(),
            levels: HashMap::new(),
        }
    }
}

fn default_log_file() -> PathBuf {
    PathBuf::from("log.txt")
}

fn default_history_dir() -> PathBuf {
    PathBuf::from("LogHistory")
}

fn default_history_count() -> i64 {
    3
}

fn default_level() -> String {
    "info".to_string()
}

/// Crash report sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrashConfig {
    #[serde(default = "default_report_path")]
    pub report_path: PathBuf,
}

impl Default for CrashConfig {
    fn default() -> Self {
        Self {
            report_path: default_report_path(),
        }
    }
}

fn default_report_path() -> PathBuf {
    PathBuf::from("error_log.txt")
}

/// Module selection and per-module settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModulesConfig {
    /// Ids of modules that are registered but not loaded.
    #[serde(default)]
    pub disabled: Vec<String>,

    /// Settings table per module id.
    #[serde(default)]
    pub settings: HashMap<String, toml::Value>,
}

impl ModulesConfig {
    pub fn is_disabled(&self, id: &str) -> bool {
        self.disabled.iter().any(|d| d == id)
    }

    /// Settings of `id` as JSON, the form modules receive them in.
    pub fn settings_json(&self, id: &str) -> Result<Option<serde_json::Value>, ConfigError> {
        let Some(value) = self.settings.get(id) else {
            return Ok(None);
        };
        let field = format!("modules.settings.{id}");
        if !value.is_table() {
            return Err(ConfigError::InvalidValue {
                field,
                message: format!("expected a table, found {}", value.type_str()),
            });
        }
        serde_json::to_value(value)
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                field,
                message: e.to_string(),
            })
    }

    /// Ids that have a settings table, sorted.
    pub fn configured(&self) -> Vec<&str> {
        let mut ids: Vec<_> = self.settings.keys().map(String::as_str).collect();
        ids.sort();
        ids
    }
}

/// Host loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,

    /// Stop after this many frames. Runs until interrupted when unset.
    #[serde(default)]
    pub frame_limit: Option<u64>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            frame_rate: default_frame_rate(),
            frame_limit: None,
        }
    }
}

fn default_frame_rate() -> u32 {
    60
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;

//! Configuration validation.

use std::collections::HashSet;

use crate::error::ConfigError;
use crate::schema::Config;

const LEVELS: &[&str] = &["off", "error", "warn", "info", "debug", "trace"];

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> Result<ValidationResult, ConfigError> {
        let mut result = ValidationResult::default();

        Self::validate_logging(config, &mut result);
        Self::validate_crash(config, &mut result);
        Self::validate_modules(config, &mut result);
        Self::validate_host(config, &mut result);

        Ok(result)
    }

    fn is_level(level: &str) -> bool {
        LEVELS.contains(&level.to_ascii_lowercase().as_str())
    }

    fn validate_logging(config: &Config, result: &mut ValidationResult) {
        let logging = &config.logging;

        if !Self::is_level(&logging.level) {
            result.add_error(ValidationError::new(
                "logging.level",
                format!("Unknown level '{}', expected one of {}", logging.level, LEVELS.join(", ")),
            ));
        }

        for (target, level) in &logging.levels {
            if target.is_empty() {
                result.add_error(ValidationError::new(
                    "logging.levels",
                    "Target cannot be empty",
                ));
            }
            if !Self::is_level(level) {
                result.add_error(ValidationError::new(
                    format!("logging.levels.{}", target),
                    format!("Unknown level '{}'", level),
                ));
            }
        }

        if logging.history_count_to_keep < 0 {
            result.add_warning(ValidationWarning::new(
                "logging.history_count_to_keep",
                "Negative history count is treated as 0, all old logs will be deleted",
            ));
        }

        if logging.file.as_os_str().is_empty() {
            result.add_error(ValidationError::new(
                "logging.file",
                "Log file path cannot be empty",
            ));
        }
    }

    fn validate_crash(config: &Config, result: &mut ValidationResult) {
        if config.crash.report_path.as_os_str().is_empty() {
            result.add_error(ValidationError::new(
                "crash.report_path",
                "Crash report path cannot be empty",
            ));
        }
    }

    fn validate_modules(config: &Config, result: &mut ValidationResult) {
        let mut seen = HashSet::new();
        for id in &config.modules.disabled {
            if !seen.insert(id.as_str()) {
                result.add_warning(ValidationWarning::new(
                    "modules.disabled",
                    format!("Module '{}' is listed more than once", id),
                ));
            }
        }

        for id in config.modules.configured() {
            if let Err(e) = config.modules.settings_json(id) {
                result.add_error(ValidationError::new(
                    format!("modules.settings.{}", id),
                    e.to_string(),
                ));
            }
            if config.modules.is_disabled(id) {
                result.add_warning(ValidationWarning::new(
                    format!("modules.settings.{}", id),
                    "Settings are given for a disabled module",
                ));
            }
        }
    }

    fn validate_host(config: &Config, result: &mut ValidationResult) {
        if config.host.frame_rate == 0 {
            result.add_error(ValidationError::new(
                "host.frame_rate",
                "frame_rate must be greater than 0",
            ));
        }

        if config.host.frame_rate > 1000 {
            result.add_warning(ValidationWarning::new(
                "host.frame_rate",
                "frame_rate is very high (>1000), frames will not be paced",
            ));
        }

        if config.host.frame_limit == Some(0) {
            result.add_warning(ValidationWarning::new(
                "host.frame_limit",
                "frame_limit is 0, the host will exit before the first frame",
            ));
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;

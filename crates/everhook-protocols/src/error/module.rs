//! Module lifecycle errors.

use thiserror::Error;

use super::{BusError, HookError};
use crate::module::{ModulePhase, ModuleState};

#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("Module not found: {0}")]
    NotFound(String),

    #[error("Module already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Module {module} failed during {phase}: {message}")]
    LoadFailure {
        module: String,
        phase: ModulePhase,
        message: String,
    },

    #[error("Module dependency not satisfied: {module} requires {dependency}")]
    DependencyNotSatisfied { module: String, dependency: String },

    #[error("Module dependency cycle involving {0}")]
    DependencyCycle(String),

    #[error("Module {module} cannot move from {from} to {to}")]
    InvalidTransition {
        module: String,
        from: ModuleState,
        to: ModuleState,
    },

    #[error("Invalid settings for {module}: {message}")]
    Settings { module: String, message: String },

    #[error(transparent)]
    Hook(#[from] HookError),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error("{0}")]
    Custom(String),
}

impl ModuleError {
    pub fn load_failure(
        module: impl Into<String>,
        phase: ModulePhase,
        message: impl Into<String>,
    ) -> Self {
        ModuleError::LoadFailure {
            module: module.into(),
            phase,
            message: message.into(),
        }
    }
}
